use crate::{
    body::{code_str, Block, BlockHeader, StructDispatch, ResolveError, CODE_DNA, CODE_ENDB},
    parsers::{
        dna::{Dna, DnaParseContext},
        finish, BlendParseError, Endianness, PointerSize, Result,
    },
};
use libflate::gzip::Decoder;
use nom::{
    branch::alt,
    bytes::complete::{tag, take},
    number::complete::{be_u32, be_u64, le_u32, le_u64},
    sequence::tuple,
    Err,
};
use std::{fs::File, io::Read, path::Path, result::Result as StdResult};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The size of the pointer on the machine used to save the blend file.
    pub pointer_size: PointerSize,
    /// The endianness on the machine used to save the blend file.
    pub endianness: Endianness,
    /// The version of Blender used to save the blend file, as three ASCII digits.
    pub version: [u8; 3],
}

impl Header {
    /// The version as a number, `b"280"` is `280`.
    pub fn version_number(&self) -> u32 {
        self.version
            .iter()
            .fold(0, |acc, &d| acc * 10 + u32::from(d.saturating_sub(b'0')))
    }
}

fn pointer_size_bits32(input: &[u8]) -> Result<PointerSize> {
    let (input, _) = tag("_")(input)?;
    Ok((input, PointerSize::Bits32))
}

fn pointer_size_bits64(input: &[u8]) -> Result<PointerSize> {
    let (input, _) = tag("-")(input)?;
    Ok((input, PointerSize::Bits64))
}

pub fn pointer_size(input: &[u8]) -> Result<PointerSize> {
    alt((pointer_size_bits32, pointer_size_bits64))(input)
}

fn endianness_little(input: &[u8]) -> Result<Endianness> {
    let (input, _) = tag("v")(input)?;
    Ok((input, Endianness::Little))
}

fn endianness_big(input: &[u8]) -> Result<Endianness> {
    let (input, _) = tag("V")(input)?;
    Ok((input, Endianness::Big))
}

pub fn endianness(input: &[u8]) -> Result<Endianness> {
    alt((endianness_little, endianness_big))(input)
}

pub fn version(input: &[u8]) -> Result<[u8; 3]> {
    let (input, v) = take(3_usize)(input)?;
    Ok((input, [v[0], v[1], v[2]]))
}

pub fn header(input: &[u8]) -> Result<Header> {
    let (input, _) = match tag::<_, _, BlendParseError>("BLENDER")(input) {
        Ok(v) => v,
        Err(_) => return Err(Err::Failure(BlendParseError::CompressedFileNotSupported)),
    };

    let (input, (pointer_size, endianness, version)) =
        tuple((pointer_size, endianness, version))(input)?;

    Ok((
        input,
        Header {
            pointer_size,
            endianness,
            version,
        },
    ))
}

pub fn block_header_code(input: &[u8]) -> Result<[u8; 4]> {
    let (input, v) = take(4_usize)(input)?;
    Ok((input, [v[0], v[1], v[2], v[3]]))
}

/// A scanned .blend file. Block bodies are unresolved until `resolve_all` or `Block::resolve_body` is called.
#[derive(Debug)]
pub struct BlendFile {
    pub header: Header,
    pub blocks: Vec<Block>,
    /// The DNA of the file, parsed while scanning so struct blocks can be resolved in any order.
    pub dna: Dna,
}

impl BlendFile {
    /// Scans a .blend file from `data`. Gzip compressed files are decompressed first.
    pub fn from_data<T: Read>(mut data: T) -> StdResult<Self, BlendParseError> {
        let mut buffer = Vec::new();
        data.read_to_end(&mut buffer)?;

        if !buffer.starts_with(b"BLENDER") {
            let mut decoder = Decoder::new(&buffer[..])
                .map_err(|_| BlendParseError::CompressedFileNotSupported)?;
            let mut gzip_data = Vec::new();
            decoder
                .read_to_end(&mut gzip_data)
                .map_err(|_| BlendParseError::CompressedFileNotSupported)?;

            debug!(
                compressed = buffer.len(),
                uncompressed = gzip_data.len(),
                "decompressed gzip .blend file"
            );
            buffer = gzip_data;
        }

        finish(BlendParseContext::default().blend(&buffer))
    }

    /// Scans a .blend file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> StdResult<Self, BlendParseError> {
        let file = File::open(path)?;
        BlendFile::from_data(file)
    }

    /// Resolves the body of every block in file order, stopping at the first error.
    pub fn resolve_all<D: StructDispatch + ?Sized>(
        &mut self,
        dispatch: &D,
    ) -> StdResult<(), ResolveError> {
        let endianness = self.header.endianness;
        for block in &mut self.blocks {
            block.resolve_body(endianness, &self.dna, dispatch)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub enum BlendParseContext {
    #[default]
    Empty,
    ParsedHeader(Header),
}

impl BlendParseContext {
    fn u32<'b>(&self, header: &Header, input: &'b [u8]) -> Result<'b, usize> {
        let (input, n) = match header.endianness {
            Endianness::Little => le_u32(input)?,
            Endianness::Big => be_u32(input)?,
        };
        Ok((input, n as usize))
    }

    fn memory_address<'b>(&self, header: &Header, input: &'b [u8]) -> Result<'b, u64> {
        match (header.endianness, header.pointer_size) {
            (Endianness::Little, PointerSize::Bits32) => {
                le_u32(input).map(|(i, n)| (i, u64::from(n)))
            }
            (Endianness::Big, PointerSize::Bits32) => be_u32(input).map(|(i, n)| (i, u64::from(n))),
            (Endianness::Little, PointerSize::Bits64) => le_u64(input),
            (Endianness::Big, PointerSize::Bits64) => be_u64(input),
        }
    }

    fn block_header<'b>(&self, header: &Header, input: &'b [u8]) -> Result<'b, BlockHeader> {
        let (input, code) = block_header_code(input)?;
        let (input, size) = self.u32(header, input)?;
        let (input, old_memory_address) = self.memory_address(header, input)?;
        let (input, sdna_index) = self.u32(header, input)?;
        let (input, count) = self.u32(header, input)?;

        Ok((
            input,
            BlockHeader {
                code,
                size,
                old_memory_address,
                sdna_index,
                count,
            },
        ))
    }

    /// Returns the next block, or `None` once `ENDB` is reached. The DNA is parsed when its block is found.
    fn block<'b>(
        &self,
        input: &'b [u8],
        dna: &mut Option<Dna>,
    ) -> Result<'b, Option<Block>> {
        let header = match self {
            BlendParseContext::ParsedHeader(header) => header,
            BlendParseContext::Empty => unreachable!("Header should be parsed here"),
        };

        // ENDB may be cut short of a full block header.
        if input.starts_with(&CODE_ENDB) {
            return Ok((&input[input.len()..], None));
        }

        let (input, block_header) = self.block_header(header, input)?;

        if !block_header
            .code
            .iter()
            .all(|&b| b == 0 || b.is_ascii_alphanumeric())
        {
            return Err(Err::Failure(BlendParseError::UnknownBlockCode(
                block_header.code,
            )));
        }

        let (input, block_data) = take(block_header.size)(input)?;

        if block_header.code == CODE_DNA {
            let ctx = DnaParseContext::new(header.endianness);
            let (_, parsed) = ctx.dna(block_data)?;
            *dna = Some(parsed);
        }

        debug!(
            code = %code_str(&block_header.code),
            size = block_header.size,
            sdna_index = block_header.sdna_index,
            count = block_header.count,
            "scanned block"
        );

        Ok((input, Some(Block::new(block_header, block_data.to_vec()))))
    }

    pub fn blend<'b>(&mut self, input: &'b [u8]) -> Result<'b, BlendFile> {
        let (mut input, header) = header(input)?;

        //This has to happen before the rest of the parser runs
        *self = BlendParseContext::ParsedHeader(header.clone());

        let mut blocks = Vec::new();
        let mut dna = None;
        loop {
            let (rest, block) = self.block(input, &mut dna)?;
            input = rest;
            match block {
                Some(block) => blocks.push(block),
                None => break,
            }
        }

        let dna = dna.ok_or(Err::Failure(BlendParseError::NoDnaBlockFound))?;

        Ok((
            input,
            BlendFile {
                header,
                blocks,
                dna,
            },
        ))
    }
}
