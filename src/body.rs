//! Resolution of block bodies.
//!
//! A block starts with an unresolved body: a reader over the bytes that follow its header. Resolving the body picks
//! a decoding path from the header alone. Blocks with a schema index of `0` are dispatched by their code (`DATA`,
//! `DNA1`, `REND`, `TEST`), every other block is dispatched by the DNA type name its schema index points to. Struct
//! blocks are decoded by a `StructDispatch`, which is either code written by `codegen` for one Blender version or a
//! `Registry` filled at run time. Both go through `decode_structs`, so they behave the same.

use crate::{
    decode::{AnyStruct, BlendStruct, DecodeError},
    parsers::{
        dna::{Dna, DnaParseContext},
        finish, BlendParseError, Endianness,
    },
};
use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter, Write},
    io::{self, Cursor, Read},
};
use thiserror::Error;
use tracing::{debug, error, trace};

/// Raw data, usually arrays of primitives or pointers referenced by other blocks.
pub const CODE_DATA: [u8; 4] = *b"DATA";
/// The embedded DNA catalog.
pub const CODE_DNA: [u8; 4] = *b"DNA1";
pub const CODE_REND: [u8; 4] = *b"REND";
pub const CODE_TEST: [u8; 4] = *b"TEST";
/// Marks the end of the block list.
pub const CODE_ENDB: [u8; 4] = *b"ENDB";

/// Codes of blocks that are kept as raw bytes because no structural decoding is defined for them yet.
pub const SENTINEL_CODES: [[u8; 4]; 2] = [CODE_REND, CODE_TEST];

/// Prints a block code without its trailing null bytes, `b"OB\0\0"` becomes `OB`.
pub fn code_str(code: &[u8; 4]) -> String {
    let len = code.iter().position(|&b| b == 0).unwrap_or(4);
    String::from_utf8_lossy(&code[..len]).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub code: [u8; 4],
    /// Length of the body in bytes.
    pub size: usize,
    /// Address of the data in memory when the file was saved. Pointers in other blocks refer to it.
    pub old_memory_address: u64,
    /// Index into `Dna::structs`, `0` means the block is dispatched by its code.
    pub sdna_index: usize,
    /// Number of structs stored one after the other in the body.
    pub count: usize,
}

/// The body of a block, before and after resolution.
pub enum Body {
    Unresolved(Box<dyn Read + Send>),
    Raw(Vec<u8>),
    Dna(Dna),
    Single(Box<dyn AnyStruct>),
    /// Structs in file order.
    Many(Vec<Box<dyn AnyStruct>>),
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Body::Unresolved(_) => write!(f, "Unresolved"),
            Body::Raw(data) => write!(f, "Raw({} bytes)", data.len()),
            Body::Dna(dna) => write!(
                f,
                "Dna({} names, {} types, {} structs)",
                dna.names.len(),
                dna.types.len(),
                dna.structs.len()
            ),
            Body::Single(body) => f.debug_tuple("Single").field(body).finish(),
            Body::Many(bodies) => f.debug_tuple("Many").field(bodies).finish(),
        }
    }
}

impl Body {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Body::Unresolved(_))
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Body::Raw(data) => Some(&data[..]),
            _ => None,
        }
    }

    pub fn as_dna(&self) -> Option<&Dna> {
        match self {
            Body::Dna(dna) => Some(dna),
            _ => None,
        }
    }

    /// Returns the struct of a single-instance body if it is a `T`.
    pub fn single<T: BlendStruct>(&self) -> Option<&T> {
        match self {
            Body::Single(body) => body.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns the structs of a multi-instance body, in file order, if they are all `T`.
    pub fn many<T: BlendStruct>(&self) -> Option<Vec<&T>> {
        match self {
            Body::Many(bodies) => bodies.iter().map(|b| b.downcast_ref::<T>()).collect(),
            _ => None,
        }
    }
}

/// A block of the .blend file. The body is resolved at most once: after the first successful `resolve_body` every
/// other call returns immediately. Resolving the same block from two threads at once is not supported, different
/// blocks can be resolved in parallel as long as they share the `Dna` read-only.
#[derive(Debug)]
pub struct Block {
    pub header: BlockHeader,
    pub body: Body,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The body reader failed or ran out of bytes.
    #[error("could not read block body: {0}")]
    Read(#[from] DecodeError),
    /// A block with schema index `0` and a code with no known decoding.
    #[error("parsing of block code {:?} is not supported", code_str(.code))]
    UnsupportedBlockCode { code: [u8; 4] },
    /// The DNA names a struct the dispatcher has no declaration for. The dispatcher was built for another
    /// Blender version.
    #[error("no decoder for struct type {0:?}")]
    UnknownSchemaType(String),
    /// Bytes were left in the body after decoding `count` structs. The struct declaration doesn't match the one in
    /// the DNA.
    #[error("{} unread bytes after decoding {type_name}", .remaining.len())]
    LayoutMismatch {
        type_name: String,
        header: BlockHeader,
        remaining: Vec<u8>,
    },
    #[error("invalid DNA block: {0}")]
    Dna(#[from] BlendParseError),
    #[error("schema index {0} is not in the DNA")]
    InvalidSchemaIndex(usize),
}

impl From<io::Error> for ResolveError {
    fn from(e: io::Error) -> Self {
        ResolveError::Read(e.into())
    }
}

impl ResolveError {
    /// Fatal errors mean the compiled struct declarations can't decode this file at all, so there is no point in
    /// resolving more blocks.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ResolveError::UnknownSchemaType(_) | ResolveError::LayoutMismatch { .. }
        )
    }
}

/// Decodes the body of a struct block given the DNA type name of its schema index.
pub trait StructDispatch {
    fn decode_struct(
        &self,
        type_name: &str,
        header: &BlockHeader,
        reader: &mut dyn Read,
        endianness: Endianness,
    ) -> Result<Body, ResolveError>;
}

/// Decodes `header.count` structs of type `T` (a single one when the count is `0` or `1`) and checks that the body
/// has no bytes left.
pub fn decode_structs<T: BlendStruct>(
    type_name: &str,
    header: &BlockHeader,
    reader: &mut dyn Read,
    endianness: Endianness,
) -> Result<Body, ResolveError> {
    let body = if header.count > 1 {
        // Never trust the count for the allocation, a corrupt header would ask for gigabytes.
        let capacity = header.count.min(header.size / T::SIZE.max(1));
        let mut bodies: Vec<Box<dyn AnyStruct>> = Vec::with_capacity(capacity);
        for _ in 0..header.count {
            bodies.push(Box::new(T::decode(reader, endianness)?));
        }
        Body::Many(bodies)
    } else {
        Body::Single(Box::new(T::decode(reader, endianness)?))
    };

    ensure_consumed(type_name, header, reader)?;

    Ok(body)
}

fn ensure_consumed(
    type_name: &str,
    header: &BlockHeader,
    reader: &mut dyn Read,
) -> Result<(), ResolveError> {
    let mut remaining = Vec::new();
    reader.read_to_end(&mut remaining)?;

    if remaining.is_empty() {
        return Ok(());
    }

    error!(
        type_name,
        ?header,
        unread = remaining.len(),
        "unread bytes in block body\n{}",
        hex_dump(&remaining)
    );

    Err(ResolveError::LayoutMismatch {
        type_name: type_name.to_string(),
        header: header.clone(),
        remaining,
    })
}

type DecodeFn = fn(&str, &BlockHeader, &mut dyn Read, Endianness) -> Result<Body, ResolveError>;

/// A `StructDispatch` filled at run time, one entry per struct declaration.
#[derive(Default)]
pub struct Registry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_set().entries(self.type_names()).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `T` under its DNA type name, replacing any previous declaration with that name.
    pub fn register<T: BlendStruct>(&mut self) -> &mut Self {
        self.decoders.insert(T::TYPE_NAME, decode_structs::<T>);
        self
    }

    pub fn with<T: BlendStruct>(mut self) -> Self {
        self.register::<T>();
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.decoders.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl StructDispatch for Registry {
    fn decode_struct(
        &self,
        type_name: &str,
        header: &BlockHeader,
        reader: &mut dyn Read,
        endianness: Endianness,
    ) -> Result<Body, ResolveError> {
        match self.decoders.get(type_name) {
            Some(decode) => decode(type_name, header, reader, endianness),
            None => Err(ResolveError::UnknownSchemaType(type_name.to_string())),
        }
    }
}

fn read_all(reader: &mut dyn Read) -> Result<Vec<u8>, ResolveError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}

impl Block {
    pub fn new(header: BlockHeader, data: Vec<u8>) -> Self {
        Self::from_reader(header, Cursor::new(data))
    }

    /// Creates a block whose body will be read from `reader`. The reader must stop at the end of the body.
    pub fn from_reader<R: Read + Send + 'static>(header: BlockHeader, reader: R) -> Self {
        Self {
            header,
            body: Body::Unresolved(Box::new(reader)),
        }
    }

    /// Decodes the body of the block. Calling it on a resolved block does nothing. On error the body is left
    /// unresolved, but the reader may have been partially consumed.
    pub fn resolve_body<D: StructDispatch + ?Sized>(
        &mut self,
        endianness: Endianness,
        dna: &Dna,
        dispatch: &D,
    ) -> Result<(), ResolveError> {
        let reader = match &mut self.body {
            Body::Unresolved(reader) => reader,
            _ => return Ok(()),
        };
        let header = &self.header;

        let body = if header.sdna_index == 0 {
            trace!(code = %code_str(&header.code), size = header.size, "resolving by code");

            match header.code {
                CODE_DATA => Body::Raw(read_all(reader)?),
                CODE_DNA => {
                    let data = read_all(reader)?;
                    Body::Dna(finish(DnaParseContext::new(endianness).dna(&data))?)
                }
                code if SENTINEL_CODES.contains(&code) => {
                    debug!(code = %code_str(&code), "no structural decoding, keeping raw bytes");
                    Body::Raw(read_all(reader)?)
                }
                code => return Err(ResolveError::UnsupportedBlockCode { code }),
            }
        } else {
            let type_name = dna
                .type_name(header.sdna_index)
                .ok_or(ResolveError::InvalidSchemaIndex(header.sdna_index))?;

            trace!(
                code = %code_str(&header.code),
                type_name,
                count = header.count,
                "resolving by schema"
            );

            dispatch.decode_struct(type_name, header, reader, endianness)?
        };

        debug!(code = %code_str(&header.code), body = ?body, "resolved block body");
        self.body = body;

        Ok(())
    }
}

/// Formats `data` like `hexdump -C`: offset, 16 bytes in hex and their printable characters.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();

    for (i, line) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x} ", i * 16);
        for j in 0..16 {
            if j == 8 {
                out.push(' ');
            }
            match line.get(j) {
                Some(b) => {
                    let _ = write!(out, " {:02x}", b);
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  |");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }

    out
}
