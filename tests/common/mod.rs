#![allow(dead_code)]

use blendef::{blend_struct, parsers::dna::DnaParseContext, Dna, Endianness, PointerSize};

blend_struct! {
    pub struct Link {
        pub next: u64,
        pub prev: u64,
    }
}

blend_struct! {
    pub struct Vert {
        pub co: [f32; 3],
        pub flag: i32,
    }
}

blend_struct! {
    pub struct BPair as "bPair" {
        pub a: i32,
        pub b: [i16; 2],
    }
}

/// Schema indices of the sample DNA.
pub const LINK: u32 = 0;
pub const VERT: u32 = 1;
pub const PAIR: u32 = 2;
/// A struct with no Rust declaration.
pub const GHOST: u32 = 3;

pub fn push_u16(out: &mut Vec<u8>, n: u16, endianness: Endianness) {
    match endianness {
        Endianness::Little => out.extend_from_slice(&n.to_le_bytes()),
        Endianness::Big => out.extend_from_slice(&n.to_be_bytes()),
    }
}

pub fn push_u32(out: &mut Vec<u8>, n: u32, endianness: Endianness) {
    match endianness {
        Endianness::Little => out.extend_from_slice(&n.to_le_bytes()),
        Endianness::Big => out.extend_from_slice(&n.to_be_bytes()),
    }
}

pub fn push_i32(out: &mut Vec<u8>, n: i32, endianness: Endianness) {
    push_u32(out, n as u32, endianness)
}

pub fn push_i16(out: &mut Vec<u8>, n: i16, endianness: Endianness) {
    push_u16(out, n as u16, endianness)
}

/// Sections are aligned to 4 bytes from the start of the DNA block.
fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn push_strings(out: &mut Vec<u8>, section: &[u8], strings: &[&str], endianness: Endianness) {
    out.extend_from_slice(section);
    push_u32(out, strings.len() as u32, endianness);
    for s in strings {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    pad4(out);
}

/// DNA with `Link`, `Vert`, `bPair` and `Ghost` at schema indices 0 to 3.
pub fn sample_sdna(endianness: Endianness) -> Vec<u8> {
    let names = ["*next", "*prev", "co[3]", "flag", "a", "b[2]"];
    let types = [
        ("char", 1),
        ("short", 2),
        ("int", 4),
        ("float", 4),
        ("Link", 16),
        ("Vert", 16),
        ("bPair", 8),
        ("Ghost", 4),
    ];
    let structs: [(u16, &[(u16, u16)]); 4] = [
        (4, &[(4, 0), (4, 1)][..]),
        (5, &[(3, 2), (2, 3)][..]),
        (6, &[(2, 4), (1, 5)][..]),
        (7, &[(2, 3)][..]),
    ];

    let mut out = b"SDNA".to_vec();
    push_strings(&mut out, b"NAME", &names, endianness);
    let type_names: Vec<_> = types.iter().map(|(name, _)| *name).collect();
    push_strings(&mut out, b"TYPE", &type_names, endianness);
    out.extend_from_slice(b"TLEN");
    for (_, len) in &types {
        push_u16(&mut out, *len, endianness);
    }
    pad4(&mut out);
    out.extend_from_slice(b"STRC");
    push_u32(&mut out, structs.len() as u32, endianness);
    for (type_index, fields) in &structs {
        push_u16(&mut out, *type_index, endianness);
        push_u16(&mut out, fields.len() as u16, endianness);
        for (field_type, field_name) in fields.iter() {
            push_u16(&mut out, *field_type, endianness);
            push_u16(&mut out, *field_name, endianness);
        }
    }
    out
}

pub fn sample_dna(endianness: Endianness) -> Dna {
    let data = sample_sdna(endianness);
    let (_, dna) = DnaParseContext::new(endianness).dna(&data).unwrap();
    dna
}

/// Encodes `bPair` structs whose `a` is their position and `b` is `[-a, a * 2]`.
pub fn pairs_bytes(n: usize, endianness: Endianness) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..n {
        push_i32(&mut out, i as i32, endianness);
        push_i16(&mut out, -(i as i16), endianness);
        push_i16(&mut out, (i * 2) as i16, endianness);
    }
    out
}

pub fn vert_bytes(co: [f32; 3], flag: i32, endianness: Endianness) -> Vec<u8> {
    let mut out = Vec::new();
    for c in &co {
        push_u32(&mut out, c.to_bits(), endianness);
    }
    push_i32(&mut out, flag, endianness);
    out
}

/// Writes a .blend file block by block.
pub struct BlendWriter {
    endianness: Endianness,
    pointer_size: PointerSize,
    data: Vec<u8>,
}

impl BlendWriter {
    pub fn new(endianness: Endianness, pointer_size: PointerSize, version: &[u8; 3]) -> Self {
        let mut data = b"BLENDER".to_vec();
        data.push(match pointer_size {
            PointerSize::Bits32 => b'_',
            PointerSize::Bits64 => b'-',
        });
        data.push(match endianness {
            Endianness::Little => b'v',
            Endianness::Big => b'V',
        });
        data.extend_from_slice(version);

        Self {
            endianness,
            pointer_size,
            data,
        }
    }

    pub fn block(
        mut self,
        code: &[u8; 4],
        address: u64,
        sdna_index: u32,
        count: u32,
        body: &[u8],
    ) -> Self {
        let e = self.endianness;
        self.data.extend_from_slice(code);
        push_u32(&mut self.data, body.len() as u32, e);
        match (self.pointer_size, e) {
            (PointerSize::Bits32, _) => push_u32(&mut self.data, address as u32, e),
            (PointerSize::Bits64, Endianness::Little) => {
                self.data.extend_from_slice(&address.to_le_bytes())
            }
            (PointerSize::Bits64, Endianness::Big) => {
                self.data.extend_from_slice(&address.to_be_bytes())
            }
        }
        push_u32(&mut self.data, sdna_index, e);
        push_u32(&mut self.data, count, e);
        self.data.extend_from_slice(body);
        self
    }

    pub fn dna(self) -> Self {
        let sdna = sample_sdna(self.endianness);
        self.block(b"DNA1", 0x1000, 0, 1, &sdna)
    }

    pub fn finish(self) -> Vec<u8> {
        self.block(b"ENDB", 0, 0, 0, &[]).data
    }
}
