//! # blendef - Resolving the block bodies of .blend files
//!
//! ## Example
//!
//! ```ignore
//! use blendef::{blend_struct, BlendFile, Registry};
//!
//! blend_struct! {
//!     pub struct MVert {
//!         pub co: [f32; 3],
//!         pub no: [i16; 3],
//!         pub flag: u8,
//!         pub bweight: u8,
//!     }
//! }
//!
//! fn main() {
//!     let mut blend = BlendFile::from_path("file.blend").unwrap();
//!     let registry = Registry::new().with::<MVert>();
//!
//!     for block in &mut blend.blocks {
//!         if blend.dna.type_name(block.header.sdna_index) == Some("MVert") {
//!             block.resolve_body(blend.header.endianness, &blend.dna, &registry).unwrap();
//!             println!("{:?}", block.body.many::<MVert>());
//!         }
//!     }
//! }
//! ```
//!
//! ## The .blend file
//!
//! Blender saves a file by dumping its memory to disk. A .blend file is a header followed by a list of blocks, each
//! block being a header (code, size, old memory address, schema index and count) followed by the bytes of one or
//! more C structs. The layout of those structs is not fixed: it is described by the DNA, a catalog stored in the
//! file itself (the `DNA1` block), so each Blender version can change it.
//!
//! To decode a block body this crate needs to know:
//!
//! * the byte order of the file, given by its header;
//! * which struct the block holds, given by the DNA entry its schema index points to;
//! * how many structs the block holds, given by its count.
//!
//! Blocks with a schema index of `0` are special and are decoded by their code instead: `DATA` is kept as raw bytes,
//! `DNA1` is parsed into a `Dna`, `REND` and `TEST` are kept as raw bytes as well.
//!
//! ## Struct declarations and generated dispatch
//!
//! The DNA is data but Rust structs are not. Struct declarations for a Blender version are written with
//! `blend_struct!` and mapped to their DNA type names by a `StructDispatch`. The dispatch can be filled at run time
//! with a `Registry` or generated ahead of time from a file's DNA with the `blendef gen` command (see `codegen`).
//! The declarations and the dispatch must come from the same Blender version. When they don't, resolution fails
//! with `ResolveError::UnknownSchemaType` or `ResolveError::LayoutMismatch` rather than returning garbage.
//!
//! ### Limitations
//!
//! This crate does not support writing .blend files and does not interpret what the decoded fields mean.

pub mod body;
pub mod codegen;
pub mod decode;
pub mod parsers;

pub use body::{decode_structs, Block, BlockHeader, Body, Registry, ResolveError, StructDispatch};
pub use decode::{AnyStruct, BlendStruct, Decode, DecodeError};
pub use parsers::{
    blend::{BlendFile, Header},
    dna::{Dna, FieldLayout, SchemaEntry},
    BlendParseError, Endianness, PointerSize,
};
