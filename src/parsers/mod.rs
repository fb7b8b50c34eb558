pub mod blend;
pub mod dna;
pub mod field;

use nom::{
    error::{ErrorKind, ParseError},
    IResult,
};
use std::io;
use thiserror::Error;

pub(crate) type Result<'a, T> = IResult<&'a [u8], T, BlendParseError>;

/// Size of a pointer on the machine used to create the .blend file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PointerSize {
    Bits32,
    Bits64,
}

impl PointerSize {
    /// Returns the pointer size in bytes.
    pub fn bytes_num(self) -> usize {
        match self {
            PointerSize::Bits32 => 4,
            PointerSize::Bits64 => 8,
        }
    }
}

/// Endianness of the machine used to create the .blend file. Every multi-byte number in the file, block headers
/// and block bodies alike, is stored in this order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Errors that can happen while scanning the .blend file into blocks or while parsing its DNA.
/// Most errors are simply `NomError` but a few of them are specific either
/// for better error reporting or due to custom logic.
#[derive(Debug, Error)]
pub enum BlendParseError {
    #[error("parser error ({kind:?})")]
    NomError {
        kind: ErrorKind,
        other: Option<Box<BlendParseError>>,
    },
    #[error("i/o error: {0}")]
    IoError(#[from] io::Error),
    /// Returned when the file is incomplete.
    #[error("not enough data")]
    NotEnoughData,
    /// Returned when a block header is cut short or its code is not made of printable characters.
    #[error("unknown block code {0:?}")]
    UnknownBlockCode([u8; 4]),
    /// Returned when no `DNA1` block is found before `ENDB`.
    #[error("no DNA1 block found")]
    NoDnaBlockFound,
    /// Returned when the data doesn't start with `b"BLENDER"`, not even after gzip decompression.
    #[error("file is neither a .blend file nor a gzip compressed one")]
    CompressedFileNotSupported,
    /// A DNA name that doesn't follow the `*name[a][b]` / `(*name)()` grammar.
    #[error("invalid field name {0:?}")]
    InvalidFieldName(String),
    /// A struct or type index pointing outside the DNA tables.
    #[error("index {0} is outside the DNA tables")]
    InvalidStructIndex(usize),
    /// The field sizes of a struct don't add up to the size the DNA declares for its type.
    #[error("fields of {type_name} add up to {fields_len} bytes but the type is {type_len} bytes")]
    LayoutSizeMismatch {
        type_name: String,
        fields_len: usize,
        type_len: usize,
    },
}

impl ParseError<&[u8]> for BlendParseError {
    fn from_error_kind(_input: &[u8], kind: ErrorKind) -> Self {
        BlendParseError::NomError { kind, other: None }
    }

    fn append(_input: &[u8], kind: ErrorKind, other: Self) -> Self {
        BlendParseError::NomError {
            kind,
            other: Some(Box::new(other)),
        }
    }
}

/// Turns the outcome of a complete nom parse into a plain `Result`.
pub(crate) fn finish<T>(
    res: IResult<&[u8], T, BlendParseError>,
) -> std::result::Result<T, BlendParseError> {
    match res {
        Ok((_, v)) => Ok(v),
        Err(nom::Err::Failure(e)) | Err(nom::Err::Error(e)) => Err(e),
        Err(nom::Err::Incomplete(..)) => Err(BlendParseError::NotEnoughData),
    }
}
