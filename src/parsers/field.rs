//! Grammar of the names stored in the DNA `NAME` table. A DNA name carries more than the field identifier: it also
//! tells if the field is a pointer (`*next`, `**mat`), a function pointer (`(*func)()`) or an array (`co[3]`,
//! `mat[4][4]`, `*mtex[18]`). The type of a field alone is not enough to know its size in bytes.

use super::{BlendParseError, PointerSize};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_until},
    combinator::complete,
    error::{ErrorKind, ParseError},
    multi::{many0, many1},
    sequence::delimited,
    Err, IResult,
};

#[derive(Debug)]
enum FieldParseError {
    Nom,
    InvalidArraySize,
}

impl ParseError<&str> for FieldParseError {
    fn from_error_kind(_input: &str, _kind: ErrorKind) -> Self {
        FieldParseError::Nom
    }

    fn append(_input: &str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type Result<'a, T> = IResult<&'a str, T, FieldParseError>;

/// How a field is stored inside its struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Value,
    ValueArray {
        dimensions: Vec<usize>,
    },
    Pointer {
        indirection_count: usize,
    },
    PointerArray {
        indirection_count: usize,
        dimensions: Vec<usize>,
    },
    FnPointer,
}

impl FieldKind {
    /// Number of elements stored by the field, 1 unless it is an array.
    pub fn len(&self) -> usize {
        match self {
            FieldKind::ValueArray { dimensions } | FieldKind::PointerArray { dimensions, .. } => {
                dimensions.iter().product()
            }
            _ => 1,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            FieldKind::Pointer { .. } | FieldKind::PointerArray { .. } | FieldKind::FnPointer
        )
    }

    /// Size of the field in bytes. `type_len` is the size the DNA declares for the field type, which only matters
    /// for non-pointer fields.
    pub fn bytes_len(&self, type_len: usize, pointer_size: PointerSize) -> usize {
        if self.is_pointer() {
            pointer_size.bytes_num() * self.len()
        } else {
            type_len * self.len()
        }
    }
}

fn fn_pointer(input: &str) -> Result<(&str, FieldKind)> {
    let (input, name) = delimited(tag("(*"), take_until(")"), tag(")"))(input)?;
    let (input, _) = delimited(tag("("), take_until(")"), tag(")"))(input)?;

    Ok((input, (name, FieldKind::FnPointer)))
}

fn array_dimensions(input: &str) -> Result<Vec<usize>> {
    let (input, dimensions) =
        many0(complete(delimited(tag("["), take_until("]"), tag("]"))))(input)?;

    let mut parsed = Vec::with_capacity(dimensions.len());
    for dimension in dimensions {
        parsed.push(
            dimension
                .parse::<usize>()
                .map_err(|_| Err::Failure(FieldParseError::InvalidArraySize))?,
        );
    }

    Ok((input, parsed))
}

fn pointer(input: &str) -> Result<(&str, FieldKind)> {
    let (input, asterisks) = many1(tag("*"))(input)?;
    let (input, name) = take_till(|c: char| c == '[')(input)?;
    let indirection_count = asterisks.len();

    if input.is_empty() {
        return Ok((input, (name, FieldKind::Pointer { indirection_count })));
    }

    let (input, dimensions) = array_dimensions(input)?;
    Ok((
        input,
        (
            name,
            FieldKind::PointerArray {
                indirection_count,
                dimensions,
            },
        ),
    ))
}

fn value(input: &str) -> Result<(&str, FieldKind)> {
    let (input, name) = take_till(|c: char| c == '[')(input)?;

    if input.is_empty() {
        return Ok((input, (name, FieldKind::Value)));
    }

    let (input, dimensions) = array_dimensions(input)?;
    Ok((input, (name, FieldKind::ValueArray { dimensions })))
}

/// Splits a DNA name into the bare field identifier and the way the field is stored.
pub fn parse_field(full_name: &str) -> std::result::Result<(&str, FieldKind), BlendParseError> {
    match alt((fn_pointer, pointer, value))(full_name) {
        Ok(("", (name, kind))) if !name.is_empty() => Ok((name, kind)),
        _ => Err(BlendParseError::InvalidFieldName(full_name.to_string())),
    }
}
