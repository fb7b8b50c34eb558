//! Byte-order aware decoding of fixed-size records.
//!
//! Every type that can be read from a block body implements `Decode`. A `Decode` implementation reads exactly
//! `SIZE` bytes and honors the byte order of the file for every multi-byte number. Structs don't get implicit
//! alignment: padding has to be declared as a field (Blender names them `_pad`, `_pad1`, etc.), which is also how
//! the DNA describes them.
//!
//! Struct declarations are written with `blend_struct!`:
//!
//! ```
//! use blendef::{blend_struct, decode::Decode, Endianness};
//!
//! blend_struct! {
//!     pub struct MVert as "MVert" {
//!         pub co: [f32; 3],
//!         pub no: [i16; 3],
//!         pub flag: u8,
//!         pub bweight: u8,
//!     }
//! }
//!
//! assert_eq!(MVert::SIZE, 20);
//! let data = [0u8; 20];
//! let vert = MVert::decode(&mut &data[..], Endianness::Little).unwrap();
//! assert_eq!(vert.co, [0.0; 3]);
//! ```

use crate::parsers::Endianness;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::{
    any::Any,
    convert::TryInto,
    fmt::Debug,
    io::{self, Read},
    mem::size_of,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The reader ran out of bytes in the middle of a value.
    #[error("data ended before a complete value could be decoded")]
    UnexpectedEof,
    #[error("i/o error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => DecodeError::UnexpectedEof,
            _ => DecodeError::Io(e),
        }
    }
}

/// A value with a fixed binary size that can be read in either byte order.
pub trait Decode: Sized {
    /// Number of bytes consumed by a successful `decode`.
    const SIZE: usize;

    fn decode<R: Read + ?Sized>(reader: &mut R, endianness: Endianness) -> Result<Self, DecodeError>;
}

/// A struct declaration matching a DNA struct of a given Blender version.
pub trait BlendStruct: Decode + Debug + Any + Send + Sync {
    /// The DNA type name this struct decodes, e.g. `"bNodeTree"`.
    const TYPE_NAME: &'static str;
}

/// Object safe view of a decoded `BlendStruct`, used to store structs of any type in a block body.
pub trait AnyStruct: Debug + Any + Send + Sync {
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: BlendStruct> AnyStruct for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn AnyStruct {
    pub fn downcast_ref<T: BlendStruct>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl Decode for u8 {
    const SIZE: usize = 1;

    fn decode<R: Read + ?Sized>(reader: &mut R, _endianness: Endianness) -> Result<Self, DecodeError> {
        Ok(reader.read_u8()?)
    }
}

impl Decode for i8 {
    const SIZE: usize = 1;

    fn decode<R: Read + ?Sized>(reader: &mut R, _endianness: Endianness) -> Result<Self, DecodeError> {
        Ok(reader.read_i8()?)
    }
}

macro_rules! decode_primitive {
    ($(($ty:ty, $read:ident)),*) => {
        $(
            impl Decode for $ty {
                const SIZE: usize = size_of::<$ty>();

                fn decode<R: Read + ?Sized>(
                    reader: &mut R,
                    endianness: Endianness,
                ) -> Result<Self, DecodeError> {
                    let value = match endianness {
                        Endianness::Little => reader.$read::<LittleEndian>()?,
                        Endianness::Big => reader.$read::<BigEndian>()?,
                    };
                    Ok(value)
                }
            }
        )*
    };
}

decode_primitive!(
    (u16, read_u16),
    (i16, read_i16),
    (u32, read_u32),
    (i32, read_i32),
    (u64, read_u64),
    (i64, read_i64),
    (f32, read_f32),
    (f64, read_f64)
);

impl<T: Decode, const N: usize> Decode for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn decode<R: Read + ?Sized>(reader: &mut R, endianness: Endianness) -> Result<Self, DecodeError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(reader, endianness)?);
        }
        Ok(items
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly N items were decoded")))
    }
}

/// Declares a struct whose fields are decoded in declaration order, and implements `Decode` and `BlendStruct` for
/// it. The DNA type name defaults to the struct name and can be given explicitly with `as "name"`, which is needed
/// when the DNA name is not the Rust type name (`bNodeTree`).
#[macro_export]
macro_rules! blend_struct {
    (
        @declare [$(#[$meta:meta])*] $vis:vis $name:ident, $type_name:expr,
        { $($fvis:vis $field:ident : $fty:ty),* }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name {
            $($fvis $field: $fty),*
        }

        impl $crate::decode::Decode for $name {
            const SIZE: usize = 0 $(+ <$fty as $crate::decode::Decode>::SIZE)*;

            fn decode<R: ::std::io::Read + ?Sized>(
                reader: &mut R,
                endianness: $crate::Endianness,
            ) -> ::std::result::Result<Self, $crate::decode::DecodeError> {
                Ok(Self {
                    $($field: <$fty as $crate::decode::Decode>::decode(reader, endianness)?),*
                })
            }
        }

        impl $crate::decode::BlendStruct for $name {
            const TYPE_NAME: &'static str = $type_name;
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident as $type_name:literal {
            $($fvis:vis $field:ident : $fty:ty),* $(,)?
        }
    ) => {
        $crate::blend_struct! {
            @declare [$(#[$meta])*] $vis $name, $type_name, { $($fvis $field: $fty),* }
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($fvis:vis $field:ident : $fty:ty),* $(,)?
        }
    ) => {
        $crate::blend_struct! {
            @declare [$(#[$meta])*] $vis $name, stringify!($name), { $($fvis $field: $fty),* }
        }
    };
}
