// Code generated by blendef for Blender v280. DO NOT EDIT.

use blendef::{
    body::{decode_structs, BlockHeader, Body, ResolveError, StructDispatch},
    Endianness,
};
use std::io::Read;

use super::*;

/// Decodes the struct blocks of files saved by Blender v280.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatch;

impl StructDispatch for Dispatch {
    fn decode_struct(
        &self,
        type_name: &str,
        header: &BlockHeader,
        reader: &mut dyn Read,
        endianness: Endianness,
    ) -> Result<Body, ResolveError> {
        match type_name {
            "Link" => decode_structs::<Link>(type_name, header, reader, endianness),
            "Vert" => decode_structs::<Vert>(type_name, header, reader, endianness),
            "bPair" => decode_structs::<BPair>(type_name, header, reader, endianness),
            _ => Err(ResolveError::UnknownSchemaType(type_name.to_string())),
        }
    }
}
