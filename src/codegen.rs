//! Generation of the struct dispatch for one Blender version.
//!
//! The DNA of a .blend file lists every struct type of the Blender version that saved it. `generate` turns that list
//! into Rust source for a `Dispatch` type implementing `StructDispatch`, with one match arm per type name. The output
//! is meant to be placed in a module next to the `blend_struct!` declarations of the same version (it imports them
//! with `use super::*`), the two have to be regenerated together. Nothing here checks that a declaration exists for
//! every type name: a missing one is a compile error in the generated module, a wrong one is a `LayoutMismatch`
//! when decoding.

use std::{
    collections::BTreeSet,
    fmt::Write as _,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// File name of the generated source inside the output directory.
pub const GENERATED_FILE_NAME: &str = "dispatch.rs";

const PRELUDE: &str = "\
// Code generated by blendef for Blender v{version}. DO NOT EDIT.

use blendef::{
    body::{decode_structs, BlockHeader, Body, ResolveError, StructDispatch},
    Endianness,
};
use std::io::Read;

use super::*;

/// Decodes the struct blocks of files saved by Blender v{version}.
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
";

const POSTLUDE: &str = "            _ => Err(ResolveError::UnknownSchemaType(type_name.to_string())),
        }
    }
}
";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("could not write generated source: {0}")]
    Io(#[from] io::Error),
    /// The DNA type name can't be turned into a Rust type name.
    #[error("type name {0:?} is not an identifier")]
    InvalidTypeName(String),
}

/// Rust type name used for a DNA type name: the first letter is upper-cased, `bNodeTree` becomes `BNodeTree`.
pub fn type_ident(type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Checks that `type_name` is a C identifier, which is all the DNA is expected to contain.
pub fn is_identifier(type_name: &str) -> bool {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Renders the dispatch source for `type_names`. Names are sorted and de-duplicated first, so the same set of names
/// always renders the same text whatever order they were found in.
pub fn generate<I, S>(type_names: I, version: u32) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let type_names: BTreeSet<String> = type_names
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect();

    let mut out = PRELUDE.replace("{version}", &version.to_string());

    for type_name in &type_names {
        // Writing to a String can't fail.
        let _ = writeln!(
            out,
            "            {:?} => decode_structs::<{}>(type_name, header, reader, endianness),",
            type_name,
            type_ident(type_name)
        );
    }

    out.push_str(POSTLUDE);
    out
}

/// Generates the dispatch source and writes it to `GENERATED_FILE_NAME` inside `dir`, returning the path written.
pub fn write_dispatch<I, S>(dir: &Path, type_names: I, version: u32) -> Result<PathBuf, GenerateError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let type_names: Vec<S> = type_names.into_iter().collect();

    if let Some(bad) = type_names.iter().find(|name| !is_identifier(name.as_ref())) {
        return Err(GenerateError::InvalidTypeName(bad.as_ref().to_string()));
    }

    let source = generate(&type_names, version);
    let path = dir.join(GENERATED_FILE_NAME);
    fs::write(&path, source)?;

    info!(
        path = %path.display(),
        types = type_names.len(),
        version,
        "wrote struct dispatch"
    );

    Ok(path)
}
