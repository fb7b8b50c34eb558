//! The DNA (or SDNA) is the schema catalog Blender writes at the end of every .blend file. It lists every field
//! name, every type with its size in bytes and every struct as a list of (type, name) pairs. Block headers refer
//! to the `structs` table through their schema index.

use super::{
    field::{parse_field, FieldKind},
    BlendParseError, Endianness, PointerSize, Result,
};
use linked_hash_map::LinkedHashMap;
use nom::{
    bytes::complete::{tag, take, take_while},
    combinator::map,
    multi::count,
    number::complete::{be_u16, be_u32, le_u16, le_u32},
    sequence::terminated,
};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct Dna {
    pub names: Vec<String>,
    pub types: Vec<DnaType>,
    pub structs: Vec<DnaStruct>,
}

#[derive(Debug)]
pub struct DnaType {
    pub name: String,
    pub bytes_len: usize, //size in bytes of the type
}

#[derive(Debug)]
pub struct DnaField {
    pub type_index: usize, //index on Dna::types array
    pub name_index: usize, //index on Dna::names array
}

#[derive(Debug)]
pub struct DnaStruct {
    pub type_index: usize, //index on Dna::types array
    pub fields: Vec<DnaField>,
}

/// A single field of a `SchemaEntry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub type_name: String,
    pub kind: FieldKind,
    /// Offset of the field from the start of the struct.
    pub offset: usize,
    /// Size of the field in bytes, for arrays this is the size of the whole array.
    pub size: usize,
}

/// The layout of one DNA struct, with field sizes resolved for a given pointer size.
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub type_name: String,
    pub size: usize,
    /// Fields in declaration order, keyed by their bare name.
    pub fields: LinkedHashMap<String, FieldLayout>,
}

impl Dna {
    /// Name of the struct type selected by a block header's schema index.
    pub fn type_name(&self, schema_index: usize) -> Option<&str> {
        let dna_struct = self.structs.get(schema_index)?;
        self.types
            .get(dna_struct.type_index)
            .map(|t| t.name.as_str())
    }

    /// Every struct type name in the catalog, sorted and without repetitions.
    pub fn struct_type_names(&self) -> BTreeSet<&str> {
        (0..self.structs.len())
            .filter_map(|i| self.type_name(i))
            .collect()
    }

    /// Computes the field layout of the struct at `schema_index`. The sum of the field sizes must match the size the
    /// DNA declares for the struct type.
    pub fn schema_entry(
        &self,
        schema_index: usize,
        pointer_size: PointerSize,
    ) -> std::result::Result<SchemaEntry, BlendParseError> {
        let dna_struct = self
            .structs
            .get(schema_index)
            .ok_or(BlendParseError::InvalidStructIndex(schema_index))?;
        let dna_type = self.get_type(dna_struct.type_index)?;

        let mut fields = LinkedHashMap::new();
        let mut offset = 0;

        for field in &dna_struct.fields {
            let field_type = self.get_type(field.type_index)?;
            let full_name = self
                .names
                .get(field.name_index)
                .ok_or(BlendParseError::InvalidStructIndex(field.name_index))?;
            let (name, kind) = parse_field(full_name)?;
            let size = kind.bytes_len(field_type.bytes_len, pointer_size);

            fields.insert(
                name.to_string(),
                FieldLayout {
                    type_name: field_type.name.clone(),
                    kind,
                    offset,
                    size,
                },
            );

            offset += size;
        }

        if offset != dna_type.bytes_len {
            return Err(BlendParseError::LayoutSizeMismatch {
                type_name: dna_type.name.clone(),
                fields_len: offset,
                type_len: dna_type.bytes_len,
            });
        }

        Ok(SchemaEntry {
            type_name: dna_type.name.clone(),
            size: dna_type.bytes_len,
            fields,
        })
    }

    fn get_type(&self, type_index: usize) -> std::result::Result<&DnaType, BlendParseError> {
        self.types
            .get(type_index)
            .ok_or(BlendParseError::InvalidStructIndex(type_index))
    }
}

/// Number of bytes needed to move from `len` to the next multiple of 4.
fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

#[derive(Debug)]
pub struct DnaParseContext {
    endianness: Endianness,
}

impl DnaParseContext {
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }

    fn u32<'b>(&self, input: &'b [u8]) -> Result<'b, usize> {
        let (input, n) = match self.endianness {
            Endianness::Little => le_u32(input)?,
            Endianness::Big => be_u32(input)?,
        };
        Ok((input, n as usize))
    }

    fn u16<'b>(&self, input: &'b [u8]) -> Result<'b, usize> {
        let (input, n) = match self.endianness {
            Endianness::Little => le_u16(input)?,
            Endianness::Big => be_u16(input)?,
        };
        Ok((input, usize::from(n)))
    }

    /// A section made of a 4 byte tag, a count and that many null terminated strings, padded to 4 bytes.
    fn strings<'b>(&self, input: &'b [u8], section: &'static str) -> Result<'b, Vec<String>> {
        let (input, _) = tag(section)(input)?;
        let (input, len) = self.u32(input)?;

        let (input, strings) = count(
            terminated(
                map(take_while(|b: u8| b != 0), |b: &[u8]| {
                    (b.len(), String::from_utf8_lossy(b).into_owned())
                }),
                tag("\0"),
            ),
            len,
        )(input)?;

        //+1 for the null terminating separator
        let strings_len: usize = strings.iter().map(|(len, _)| len + 1).sum();
        let (input, _) = take(padding(strings_len))(input)?;

        Ok((input, strings.into_iter().map(|(_, s)| s).collect()))
    }

    fn types<'b>(&self, input: &'b [u8]) -> Result<'b, Vec<DnaType>> {
        let (input, type_names) = self.strings(input, "TYPE")?;
        let types_len = type_names.len();

        let (input, _) = tag("TLEN")(input)?;
        let (input, type_lengths) = count(|i| self.u16(i), types_len)(input)?;
        let (input, _) = take(padding(types_len * 2))(input)?;

        Ok((
            input,
            type_names
                .into_iter()
                .zip(type_lengths)
                .map(|(name, bytes_len)| DnaType { name, bytes_len })
                .collect(),
        ))
    }

    fn field<'b>(&self, input: &'b [u8]) -> Result<'b, DnaField> {
        let (input, type_index) = self.u16(input)?;
        let (input, name_index) = self.u16(input)?;
        Ok((
            input,
            DnaField {
                type_index,
                name_index,
            },
        ))
    }

    fn dna_struct<'b>(&self, input: &'b [u8]) -> Result<'b, DnaStruct> {
        let (input, type_index) = self.u16(input)?;
        let (input, fields_num) = self.u16(input)?;
        let (input, fields) = count(|i| self.field(i), fields_num)(input)?;

        Ok((input, DnaStruct { type_index, fields }))
    }

    fn structs<'b>(&self, input: &'b [u8]) -> Result<'b, Vec<DnaStruct>> {
        let (input, _) = tag("STRC")(input)?;
        let (input, structs_len) = self.u32(input)?;
        count(|i| self.dna_struct(i), structs_len)(input)
    }

    pub fn dna<'b>(&self, input: &'b [u8]) -> Result<'b, Dna> {
        let (input, _) = tag("SDNA")(input)?;
        let (input, names) = self.strings(input, "NAME")?;
        let (input, types) = self.types(input)?;
        let (input, structs) = self.structs(input)?;

        Ok((
            input,
            Dna {
                names,
                types,
                structs,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u16(out: &mut Vec<u8>, n: u16, endianness: Endianness) {
        match endianness {
            Endianness::Little => out.extend_from_slice(&n.to_le_bytes()),
            Endianness::Big => out.extend_from_slice(&n.to_be_bytes()),
        }
    }

    fn push_u32(out: &mut Vec<u8>, n: u32, endianness: Endianness) {
        match endianness {
            Endianness::Little => out.extend_from_slice(&n.to_le_bytes()),
            Endianness::Big => out.extend_from_slice(&n.to_be_bytes()),
        }
    }

    fn push_strings(out: &mut Vec<u8>, section: &[u8], strings: &[&str], endianness: Endianness) {
        out.extend_from_slice(section);
        push_u32(out, strings.len() as u32, endianness);
        let mut len = 0;
        for s in strings {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
            len += s.len() + 1;
        }
        out.extend(std::iter::repeat(0).take(padding(len)));
    }

    /// Encodes a DNA block body. `structs` is a list of (type index, [(field type index, field name index)]).
    fn sdna_bytes(
        names: &[&str],
        types: &[(&str, u16)],
        structs: &[(u16, &[(u16, u16)])],
        endianness: Endianness,
    ) -> Vec<u8> {
        let mut out = b"SDNA".to_vec();
        push_strings(&mut out, b"NAME", names, endianness);
        let type_names: Vec<_> = types.iter().map(|(name, _)| *name).collect();
        push_strings(&mut out, b"TYPE", &type_names, endianness);
        out.extend_from_slice(b"TLEN");
        for (_, len) in types {
            push_u16(&mut out, *len, endianness);
        }
        out.extend(std::iter::repeat(0).take(padding(types.len() * 2)));
        out.extend_from_slice(b"STRC");
        push_u32(&mut out, structs.len() as u32, endianness);
        for (type_index, fields) in structs {
            push_u16(&mut out, *type_index, endianness);
            push_u16(&mut out, fields.len() as u16, endianness);
            for (field_type, field_name) in fields.iter() {
                push_u16(&mut out, *field_type, endianness);
                push_u16(&mut out, *field_name, endianness);
            }
        }
        out
    }

    fn sample_sdna(endianness: Endianness) -> Vec<u8> {
        sdna_bytes(
            &["*next", "*prev", "co[3]", "flag", "obmat[4][4]"],
            &[
                ("char", 1),
                ("short", 2),
                ("int", 4),
                ("float", 4),
                ("Link", 16),
                ("Vert", 16),
                ("Mat", 64),
            ],
            &[
                (4, &[(4, 0), (4, 1)][..]),
                (5, &[(3, 2), (2, 3)][..]),
                (6, &[(3, 4)][..]),
            ],
            endianness,
        )
    }

    fn parse(data: &[u8], endianness: Endianness) -> Dna {
        let (_, dna) = DnaParseContext::new(endianness).dna(data).unwrap();
        dna
    }

    #[test]
    fn parses_tables_in_both_byte_orders() {
        for &endianness in &[Endianness::Little, Endianness::Big] {
            let dna = parse(&sample_sdna(endianness), endianness);
            assert_eq!(dna.names.len(), 5);
            assert_eq!(dna.types.len(), 7);
            assert_eq!(dna.types[6].bytes_len, 64);
            assert_eq!(dna.structs.len(), 3);
            assert_eq!(dna.type_name(1), Some("Vert"));
            assert_eq!(dna.type_name(3), None);
        }
    }

    #[test]
    fn struct_type_names_are_sorted() {
        let dna = parse(&sample_sdna(Endianness::Little), Endianness::Little);
        let names: Vec<_> = dna.struct_type_names().into_iter().collect();
        assert_eq!(names, vec!["Link", "Mat", "Vert"]);
    }

    #[test]
    fn schema_entry_resolves_field_sizes() {
        let dna = parse(&sample_sdna(Endianness::Little), Endianness::Little);

        let link = dna.schema_entry(0, PointerSize::Bits64).unwrap();
        assert_eq!(link.type_name, "Link");
        assert_eq!(link.fields["prev"].offset, 8);
        assert_eq!(link.fields["prev"].size, 8);

        let vert = dna.schema_entry(1, PointerSize::Bits64).unwrap();
        let order: Vec<_> = vert.fields.keys().cloned().collect();
        assert_eq!(order, vec!["co", "flag"]);
        assert_eq!(vert.fields["co"].size, 12);
        assert_eq!(vert.fields["flag"].type_name, "int");
    }

    #[test]
    fn schema_entry_checks_the_declared_size() {
        let dna = parse(&sample_sdna(Endianness::Little), Endianness::Little);
        // Two 4 byte pointers don't fill the 16 bytes declared for Link.
        match dna.schema_entry(0, PointerSize::Bits32) {
            Err(BlendParseError::LayoutSizeMismatch {
                fields_len,
                type_len,
                ..
            }) => {
                assert_eq!(fields_len, 8);
                assert_eq!(type_len, 16);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn truncated_catalog_fails() {
        let data = sample_sdna(Endianness::Little);
        let res = DnaParseContext::new(Endianness::Little).dna(&data[..data.len() - 3]);
        assert!(res.is_err());
    }
}
