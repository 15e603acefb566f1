use std::borrow::Cow;

use bitflags::bitflags;
use log::warn;
use simd_adler32::Adler32;
use winnow::binary::{le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::errors::DexError;
use crate::{mutf8, raw};

/// The endianness tag expected in the header.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#endian-constant>
pub const ENDIAN_CONSTANT: u32 = 0x12345678;

/// Byte-swapped [`ENDIAN_CONSTANT`], written by big-endian producers.
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;

/// The constant is used to indicate that an index value is absent.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#no-index>
pub const NO_INDEX: u32 = u32::MAX;

/// A dex image together with its parsed identifier tables.
///
/// The byte image is immutable; every lookup re-slices it into a fresh
/// cursor, so the accessors are pure and the reader can be driven any
/// number of times.
#[derive(Debug, Default)]
pub struct Dex {
    /// The whole image, referenced by offset from the id tables
    pub(crate) data: Vec<u8>,

    /// Information about dex header
    pub header: DexHeader,

    /// Offsets of `string_data_item`s
    pub(crate) string_ids: Vec<u32>,

    /// String index of each type descriptor
    pub(crate) type_ids: Vec<u32>,

    pub(crate) proto_ids: Vec<ProtoItem>,
    pub(crate) field_ids: Vec<FieldItem>,
    pub(crate) method_ids: Vec<MethodItem>,
    pub(crate) class_defs: Vec<ClassItem>,
}

impl Dex {
    /// Parse the given dex image.
    ///
    /// Deviations that dalvik tolerates (unknown version, odd header size,
    /// reversed endian tag, checksum mismatch) are logged and parsing
    /// continues; a missing magic or a truncated header is fatal.
    pub fn new(data: Vec<u8>) -> Result<Dex, DexError> {
        if data.len() < 0x70 {
            return Err(DexError::FileTooSmall);
        }

        let header = DexHeader::parse(&mut &data[..])?;

        let mut adler = Adler32::new();
        adler.write(&data[12..]);
        let computed = adler.finish();
        if computed != header.checksum {
            warn!(
                "adler32 checksum mismatch: header says {:#010x}, image hashes to {:#010x}",
                header.checksum, computed
            );
        }

        let string_ids = {
            let mut input = section(&data, header.string_ids_off, "string_ids")?;
            repeat(header.string_ids_size as usize, le_u32)
                .parse_next(&mut input)
                .map_err(|_: ContextError| DexError::Section("string_ids"))?
        };

        let type_ids = {
            let mut input = section(&data, header.type_ids_off, "type_ids")?;
            repeat(header.type_ids_size as usize, le_u32)
                .parse_next(&mut input)
                .map_err(|_: ContextError| DexError::Section("type_ids"))?
        };

        let proto_ids = {
            let mut input = section(&data, header.proto_ids_off, "proto_ids")?;
            repeat(header.proto_ids_size as usize, ProtoItem::parse)
                .parse_next(&mut input)
                .map_err(|_| DexError::Section("proto_ids"))?
        };

        let field_ids = {
            let mut input = section(&data, header.field_ids_off, "field_ids")?;
            repeat(header.field_ids_size as usize, FieldItem::parse)
                .parse_next(&mut input)
                .map_err(|_| DexError::Section("field_ids"))?
        };

        let method_ids = {
            let mut input = section(&data, header.method_ids_off, "method_ids")?;
            repeat(header.method_ids_size as usize, MethodItem::parse)
                .parse_next(&mut input)
                .map_err(|_| DexError::Section("method_ids"))?
        };

        let class_defs = {
            let mut input = section(&data, header.class_defs_off, "class_defs")?;
            repeat(header.class_defs_size as usize, ClassItem::parse)
                .parse_next(&mut input)
                .map_err(|_| DexError::Section("class_defs"))?
        };

        Ok(Dex {
            data,
            header,
            string_ids,
            type_ids,
            proto_ids,
            field_ids,
            method_ids,
            class_defs,
        })
    }

    /// Adler-32 over everything after the magic and checksum fields.
    pub fn checksum(&self) -> u32 {
        let mut adler = Adler32::new();
        adler.write(&self.data[12..]);
        adler.finish()
    }

    /// Number of class definitions in the image.
    pub fn class_count(&self) -> usize {
        self.class_defs.len()
    }

    /// Resolve a string index. [`NO_INDEX`] is the null string.
    pub fn get_string(&self, index: u32) -> Result<Option<Cow<'_, str>>, DexError> {
        if index == NO_INDEX {
            return Ok(None);
        }
        let offset = *self
            .string_ids
            .get(index as usize)
            .ok_or(DexError::BadStringIndex(index))?;

        Ok(Some(mutf8::read_string(&self.data, offset as usize)?))
    }

    /// As [`Dex::get_string`] for indices that may not be null.
    pub(crate) fn string_at(&self, index: u32) -> Result<Cow<'_, str>, DexError> {
        self.get_string(index)?
            .ok_or(DexError::BadStringIndex(index))
    }

    /// Resolve a type index to its descriptor. [`NO_INDEX`] is the null type.
    pub fn get_type(&self, index: u32) -> Result<Option<Cow<'_, str>>, DexError> {
        if index == NO_INDEX {
            return Ok(None);
        }
        let string_index = *self
            .type_ids
            .get(index as usize)
            .ok_or(DexError::BadTypeIndex(index))?;

        Ok(Some(self.string_at(string_index)?))
    }

    pub(crate) fn type_at(&self, index: u32) -> Result<Cow<'_, str>, DexError> {
        self.get_type(index)?.ok_or(DexError::BadTypeIndex(index))
    }

    /// Resolve a field index to its (owner, name, descriptor) triple.
    pub fn get_field(&self, index: u32) -> Result<FieldRef, DexError> {
        let item = self
            .field_ids
            .get(index as usize)
            .ok_or(DexError::BadFieldIndex(index))?;

        Ok(FieldRef {
            owner: self.type_at(item.class_idx as u32)?.into_owned(),
            name: self.string_at(item.name_idx)?.into_owned(),
            descriptor: self.type_at(item.type_idx as u32)?.into_owned(),
        })
    }

    /// Resolve a method index, dereferencing its prototype.
    pub fn get_method(&self, index: u32) -> Result<MethodRef, DexError> {
        let item = self
            .method_ids
            .get(index as usize)
            .ok_or(DexError::BadMethodIndex(index))?;
        let proto = self
            .proto_ids
            .get(item.proto_idx as usize)
            .ok_or(DexError::BadProtoIndex(item.proto_idx as u32))?;

        Ok(MethodRef {
            owner: self.type_at(item.class_idx as u32)?.into_owned(),
            name: self.string_at(item.name_idx)?.into_owned(),
            parameter_types: self.get_type_list(proto.parameters_off)?,
            return_type: self.type_at(proto.return_type_idx)?.into_owned(),
        })
    }

    /// Read a `type_list` at the given offset; offset `0` is the empty list.
    pub fn get_type_list(&self, offset: u32) -> Result<Vec<String>, DexError> {
        if offset == 0 {
            return Ok(Vec::new());
        }

        let mut input = raw::slice_at(&self.data, offset as usize)?;
        let size = raw::read_u32(&mut input)?;

        let mut types = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let index = raw::read_u16(&mut input)?;
            types.push(self.type_at(index as u32)?.into_owned());
        }

        Ok(types)
    }
}

fn section<'a>(data: &'a [u8], offset: u32, name: &'static str) -> Result<&'a [u8], DexError> {
    data.get(offset as usize..)
        .ok_or(DexError::Section(name))
}

/// Abstraction over dex header
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#header-item>
#[derive(Debug, Default, Clone)]
pub struct DexHeader {
    /// Version digits from the magic, `*b"035"` for the format this
    /// reader primarily targets
    pub version: [u8; 3],

    /// Adler32 checksum of the file
    pub checksum: u32,

    /// SHA-1 signature of the file
    pub signature: [u8; 20],

    /// Size of the entire file (including the header) in bytes
    pub file_size: u32,

    /// Size of the header, `0x70` for every known version
    pub header_size: u32,

    /// [`ENDIAN_CONSTANT`] or [`REVERSE_ENDIAN_CONSTANT`]
    pub endian_tag: u32,

    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,

    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,

    pub data_size: u32,
    pub data_off: u32,
}

impl DexHeader {
    fn parse(input: &mut &[u8]) -> Result<DexHeader, DexError> {
        let magic = raw::read_bytes(input, 4)?;
        if magic != b"dex\n" {
            return Err(DexError::NotDex);
        }

        let version_bytes = raw::read_bytes(input, 4)?;
        let version = [version_bytes[0], version_bytes[1], version_bytes[2]];
        if &version != b"035" {
            warn!(
                "dex version {} is not 035, attempting to parse anyway",
                String::from_utf8_lossy(&version)
            );
        }

        let checksum = raw::read_u32(input)?;

        let mut signature = [0u8; 20];
        signature.copy_from_slice(raw::read_bytes(input, 20)?);

        let file_size = raw::read_u32(input)?;

        let header_size = raw::read_u32(input)?;
        if header_size != 0x70 {
            warn!("header size is {header_size:#x} instead of 0x70");
        }

        let endian_tag = raw::read_u32(input)?;
        if endian_tag != ENDIAN_CONSTANT {
            warn!("unexpected endian tag {endian_tag:#010x}");
        }

        let link_size = raw::read_u32(input)?;
        let link_off = raw::read_u32(input)?;
        let map_off = raw::read_u32(input)?;

        let string_ids_size = raw::read_u32(input)?;
        let string_ids_off = raw::read_u32(input)?;
        let type_ids_size = raw::read_u32(input)?;
        let type_ids_off = raw::read_u32(input)?;
        let proto_ids_size = raw::read_u32(input)?;
        let proto_ids_off = raw::read_u32(input)?;
        let field_ids_size = raw::read_u32(input)?;
        let field_ids_off = raw::read_u32(input)?;
        let method_ids_size = raw::read_u32(input)?;
        let method_ids_off = raw::read_u32(input)?;
        let class_defs_size = raw::read_u32(input)?;
        let class_defs_off = raw::read_u32(input)?;

        let data_size = raw::read_u32(input)?;
        let data_off = raw::read_u32(input)?;

        Ok(DexHeader {
            version,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size,
            link_off,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size,
            data_off,
        })
    }
}

/// A resolved field reference, equal by components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// A resolved method reference, equal by components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
}

/// Abstraction over `proto_id_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#proto-id-item>
#[derive(Debug)]
pub(crate) struct ProtoItem {
    #[allow(dead_code)]
    pub(crate) shorty_idx: u32,
    pub(crate) return_type_idx: u32,
    pub(crate) parameters_off: u32,
}

impl ProtoItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<ProtoItem> {
        (le_u32, le_u32, le_u32)
            .map(|(shorty_idx, return_type_idx, parameters_off)| ProtoItem {
                shorty_idx,
                return_type_idx,
                parameters_off,
            })
            .parse_next(input)
    }
}

/// Abstraction over `field_id_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#field-id-item>
#[derive(Debug)]
pub(crate) struct FieldItem {
    pub(crate) class_idx: u16,
    pub(crate) type_idx: u16,
    pub(crate) name_idx: u32,
}

impl FieldItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<FieldItem> {
        (le_u16, le_u16, le_u32)
            .map(|(class_idx, type_idx, name_idx)| FieldItem {
                class_idx,
                type_idx,
                name_idx,
            })
            .parse_next(input)
    }
}

/// Abstraction over `method_id_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#method-id-item>
#[derive(Debug)]
pub(crate) struct MethodItem {
    pub(crate) class_idx: u16,
    pub(crate) proto_idx: u16,
    pub(crate) name_idx: u32,
}

impl MethodItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<MethodItem> {
        (le_u16, le_u16, le_u32)
            .map(|(class_idx, proto_idx, name_idx)| MethodItem {
                class_idx,
                proto_idx,
                name_idx,
            })
            .parse_next(input)
    }
}

/// Abstraction over `class_def_item`
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#class-def-item>
#[derive(Debug)]
pub(crate) struct ClassItem {
    pub(crate) class_idx: u32,
    pub(crate) access_flags: AccessFlags,
    pub(crate) superclass_idx: u32,
    pub(crate) interfaces_off: u32,
    pub(crate) source_file_idx: u32,
    pub(crate) annotations_off: u32,
    pub(crate) class_data_off: u32,
    pub(crate) static_values_off: u32,
}

impl ClassItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<ClassItem> {
        (
            le_u32,
            le_u32.map(AccessFlags::from_bits_truncate),
            le_u32,
            le_u32,
            le_u32,
            le_u32,
            le_u32,
            le_u32,
        )
            .map(
                |(
                    class_idx,
                    access_flags,
                    superclass_idx,
                    interfaces_off,
                    source_file_idx,
                    annotations_off,
                    class_data_off,
                    static_values_off,
                )| ClassItem {
                    class_idx,
                    access_flags,
                    superclass_idx,
                    interfaces_off,
                    source_file_idx,
                    annotations_off,
                    class_data_off,
                    static_values_off,
                },
            )
            .parse_next(input)
    }
}

bitflags! {
    /// Access flags of classes, fields and methods.
    ///
    /// See: <https://source.android.com/docs/core/runtime/dex-format#access-flags>
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        /// Methods only, may only be set together with `NATIVE`
        const SYNCHRONIZED = 0x0020;
        /// Fields only
        const VOLATILE = 0x0040;
        /// Methods only, shares the bit with `VOLATILE`
        const BRIDGE = 0x0040;
        /// Fields only
        const TRANSIENT = 0x0080;
        /// Methods only, shares the bit with `TRANSIENT`
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        /// Constructors and static initializers
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl AccessFlags {
    #[inline]
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    #[inline]
    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    #[inline]
    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    #[inline]
    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    #[inline]
    pub fn is_constructor(self) -> bool {
        self.contains(Self::CONSTRUCTOR)
    }
}
