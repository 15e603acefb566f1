//! Errors returned by this crate.
//!
//! This module contains the definitions for all error types returned by this crate.

use thiserror::Error;

/// Errors that may occur while parsing a dex file.
#[derive(Error, Debug)]
pub enum DexError {
    #[error("File too small to be a dex")]
    FileTooSmall,

    #[error("the input is not a .dex file")]
    NotDex,

    #[error("got error while parsing {0} table")]
    Section(&'static str),

    #[error("unexpected end of data")]
    Eof,

    #[error("offset {0:#x} is outside the image")]
    BadOffset(usize),

    #[error("leb128 value is longer than 5 bytes")]
    BadLeb,

    #[error("invalid mutf-8 bytes in string data")]
    BadUtf8,

    #[error("string declares {declared} utf-16 units but decodes to {actual}")]
    BadString { declared: u32, actual: u32 },

    #[error("unsupported encoded value type {0:#04x}")]
    UnsupportedEncodedValue(u8),

    #[error("restart of register v{0} with no recorded local")]
    BadDebug(u16),

    #[error("malformed switch or array payload referenced from code unit {0:#x}")]
    BadPayload(u32),

    #[error("string index {0} out of range")]
    BadStringIndex(u32),

    #[error("type index {0} out of range")]
    BadTypeIndex(u32),

    #[error("proto index {0} out of range")]
    BadProtoIndex(u32),

    #[error("field index {0} out of range")]
    BadFieldIndex(u32),

    #[error("method index {0} out of range")]
    BadMethodIndex(u32),

    #[error("failed to read class {index} ({name})")]
    Class {
        index: u32,
        name: String,
        #[source]
        source: Box<DexError>,
    },

    #[error("failed to read code of {owner}->{name} (code item at {code_off:#x})")]
    Method {
        owner: String,
        name: String,
        code_off: u32,
        #[source]
        source: Box<DexError>,
    },
}
