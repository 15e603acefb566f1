//! Decoder for the polymorphic `encoded_value` format.
//!
//! See: <https://source.android.com/docs/core/runtime/dex-format#value-formats>

use crate::dex::{Dex, FieldRef, MethodRef};
use crate::errors::DexError;
use crate::raw;

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_STRING: u8 = 0x17;
const VALUE_TYPE: u8 = 0x18;
const VALUE_FIELD: u8 = 0x19;
const VALUE_METHOD: u8 = 0x1a;
const VALUE_ENUM: u8 = 0x1b;
const VALUE_ARRAY: u8 = 0x1c;
const VALUE_ANNOTATION: u8 = 0x1d;
const VALUE_NULL: u8 = 0x1e;
const VALUE_BOOLEAN: u8 = 0x1f;

/// A decoded `encoded_value`, owned and fully resolved against the pools.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    /// Utf-16 code unit, not necessarily a valid scalar on its own
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A type descriptor
    Type(String),
    Field(FieldRef),
    Method(MethodRef),
    Enum(FieldRef),
    Array(Vec<EncodedValue>),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
}

/// An `encoded_annotation`: a type plus ordered named elements.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAnnotation {
    pub type_descriptor: String,
    pub elements: Vec<(String, EncodedValue)>,
}

pub(crate) fn read_encoded_value(dex: &Dex, input: &mut &[u8]) -> Result<EncodedValue, DexError> {
    let lead = raw::read_u8(input)?;
    let value_type = lead & 0x1f;

    let value = match value_type {
        VALUE_BYTE => EncodedValue::Byte(raw::read_int_bits(input, lead)? as i8),
        VALUE_SHORT => EncodedValue::Short(raw::read_int_bits(input, lead)? as i16),
        VALUE_CHAR => EncodedValue::Char(raw::read_uint_bits(input, lead)? as u16),
        VALUE_INT => EncodedValue::Int(raw::read_int_bits(input, lead)? as i32),
        // sign-extended from the encoded length, like the other ints
        VALUE_LONG => EncodedValue::Long(raw::read_int_bits(input, lead)?),
        VALUE_FLOAT => {
            let bits = raw::read_float_bits(input, lead)?;
            EncodedValue::Float(f32::from_bits((bits >> 32) as u32))
        }
        VALUE_DOUBLE => EncodedValue::Double(f64::from_bits(raw::read_float_bits(input, lead)?)),
        VALUE_STRING => {
            let index = raw::read_uint_bits(input, lead)? as u32;
            EncodedValue::String(dex.string_at(index)?.into_owned())
        }
        VALUE_TYPE => {
            let index = raw::read_uint_bits(input, lead)? as u32;
            EncodedValue::Type(dex.type_at(index)?.into_owned())
        }
        VALUE_FIELD => {
            let index = raw::read_uint_bits(input, lead)? as u32;
            EncodedValue::Field(dex.get_field(index)?)
        }
        VALUE_METHOD => {
            let index = raw::read_uint_bits(input, lead)? as u32;
            EncodedValue::Method(dex.get_method(index)?)
        }
        VALUE_ENUM => {
            let index = raw::read_uint_bits(input, lead)? as u32;
            EncodedValue::Enum(dex.get_field(index)?)
        }
        VALUE_ARRAY => EncodedValue::Array(read_encoded_array(dex, input)?),
        VALUE_ANNOTATION => EncodedValue::Annotation(read_encoded_annotation(dex, input)?),
        VALUE_NULL => EncodedValue::Null,
        VALUE_BOOLEAN => EncodedValue::Boolean((lead >> 5) & 1 != 0),
        other => return Err(DexError::UnsupportedEncodedValue(other)),
    };

    Ok(value)
}

pub(crate) fn read_encoded_array(
    dex: &Dex,
    input: &mut &[u8],
) -> Result<Vec<EncodedValue>, DexError> {
    let size = raw::uleb128(input)?;

    let mut values = Vec::with_capacity(size as usize);
    for _ in 0..size {
        values.push(read_encoded_value(dex, input)?);
    }

    Ok(values)
}

pub(crate) fn read_encoded_annotation(
    dex: &Dex,
    input: &mut &[u8],
) -> Result<EncodedAnnotation, DexError> {
    let type_index = raw::uleb128(input)?;
    let size = raw::uleb128(input)?;

    let type_descriptor = dex.type_at(type_index)?.into_owned();
    let mut elements = Vec::with_capacity(size as usize);
    for _ in 0..size {
        let name_index = raw::uleb128(input)?;
        let name = dex.string_at(name_index)?.into_owned();
        elements.push((name, read_encoded_value(dex, input)?));
    }

    Ok(EncodedAnnotation {
        type_descriptor,
        elements,
    })
}
