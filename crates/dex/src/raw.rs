//! Little-endian scalar and LEB128 readers shared by every section decoder.
//!
//! Cursor-style readers take a `&mut &[u8]` and advance it, the `*_at`
//! readers index into a buffer without any cursor. Each pool lookup starts
//! from its own slice of the image, so nested reads can never disturb each
//! other.

use winnow::binary::{le_u16, le_u32, u8};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::DexError;

#[inline]
pub(crate) fn read_u8(input: &mut &[u8]) -> Result<u8, DexError> {
    u8.parse_next(input).map_err(|_: ContextError| DexError::Eof)
}

#[inline]
pub(crate) fn read_u16(input: &mut &[u8]) -> Result<u16, DexError> {
    le_u16
        .parse_next(input)
        .map_err(|_: ContextError| DexError::Eof)
}

#[inline]
pub(crate) fn read_u32(input: &mut &[u8]) -> Result<u32, DexError> {
    le_u32
        .parse_next(input)
        .map_err(|_: ContextError| DexError::Eof)
}

#[inline]
pub(crate) fn read_bytes<'a>(input: &mut &'a [u8], count: usize) -> Result<&'a [u8], DexError> {
    take(count)
        .parse_next(input)
        .map_err(|_: ContextError| DexError::Eof)
}

/// Re-slice the image at `offset`, the start of an independent cursor.
#[inline]
pub(crate) fn slice_at(data: &[u8], offset: usize) -> Result<&[u8], DexError> {
    data.get(offset..).ok_or(DexError::BadOffset(offset))
}

#[inline]
pub(crate) fn u8_at(data: &[u8], offset: usize) -> Result<u8, DexError> {
    data.get(offset)
        .copied()
        .ok_or(DexError::BadOffset(offset))
}

#[inline]
pub(crate) fn i8_at(data: &[u8], offset: usize) -> Result<i8, DexError> {
    Ok(u8_at(data, offset)? as i8)
}

#[inline]
pub(crate) fn u16_at(data: &[u8], offset: usize) -> Result<u16, DexError> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or(DexError::BadOffset(offset))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub(crate) fn i16_at(data: &[u8], offset: usize) -> Result<i16, DexError> {
    Ok(u16_at(data, offset)? as i16)
}

#[inline]
pub(crate) fn u32_at(data: &[u8], offset: usize) -> Result<u32, DexError> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or(DexError::BadOffset(offset))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub(crate) fn i32_at(data: &[u8], offset: usize) -> Result<i32, DexError> {
    Ok(u32_at(data, offset)? as i32)
}

/// Unsigned LEB128, capped at the 5 bytes a 32-bit value can occupy.
pub(crate) fn uleb128(input: &mut &[u8]) -> Result<u32, DexError> {
    let mut result = 0u32;
    let mut shift = 0u32;

    for _ in 0..5 {
        let byte = read_u8(input)?;
        result |= ((byte & 0x7f) as u32) << shift;

        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }

    Err(DexError::BadLeb)
}

/// The `uleb128p1` convention: the encoded value is `n + 1`, so `0`
/// round-trips to `-1` (used for "no index").
#[inline]
pub(crate) fn uleb128p1(input: &mut &[u8]) -> Result<i32, DexError> {
    Ok(uleb128(input)? as i32 - 1)
}

/// Signed LEB128, sign-extended from the last chunk's bit position.
pub(crate) fn sleb128(input: &mut &[u8]) -> Result<i32, DexError> {
    let mut result = 0i32;
    let mut shift = 0u32;

    for _ in 0..5 {
        let byte = read_u8(input)?;
        result |= ((byte & 0x7f) as i32) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            if shift < 32 {
                result = result << (32 - shift) >> (32 - shift);
            }
            return Ok(result);
        }
    }

    Err(DexError::BadLeb)
}

/// Packed little-endian integer used by encoded values: the high three
/// bits of `value_arg` carry `length - 1`, the value is sign-extended.
pub(crate) fn read_int_bits(input: &mut &[u8], value_arg: u8) -> Result<i64, DexError> {
    let length = (value_arg >> 5) as usize + 1;
    let bytes = read_bytes(input, length)?;

    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as u64) << (8 * i);
    }

    let unused = 64 - 8 * length as u32;
    Ok(((value as i64) << unused) >> unused)
}

/// As [`read_int_bits`] but zero-extended.
pub(crate) fn read_uint_bits(input: &mut &[u8], value_arg: u8) -> Result<u64, DexError> {
    let length = (value_arg >> 5) as usize + 1;
    let bytes = read_bytes(input, length)?;

    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as u64) << (8 * i);
    }

    Ok(value)
}

/// Float packing: the encoded bytes are the most significant ones, the
/// low end is zero-padded. The result is left-aligned in a 64-bit word;
/// take the high half for a 32-bit float.
pub(crate) fn read_float_bits(input: &mut &[u8], value_arg: u8) -> Result<u64, DexError> {
    let length = (value_arg >> 5) as usize + 1;
    let bytes = read_bytes(input, length)?;

    let mut value = 0u64;
    for byte in bytes {
        value = (value >> 8) | ((*byte as u64) << 56);
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_uleb128(mut value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let chunk = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(chunk);
                return out;
            }
            out.push(chunk | 0x80);
        }
    }

    fn encode_sleb128(mut value: i32) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let chunk = (value & 0x7f) as u8;
            value >>= 7;
            let sign_clear = value == 0 && chunk & 0x40 == 0;
            let sign_set = value == -1 && chunk & 0x40 != 0;
            if sign_clear || sign_set {
                out.push(chunk);
                return out;
            }
            out.push(chunk | 0x80);
        }
    }

    #[test]
    fn uleb128_round_trip() {
        for value in [
            0u32,
            1,
            0x7f,
            0x80,
            0x3fff,
            0x4000,
            16256,
            0xffff_ffff,
            0x1234_5678,
        ] {
            let encoded = encode_uleb128(value);
            let mut input = &encoded[..];
            assert_eq!(uleb128(&mut input).unwrap(), value);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn sleb128_round_trip() {
        for value in [0i32, 1, -1, 63, -64, 64, -65, 8191, -8192, i32::MAX, i32::MIN] {
            let encoded = encode_sleb128(value);
            let mut input = &encoded[..];
            assert_eq!(sleb128(&mut input).unwrap(), value);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn uleb128_rejects_overlong_encoding() {
        let mut input = &[0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01][..];
        assert!(matches!(uleb128(&mut input), Err(DexError::BadLeb)));
    }

    #[test]
    fn uleb128p1_null_convention() {
        let mut input = &[0x00u8][..];
        assert_eq!(uleb128p1(&mut input).unwrap(), -1);

        let mut input = &[0x01u8][..];
        assert_eq!(uleb128p1(&mut input).unwrap(), 0);
    }

    #[test]
    fn packed_int_sign_extension() {
        // one byte, 0xff => -1 signed, 255 unsigned
        let mut input = &[0xffu8][..];
        assert_eq!(read_int_bits(&mut input, 0).unwrap(), -1);

        let mut input = &[0xffu8][..];
        assert_eq!(read_uint_bits(&mut input, 0).unwrap(), 0xff);

        // two bytes little-endian
        let mut input = &[0x34u8, 0x12][..];
        assert_eq!(read_int_bits(&mut input, 1 << 5).unwrap(), 0x1234);
    }

    #[test]
    fn packed_float_left_alignment() {
        // f64 1.0 == 0x3ff0_0000_0000_0000, writer keeps the top two bytes
        let mut input = &[0xf0u8, 0x3f][..];
        let bits = read_float_bits(&mut input, 1 << 5).unwrap();
        assert_eq!(f64::from_bits(bits), 1.0);

        // f32 2.0 == 0x4000_0000, a single significant byte
        let mut input = &[0x40u8][..];
        let bits = read_float_bits(&mut input, 0).unwrap();
        assert_eq!(f32::from_bits((bits >> 32) as u32), 2.0);
    }

    #[test]
    fn scalar_reads_check_bounds() {
        assert!(matches!(u16_at(&[0x01], 0), Err(DexError::BadOffset(0))));
        assert!(matches!(u32_at(&[0; 4], 1), Err(DexError::BadOffset(1))));
        assert!(matches!(slice_at(&[0; 4], 5), Err(DexError::BadOffset(5))));
    }
}
