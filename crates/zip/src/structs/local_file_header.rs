use winnow::binary::{le_u16, le_u32};
use winnow::error::{ErrMode, Needed};
use winnow::prelude::*;

/// The slice of a local file header needed to locate and decompress the
/// member data; names are resolved through the central directory, so the
/// trailing name and extra field only contribute to [`Self::size`].
#[derive(Debug)]
pub(crate) struct LocalFileHeader {
    pub(crate) compression_method: u16,
    pub(crate) compressed_size: u32,
    pub(crate) uncompressed_size: u32,
    file_name_length: u16,
    extra_field_length: u16,
}

impl LocalFileHeader {
    const MAGIC: u32 = 0x04034b50;

    #[inline(always)]
    pub(crate) fn parse(input: &[u8], offset: usize) -> ModalResult<LocalFileHeader> {
        let mut input = input
            .get(offset..)
            .ok_or(ErrMode::Incomplete(Needed::Unknown))?;

        let (
            _,
            _version_needed,
            _general_purpose,
            compression_method,
            _last_modification_time,
            _last_modification_date,
            _crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
        ) = (
            le_u32.verify(|magic| *magic == Self::MAGIC), // magic
            le_u16,                                       // version_needed
            le_u16,                                       // general_purpose_bit_flag
            le_u16,                                       // compression_method
            le_u16,                                       // last_modification_time
            le_u16,                                       // last_modification_date
            le_u32,                                       // crc32
            le_u32,                                       // compressed_size
            le_u32,                                       // uncompressed_size
            le_u16,                                       // file_name_length
            le_u16,                                       // extra_field_length
        )
            .parse_next(&mut input)?;

        Ok(LocalFileHeader {
            compression_method,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
        })
    }

    /// Get structure size
    ///
    /// 4 (MAGIC) + 26 (DATA) + file_name length + extra field length
    #[inline]
    pub(crate) fn size(&self) -> usize {
        30 + self.file_name_length as usize + self.extra_field_length as usize
    }
}
