use winnow::binary::{le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::error::{ErrMode, Needed};
use winnow::prelude::*;
use winnow::token::take;

use crate::structs::eocd::EndOfCentralDirectory;

/// One central directory record, trimmed to what member extraction
/// needs: the name, the sizes and where the local header lives.
#[derive(Debug)]
pub(crate) struct CentralDirectoryEntry {
    pub(crate) compressed_size: u32,
    pub(crate) uncompressed_size: u32,
    pub(crate) local_header_offset: u32,
    pub(crate) file_name: String,
}

impl CentralDirectoryEntry {
    const MAGIC: u32 = 0x02014b50;

    #[inline(always)]
    fn parse(input: &mut &[u8]) -> ModalResult<CentralDirectoryEntry> {
        let (
            _,
            _, // versions, flags, compression, timestamps, crc32
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
            file_comment_length,
            _, // disk number and attributes
            local_header_offset,
        ) = (
            le_u32.verify(|magic| *magic == Self::MAGIC),
            take(16usize),
            le_u32,
            le_u32,
            le_u16,
            le_u16,
            le_u16,
            take(8usize),
            le_u32,
        )
            .parse_next(input)?;

        let (file_name, _extra_field, _file_comment) = (
            take(file_name_length),
            take(extra_field_length),
            take(file_comment_length),
        )
            .parse_next(input)?;

        Ok(CentralDirectoryEntry {
            compressed_size,
            uncompressed_size,
            local_header_offset,
            file_name: String::from_utf8_lossy(file_name).to_string(),
        })
    }
}

/// Central directory of the archive.
///
/// Entries keep the order in which they appear in the directory, callers
/// that concatenate multi-dex members depend on it.
#[derive(Debug)]
pub(crate) struct CentralDirectory {
    pub(crate) entries: Vec<CentralDirectoryEntry>,
}

impl CentralDirectory {
    pub(crate) fn parse(input: &[u8], eocd: &EndOfCentralDirectory) -> ModalResult<CentralDirectory> {
        let mut input = input
            .get(eocd.central_dir_offset as usize..)
            .ok_or(ErrMode::Incomplete(Needed::Unknown))?;

        let entries: Vec<CentralDirectoryEntry> =
            repeat(0.., CentralDirectoryEntry::parse).parse_next(&mut input)?;

        Ok(CentralDirectory { entries })
    }

    pub(crate) fn get(&self, filename: &str) -> Option<&CentralDirectoryEntry> {
        self.entries.iter().find(|entry| entry.file_name == filename)
    }
}
