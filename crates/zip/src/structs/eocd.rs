use memchr::memmem;

use winnow::{
    binary::{le_u16, le_u32},
    prelude::*,
    token::take,
};

/// End-of-central-directory record; only the directory offset matters
/// for member extraction.
#[derive(Debug)]
pub(crate) struct EndOfCentralDirectory {
    pub(crate) central_dir_offset: u32,
}

impl EndOfCentralDirectory {
    const MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

    #[inline(always)]
    const fn magic_u32() -> u32 {
        u32::from_le_bytes(Self::MAGIC)
    }

    pub(crate) fn parse(input: &mut &[u8]) -> ModalResult<EndOfCentralDirectory> {
        let (_, _, _, central_dir_offset, _) = (
            le_u32.verify(|magic| *magic == Self::magic_u32()), // magic
            take(8usize), // disk numbers and entry counts
            le_u32,       // central directory size
            le_u32,       // central directory offset
            le_u16,       // comment length
        )
            .parse_next(input)?;

        Ok(EndOfCentralDirectory { central_dir_offset })
    }

    /// Searching magic from the end of the file
    pub(crate) fn find_eocd(input: &[u8], chunk_size: usize) -> Option<usize> {
        let mut end = input.len();

        while end > 0 {
            let start = end.saturating_sub(chunk_size);
            let chunk = &input[start..end];

            if let Some(pos) = memmem::rfind(chunk, &Self::MAGIC) {
                return Some(start + pos);
            }

            end = start;
        }

        None
    }
}
