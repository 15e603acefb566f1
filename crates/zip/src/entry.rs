use flate2::Decompress;
use flate2::FlushDecompress;
use flate2::Status;

use crate::{
    errors::{FileCompressionType, ZipError},
    structs::{
        central_directory::CentralDirectory, eocd::EndOfCentralDirectory,
        local_file_header::LocalFileHeader,
    },
};

/// Represents a parsed ZIP archive
pub struct ZipEntry {
    input: Vec<u8>,
    central_directory: CentralDirectory,
}

impl ZipEntry {
    pub fn new(input: Vec<u8>) -> Result<ZipEntry, ZipError> {
        // perform basic sanity check
        if !input.starts_with(b"PK\x03\x04") {
            return Err(ZipError::InvalidHeader);
        }

        let eocd_offset =
            EndOfCentralDirectory::find_eocd(&input, 4096).ok_or(ZipError::NotFoundEOCD)?;

        let eocd = EndOfCentralDirectory::parse(&mut &input[eocd_offset..])
            .map_err(|_| ZipError::ParseError)?;

        let central_directory =
            CentralDirectory::parse(&input, &eocd).map_err(|_| ZipError::ParseError)?;

        Ok(ZipEntry {
            input,
            central_directory,
        })
    }

    /// Get list of the filenames from zip archive, in central directory order
    pub fn namelist(&self) -> impl Iterator<Item = &str> {
        self.central_directory
            .entries
            .iter()
            .map(|entry| entry.file_name.as_str())
    }

    /// Read tampered files from zip archive
    pub fn read(&self, filename: &str) -> Result<(Vec<u8>, FileCompressionType), ZipError> {
        let central_directory_entry = self
            .central_directory
            .get(filename)
            .ok_or(ZipError::FileNotFound)?;

        let local_header =
            LocalFileHeader::parse(&self.input, central_directory_entry.local_header_offset as usize)
                .map_err(|_| ZipError::ParseError)?;

        let (compressed_size, uncompressed_size) =
            if local_header.compressed_size == 0 || local_header.uncompressed_size == 0 {
                (
                    central_directory_entry.compressed_size as usize,
                    central_directory_entry.uncompressed_size as usize,
                )
            } else {
                (
                    local_header.compressed_size as usize,
                    local_header.uncompressed_size as usize,
                )
            };

        let offset = central_directory_entry.local_header_offset as usize + local_header.size();
        // helper to safely get a slice from input
        let get_slice = |start: usize, end: usize| self.input.get(start..end).ok_or(ZipError::EOF);

        match (
            local_header.compression_method,
            compressed_size == uncompressed_size,
        ) {
            (0, _) => {
                // stored (no compression)
                let slice = get_slice(offset, offset + uncompressed_size)?;
                Ok((slice.to_vec(), FileCompressionType::Stored))
            }
            (8, _) => {
                // deflate default
                let compressed_data = get_slice(offset, offset + compressed_size)?;
                let mut uncompressed_data = Vec::with_capacity(uncompressed_size);

                Decompress::new(false)
                    .decompress_vec(
                        compressed_data,
                        &mut uncompressed_data,
                        FlushDecompress::Finish,
                    )
                    .map_err(|_| ZipError::DecompressionError)?;

                Ok((uncompressed_data, FileCompressionType::Deflated))
            }
            (_, true) => {
                // stored tampered
                let slice = get_slice(offset, offset + uncompressed_size)?;
                Ok((slice.to_vec(), FileCompressionType::StoredTampered))
            }
            (_, false) => {
                // deflate tampered
                let compressed_data = get_slice(offset, offset + compressed_size)?;
                let mut uncompressed_data = Vec::with_capacity(uncompressed_size);
                let mut decompressor = Decompress::new(false);

                let status = decompressor.decompress_vec(
                    compressed_data,
                    &mut uncompressed_data,
                    FlushDecompress::Finish,
                );

                // check if decompression was actually successfull
                let is_valid = decompressor.total_in() == compressed_data.len() as u64;
                match status {
                    Ok(Status::Ok) | Ok(Status::StreamEnd) if is_valid => {
                        Ok((uncompressed_data, FileCompressionType::DeflatedTampered))
                    }
                    _ => {
                        // fallback to stored tampered
                        let slice = get_slice(offset, offset + uncompressed_size)?;
                        Ok((slice.to_vec(), FileCompressionType::StoredTampered))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a stored-only archive out of (name, content) pairs.
    fn build_stored_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut locals = Vec::new();

        for (name, content) in files {
            locals.push(out.len() as u32);
            out.extend_from_slice(b"PK\x03\x04");
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&0u16.to_le_bytes()); // stored
            out.extend_from_slice(&0u32.to_le_bytes()); // time + date
            out.extend_from_slice(&0u32.to_le_bytes()); // crc32
            out.extend_from_slice(&(content.len() as u32).to_le_bytes());
            out.extend_from_slice(&(content.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(content);
        }

        let central_dir_offset = out.len() as u32;
        for ((name, content), local_offset) in files.iter().zip(&locals) {
            out.extend_from_slice(b"PK\x01\x02");
            out.extend_from_slice(&20u16.to_le_bytes()); // version made by
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&0u16.to_le_bytes()); // flags
            out.extend_from_slice(&0u16.to_le_bytes()); // stored
            out.extend_from_slice(&0u32.to_le_bytes()); // time + date
            out.extend_from_slice(&0u32.to_le_bytes()); // crc32
            out.extend_from_slice(&(content.len() as u32).to_le_bytes());
            out.extend_from_slice(&(content.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra
            out.extend_from_slice(&0u16.to_le_bytes()); // comment
            out.extend_from_slice(&0u16.to_le_bytes()); // disk
            out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            out.extend_from_slice(&local_offset.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        let central_dir_size = out.len() as u32 - central_dir_offset;

        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number
        out.extend_from_slice(&0u16.to_le_bytes()); // cd start disk
        out.extend_from_slice(&(files.len() as u16).to_le_bytes());
        out.extend_from_slice(&(files.len() as u16).to_le_bytes());
        out.extend_from_slice(&central_dir_size.to_le_bytes());
        out.extend_from_slice(&central_dir_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length

        out
    }

    #[test]
    fn namelist_keeps_archive_order() {
        let zip = ZipEntry::new(build_stored_zip(&[
            ("classes.dex", b"aaaa"),
            ("res/raw/blob.bin", b"bb"),
            ("classes2.dex", b"cccc"),
        ]))
        .unwrap();

        let names: Vec<&str> = zip.namelist().collect();
        assert_eq!(names, ["classes.dex", "res/raw/blob.bin", "classes2.dex"]);
    }

    #[test]
    fn read_stored_member() {
        let zip = ZipEntry::new(build_stored_zip(&[("classes.dex", b"dex bytes")])).unwrap();

        let (data, compression) = zip.read("classes.dex").unwrap();
        assert_eq!(data, b"dex bytes");
        assert_eq!(compression, FileCompressionType::Stored);
    }

    #[test]
    fn missing_member_is_an_error() {
        let zip = ZipEntry::new(build_stored_zip(&[("classes.dex", b"x")])).unwrap();

        assert!(matches!(
            zip.read("classes2.dex"),
            Err(ZipError::FileNotFound)
        ));
    }

    #[test]
    fn not_a_zip() {
        assert!(matches!(
            ZipEntry::new(b"RIFF....".to_vec()),
            Err(ZipError::InvalidHeader)
        ));
    }
}
