use std::io;

use dexpipe_dex::DexError;
use dexpipe_zip::ZipError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    /// Generic I/O error while trying to read the input
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// The input is shorter than any magic we could recognize
    #[error("File too small")]
    FileTooSmall,

    /// Neither a dex image nor a zip archive
    #[error("the file is not a .dex or zip file")]
    NotDexOrZip,

    /// The archive contains no `*.dex` member
    #[error("no .dex member found in the archive")]
    NoDexFound,

    /// Error occurred while reading the archive
    #[error("got error while parsing zip archive")]
    ZipError(#[from] ZipError),

    /// Error occurred while parsing one of the dex images
    #[error(transparent)]
    DexError(#[from] DexError),
}
