//! Error types for packing and unpacking dictionary archives.

use std::path::PathBuf;

use async_zip::error::ZipError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackError {
    /// Input dictionary does not exist or cannot be read
    #[error("input file not found or unreadable: {}", path.display())]
    MissingInputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output directory could not be created
    #[error("failed to create directory {}", path.display())]
    DirectoryCreationFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive file could not be created or written
    #[error("failed to write archive {}", path.display())]
    ArchiveWriteFailure {
        path: PathBuf,
        #[source]
        source: ArchiveIoError,
    },

    /// Archive to extract from does not exist
    #[error("archive not found: {}", path.display())]
    MissingArchive { path: PathBuf },

    /// Archive is not a readable zip, or its path cannot be inspected
    #[error("failed to read archive {}", path.display())]
    ArchiveReadFailure {
        path: PathBuf,
        #[source]
        source: ArchiveIoError,
    },

    #[error("no entry matching '{pattern}' in {}", path.display())]
    NoMatchingEntry { path: PathBuf, pattern: String },

    #[error("invalid entry pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// Extracted dictionary could not be written
    #[error("failed to write {}", path.display())]
    OutputWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The single-threaded runtime driving the zip codec failed to start
    #[error("failed to start runtime")]
    Runtime(#[source] std::io::Error),
}

/// Underlying cause of an archive failure: either plain file I/O or the
/// zip codec.
#[derive(Error, Debug)]
pub enum ArchiveIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] ZipError),
}

pub type Result<T> = std::result::Result<T, PackError>;

impl PackError {
    pub fn archive_write(path: impl Into<PathBuf>, source: impl Into<ArchiveIoError>) -> Self {
        Self::ArchiveWriteFailure {
            path: path.into(),
            source: source.into(),
        }
    }
}
