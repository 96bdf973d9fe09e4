#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

use crate::manifest::ParseError;

/// Coarse classification of a [`ReleaseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The text manifest could not be parsed.
    Parse,
    /// Reading sources or writing the archive failed.
    Io,
    /// The binary manifest could not be encoded or decoded.
    Serialization,
}

/// Errors raised while packing or reading a release archive.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("failed to read manifest {}: {source}", path.display())]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("failed to create archive {}: {source}", path.display())]
    CreateArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive entry `{name}` already exists")]
    DuplicateEntry { name: String },
    #[error("failed to create archive entry `{name}`: {source}")]
    CreateEntry {
        name: String,
        #[source]
        source: ZipError,
    },
    #[error("failed to read {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write archive entry `{name}`: {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to pack file {short_path:?} ({path:?}): {source}")]
    PackFile {
        short_path: String,
        path: PathBuf,
        #[source]
        source: Box<ReleaseError>,
    },
    #[error("failed to pack executable {path:?}: {source}")]
    PackExecutable {
        path: PathBuf,
        #[source]
        source: Box<ReleaseError>,
    },
    #[error("failed to encode release manifest: {0}")]
    Serialize(#[source] serde_cbor::Error),
    #[error("failed to decode release manifest: {0}")]
    Deserialize(#[source] serde_cbor::Error),
    #[error("failed to finalize archive: {0}")]
    Finish(#[source] ZipError),
    #[error("failed to publish archive {}: {source}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open release archive {}: {source}", path.display())]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("failed to read archive entry `{name}`: {source}")]
    ReadEntry {
        name: String,
        #[source]
        source: ZipError,
    },
    #[error("release archive is missing entry `{name}`")]
    MissingEntry { name: String },
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Serialize(_) | Self::Deserialize(_) => ErrorKind::Serialization,
            Self::PackFile { source, .. } | Self::PackExecutable { source, .. } => source.kind(),
            _ => ErrorKind::Io,
        }
    }
}

pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;
