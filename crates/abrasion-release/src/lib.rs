#![forbid(unsafe_code)]

pub mod archive;
pub mod error;
pub mod manifest;
pub mod reader;
pub mod textproto;

pub use archive::{EntryKind, ReleaseWriter};
pub use error::{ErrorKind, ReleaseError};
pub use manifest::{
    BuildManifest, EXECUTABLE_ENTRY, MANIFEST_ENTRY, ManifestFormat, ReleaseFile,
    ReleaseManifest, ReservedEntry, SourceFile,
};
pub use reader::{ReleaseBundle, open_release};
