#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ReleaseError, Result};
use crate::manifest::{self, MANIFEST_ENTRY, ReleaseManifest};

/// An opened release archive with its embedded manifest decoded.
pub struct ReleaseBundle {
    path: PathBuf,
    archive: ZipArchive<File>,
    pub manifest: ReleaseManifest,
}

/// Opens a release archive and decodes its manifest. Digests are not checked.
pub fn open_release(path: &Path) -> Result<ReleaseBundle> {
    let file = File::open(path).map_err(|source| ReleaseError::OpenArchive {
        path: path.to_path_buf(),
        source: ZipError::Io(source),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|source| ReleaseError::OpenArchive {
        path: path.to_path_buf(),
        source,
    })?;

    let bytes = read_from(&mut archive, MANIFEST_ENTRY)?;
    let manifest = manifest::decode(&bytes)?;

    Ok(ReleaseBundle {
        path: path.to_path_buf(),
        archive,
        manifest,
    })
}

impl ReleaseBundle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names in archive order.
    pub fn entry_names(&self) -> Vec<String> {
        (0..self.archive.len())
            .filter_map(|index| self.archive.name_for_index(index))
            .map(str::to_string)
            .collect()
    }

    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        read_from(&mut self.archive, name)
    }
}

fn read_from(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(name).map_err(|err| match err {
        ZipError::FileNotFound => ReleaseError::MissingEntry {
            name: name.to_string(),
        },
        other => ReleaseError::ReadEntry {
            name: name.to_string(),
            source: other,
        },
    })?;

    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut bytes)
        .map_err(|source| ReleaseError::ReadEntry {
            name: name.to_string(),
            source: ZipError::Io(source),
        })?;
    Ok(bytes)
}
