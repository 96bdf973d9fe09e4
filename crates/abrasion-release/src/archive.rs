#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read, Seek, Write};

use sha2::{Digest, Sha256};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{ReleaseError, Result};
use crate::manifest::{ReleaseFile, SourceFile};

const COPY_BUFFER: usize = 64 * 1024;

/// How an entry is marked in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Executable,
}

impl EntryKind {
    fn unix_mode(self) -> u32 {
        match self {
            Self::Regular => 0o644,
            Self::Executable => 0o755,
        }
    }

    fn options(self) -> SimpleFileOptions {
        // Fixed timestamps keep archives byte-identical across rebuilds.
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(self.unix_mode())
    }
}

/// Writes release entries into a zip archive, digesting packed files on the
/// way through.
pub struct ReleaseWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    seen: BTreeSet<String>,
    entries: Vec<String>,
}

impl<W: Write + Seek> ReleaseWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            seen: BTreeSet::new(),
            entries: Vec::new(),
        }
    }

    /// Entry names in the order they were written.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Streams `file` into a new entry named after its short path and returns
    /// the packed record. The digest covers exactly the bytes written.
    pub fn pack(&mut self, file: &SourceFile, kind: EntryKind) -> Result<ReleaseFile> {
        self.start_entry(&file.short_path, kind)?;

        let source = File::open(&file.path).map_err(|source| ReleaseError::SourceUnreadable {
            path: file.path.clone(),
            source,
        })?;
        let mut reader = HashingReader::new(source);
        let mut buffer = vec![0u8; COPY_BUFFER];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(ReleaseError::SourceUnreadable {
                        path: file.path.clone(),
                        source,
                    });
                }
            };
            self.zip
                .write_all(&buffer[..read])
                .map_err(|source| ReleaseError::Write {
                    name: file.short_path.clone(),
                    source,
                })?;
        }

        let (digest, size) = reader.finish();
        debug!(short_path = %file.short_path, size, "packed file");
        Ok(ReleaseFile::new(file, digest, size))
    }

    /// Writes an in-memory entry.
    pub fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.start_entry(name, EntryKind::Regular)?;
        self.zip
            .write_all(bytes)
            .map_err(|source| ReleaseError::Write {
                name: name.to_string(),
                source,
            })
    }

    /// Writes the central directory and hands back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.zip.finish().map_err(ReleaseError::Finish)
    }

    fn start_entry(&mut self, name: &str, kind: EntryKind) -> Result<()> {
        if !self.seen.insert(name.to_string()) {
            return Err(ReleaseError::DuplicateEntry {
                name: name.to_string(),
            });
        }
        self.zip
            .start_file(name, kind.options())
            .map_err(|source| ReleaseError::CreateEntry {
                name: name.to_string(),
                source,
            })?;
        self.entries.push(name.to_string());
        Ok(())
    }
}

/// Feeds every byte read through SHA-256.
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    size: u64,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            size: 0,
        }
    }

    fn finish(self) -> ([u8; 32], u64) {
        (self.hasher.finalize().into(), self.size)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        self.size += read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;

    use tempfile::tempdir;
    use zip::ZipArchive;

    use crate::ErrorKind;

    fn source(dir: &Path, short_path: &str, contents: &[u8]) -> SourceFile {
        let path = dir.join(short_path.replace('/', "_"));
        fs::write(&path, contents).expect("write source");
        SourceFile {
            short_path: short_path.to_string(),
            path,
        }
    }

    fn read_back(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).expect("valid zip")
    }

    #[test]
    fn pack_digests_and_copies_bytes() {
        let temp = tempdir().expect("temp dir");
        let file = source(temp.path(), "data/a.txt", b"hello release");

        let mut writer = ReleaseWriter::new(Cursor::new(Vec::new()));
        let packed = writer.pack(&file, EntryKind::Regular).expect("pack");
        assert_eq!(packed.short_path, "data/a.txt");
        assert_eq!(packed.size, 13);
        assert_eq!(packed.sha256, hex::encode(Sha256::digest(b"hello release")));
        assert_eq!(writer.entries(), ["data/a.txt"]);

        let mut archive = read_back(writer.finish().expect("finish").into_inner());
        let mut entry = archive.by_name("data/a.txt").expect("entry");
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).expect("read entry");
        assert_eq!(contents, b"hello release");
        assert_eq!(entry.unix_mode().map(|mode| mode & 0o777), Some(0o644));
    }

    #[test]
    fn large_files_stream_through_multiple_reads() {
        let temp = tempdir().expect("temp dir");
        let contents: Vec<u8> = (0..COPY_BUFFER * 3 + 17).map(|i| (i % 251) as u8).collect();
        let file = source(temp.path(), "big.bin", &contents);

        let mut writer = ReleaseWriter::new(Cursor::new(Vec::new()));
        let packed = writer.pack(&file, EntryKind::Regular).expect("pack");
        assert_eq!(packed.size, contents.len() as u64);
        assert_eq!(packed.sha256, hex::encode(Sha256::digest(&contents)));
    }

    #[test]
    fn executables_keep_exec_bit() {
        let temp = tempdir().expect("temp dir");
        let file = source(temp.path(), "abrasion.exe", b"EXE");

        let mut writer = ReleaseWriter::new(Cursor::new(Vec::new()));
        writer.pack(&file, EntryKind::Executable).expect("pack");

        let mut archive = read_back(writer.finish().expect("finish").into_inner());
        let entry = archive.by_name("abrasion.exe").expect("entry");
        assert_eq!(entry.unix_mode().map(|mode| mode & 0o777), Some(0o755));
    }

    #[test]
    fn missing_source_is_unreadable() {
        let temp = tempdir().expect("temp dir");
        let file = SourceFile {
            short_path: "gone.txt".into(),
            path: temp.path().join("does-not-exist"),
        };

        let mut writer = ReleaseWriter::new(Cursor::new(Vec::new()));
        let err = writer.pack(&file, EntryKind::Regular).expect_err("missing source");
        assert!(matches!(err, ReleaseError::SourceUnreadable { .. }), "{err}");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let temp = tempdir().expect("temp dir");
        let first = source(temp.path(), "same.txt", b"one");
        let second = SourceFile {
            short_path: "same.txt".into(),
            path: source(temp.path(), "other.txt", b"two").path,
        };

        let mut writer = ReleaseWriter::new(Cursor::new(Vec::new()));
        writer.pack(&first, EntryKind::Regular).expect("first pack");
        let err = writer
            .pack(&second, EntryKind::Regular)
            .expect_err("duplicate entry");
        assert!(
            matches!(&err, ReleaseError::DuplicateEntry { name } if name == "same.txt"),
            "{err}"
        );

        writer
            .write_entry("same.txt", b"three")
            .expect_err("in-memory entries share the namespace");
    }
}
