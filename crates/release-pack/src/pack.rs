use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use abrasion_release::error::ErrorKind;
use abrasion_release::manifest;
use abrasion_release::{
    EntryKind, ReleaseError, ReleaseManifest, ReleaseWriter, ReservedEntry, SourceFile,
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info};

/// Inputs of one packaging run.
#[derive(Debug, Clone)]
pub struct PackConfig {
    pub manifest_path: PathBuf,
    pub executable_path: PathBuf,
    pub archive_path: PathBuf,
}

/// Progress of a packaging run. Each stage is reached at most once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    ManifestParsed,
    FilesPacked,
    ExecutablePacked,
    ManifestEmbedded,
    Closed,
}

impl Stage {
    /// The step that moves the run out of this stage. Creating the staging
    /// archive is part of "packing files".
    pub fn next_step(self) -> &'static str {
        match self {
            Self::Start => "parsing manifest",
            Self::ManifestParsed => "packing files",
            Self::FilesPacked => "packing executable",
            Self::ExecutablePacked => "embedding manifest",
            Self::ManifestEmbedded => "closing archive",
            Self::Closed => "nothing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::ManifestParsed => "manifest-parsed",
            Self::FilesPacked => "files-packed",
            Self::ExecutablePacked => "executable-packed",
            Self::ManifestEmbedded => "manifest-embedded",
            Self::Closed => "closed",
        })
    }
}

/// A run that ended in the failed state. `stage` is the last stage reached.
#[derive(Debug, Error)]
#[error("{} failed: {source}", stage.next_step())]
pub struct PackFailure {
    pub stage: Stage,
    #[source]
    pub source: ReleaseError,
}

impl PackFailure {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PackSummary {
    pub archive_path: PathBuf,
    /// Entry names in archive order.
    pub entries: Vec<String>,
    /// Number of files from the build manifest.
    pub files: usize,
    pub size: u64,
}

pub fn run(config: &PackConfig) -> Result<PackSummary, PackFailure> {
    info!(
        manifest = %config.manifest_path.display(),
        executable = %config.executable_path.display(),
        archive = %config.archive_path.display(),
        "packing release"
    );

    let mut stage = Stage::Start;
    match execute(config, &mut stage) {
        Ok(summary) => {
            info!(
                archive = %summary.archive_path.display(),
                entries = summary.entries.len(),
                size = summary.size,
                "release packed"
            );
            Ok(summary)
        }
        Err(source) => {
            match &source {
                ReleaseError::PackFile {
                    short_path, path, ..
                } => error!(
                    %stage,
                    short_path = %short_path,
                    path = %path.display(),
                    error = %source,
                    "packaging failed"
                ),
                _ => error!(%stage, error = %source, "packaging failed"),
            }
            Err(PackFailure { stage, source })
        }
    }
}

fn execute(config: &PackConfig, stage: &mut Stage) -> Result<PackSummary, ReleaseError> {
    let mut build = manifest::load(&config.manifest_path)?;
    advance(stage, Stage::ManifestParsed);
    info!(count = build.files.len(), "loaded build manifest");

    // Byte order on the entry names, independent of locale and input order.
    build
        .files
        .sort_by(|a, b| a.short_path.cmp(&b.short_path));

    let staging = staging_file(&config.archive_path)?;
    let mut writer = ReleaseWriter::new(BufWriter::new(staging));
    let mut release = ReleaseManifest::for_build(&build);

    for file in &build.files {
        let packed = writer
            .pack(file, EntryKind::Regular)
            .map_err(|source| ReleaseError::PackFile {
                short_path: file.short_path.clone(),
                path: file.path.clone(),
                source: Box::new(source),
            })?;
        release.files.push(packed);
    }
    advance(stage, Stage::FilesPacked);

    let executable = SourceFile {
        short_path: ReservedEntry::Executable.name().to_string(),
        path: config.executable_path.clone(),
    };
    let packed = writer
        .pack(&executable, EntryKind::Executable)
        .map_err(|source| ReleaseError::PackExecutable {
            path: executable.path.clone(),
            source: Box::new(source),
        })?;
    release.files.push(packed);
    advance(stage, Stage::ExecutablePacked);

    let manifest_bytes = manifest::encode(&release)?;
    writer.write_entry(ReservedEntry::Manifest.name(), &manifest_bytes)?;
    advance(stage, Stage::ManifestEmbedded);
    info!(len = manifest_bytes.len(), "embedded release manifest");

    let entries = writer.entries().to_vec();
    let staging = writer
        .finish()?
        .into_inner()
        .map_err(|err| ReleaseError::Publish {
            path: config.archive_path.clone(),
            source: err.into_error(),
        })?;
    let published = publish(staging, &config.archive_path)?;
    let size = published
        .metadata()
        .map_err(|source| ReleaseError::Publish {
            path: config.archive_path.clone(),
            source,
        })?
        .len();
    advance(stage, Stage::Closed);

    Ok(PackSummary {
        archive_path: config.archive_path.clone(),
        entries,
        files: build.files.len(),
        size,
    })
}

fn advance(stage: &mut Stage, next: Stage) {
    debug_assert!(next > *stage, "stages only move forward");
    debug!(from = %stage, to = %next, "stage reached");
    *stage = next;
}

/// Creates the temporary file the archive is written to before it is moved
/// into place, next to the destination so the final rename stays on one
/// filesystem.
fn staging_file(archive_path: &Path) -> Result<NamedTempFile, ReleaseError> {
    let create_error = |source: io::Error| ReleaseError::CreateArchive {
        path: archive_path.to_path_buf(),
        source,
    };

    let parent = match archive_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(create_error)?;

    tempfile::Builder::new()
        .prefix(".release-pack-")
        .suffix(".zip.tmp")
        .tempfile_in(parent)
        .map_err(create_error)
}

fn publish(staging: NamedTempFile, archive_path: &Path) -> Result<File, ReleaseError> {
    let publish_error = |source: io::Error| ReleaseError::Publish {
        path: archive_path.to_path_buf(),
        source,
    };

    staging.as_file().sync_all().map_err(publish_error)?;
    staging
        .persist(archive_path)
        .map_err(|err| publish_error(err.error))
}
