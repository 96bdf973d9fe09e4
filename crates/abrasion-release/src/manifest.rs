#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ReleaseError, Result};
use crate::textproto;

/// Archive entry holding the main executable.
pub const EXECUTABLE_ENTRY: &str = "abrasion.exe";
/// Archive entry holding the CBOR encoded [`ReleaseManifest`].
pub const MANIFEST_ENTRY: &str = "abrasion.manifest";

/// Entry names the packer writes on its own, outside the manifest file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedEntry {
    Executable,
    Manifest,
}

impl ReservedEntry {
    pub const ALL: [ReservedEntry; 2] = [ReservedEntry::Executable, ReservedEntry::Manifest];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Executable => EXECUTABLE_ENTRY,
            Self::Manifest => MANIFEST_ENTRY,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entry| entry.name() == name)
    }
}

/// A manifest as emitted by the build: which files go where in the release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BuildManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    #[serde(default, rename = "file")]
    pub files: Vec<SourceFile>,
}

/// One build output to be packed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SourceFile {
    /// Entry name inside the release archive.
    pub short_path: String,
    /// Location of the file on the build machine.
    pub path: PathBuf,
}

/// The manifest embedded in a release archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    #[serde(default, rename = "file")]
    pub files: Vec<ReleaseFile>,
}

/// A packed file. Carries no build-machine path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub short_path: String,
    /// Lowercase hex SHA-256 of the entry bytes.
    pub sha256: String,
    pub size: u64,
}

impl ReleaseFile {
    pub fn new(source: &SourceFile, digest: [u8; 32], size: u64) -> Self {
        Self {
            short_path: source.short_path.clone(),
            sha256: hex::encode(digest),
            size,
        }
    }
}

impl ReleaseManifest {
    /// Starts an empty release manifest carrying the build's metadata.
    pub fn for_build(build: &BuildManifest) -> Self {
        Self {
            version: build.version.clone(),
            build_id: build.build_id.clone(),
            files: Vec::with_capacity(build.files.len() + 1),
        }
    }

    pub fn file(&self, short_path: &str) -> Option<&ReleaseFile> {
        self.files.iter().find(|file| file.short_path == short_path)
    }
}

/// Text encodings accepted for the build manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    TextProto,
    Yaml,
    Toml,
    Json,
}

impl ManifestFormat {
    /// Picks a format from the file extension. Anything unrecognised is
    /// treated as protobuf text format, which is what the build emits.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("yaml" | "yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::TextProto,
        }
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    fn new(message: impl ToString) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Parses a build manifest from its text encoding.
pub fn parse(text: &str, format: ManifestFormat) -> Result<BuildManifest, ParseError> {
    match format {
        ManifestFormat::TextProto => {
            let value = textproto::to_value(text).map_err(ParseError::new)?;
            serde_json::from_value(value).map_err(ParseError::new)
        }
        ManifestFormat::Yaml => serde_yaml_bw::from_str(text).map_err(ParseError::new),
        ManifestFormat::Toml => toml::from_str(text).map_err(ParseError::new),
        ManifestFormat::Json => serde_json::from_str(text).map_err(ParseError::new),
    }
}

/// Reads and parses the build manifest at `path`.
pub fn load(path: &Path) -> Result<BuildManifest> {
    let bytes = fs::read(path).map_err(|source| ReleaseError::ReadManifest {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |source: ParseError| ReleaseError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let text = String::from_utf8(bytes).map_err(|err| parse_error(ParseError::new(err)))?;
    parse(&text, ManifestFormat::from_path(path)).map_err(parse_error)
}

/// Encodes a release manifest into its embedded binary form (CBOR).
pub fn encode(manifest: &ReleaseManifest) -> Result<Vec<u8>> {
    serde_cbor::to_vec(manifest).map_err(ReleaseError::Serialize)
}

pub fn decode(bytes: &[u8]) -> Result<ReleaseManifest> {
    serde_cbor::from_slice(bytes).map_err(ReleaseError::Deserialize)
}
