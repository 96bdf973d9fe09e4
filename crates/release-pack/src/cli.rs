#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::pack::{self, PackConfig};

#[derive(Debug, Parser)]
#[command(
    name = "release-pack",
    about = "Pack Abrasion build outputs into a release archive",
    version
)]
pub struct Cli {
    /// Path to the build manifest (manifest.text.pb, or .yaml/.toml/.json)
    #[arg(long = "pack_manifest", visible_alias = "pack-manifest", value_name = "FILE")]
    pub manifest: PathBuf,

    /// Path to the main executable
    #[arg(long = "pack_exe", visible_alias = "pack-exe", value_name = "FILE")]
    pub exe: PathBuf,

    /// Path of the release .zip to generate
    #[arg(long = "pack_zip", visible_alias = "pack-zip", value_name = "FILE")]
    pub zip: PathBuf,
}

impl From<Cli> for PackConfig {
    fn from(cli: Cli) -> Self {
        Self {
            manifest_path: normalize(cli.manifest),
            executable_path: normalize(cli.exe),
            archive_path: normalize(cli.zip),
        }
    }
}

/// Execute the CLI using a pre-parsed argument set.
pub fn run_with_cli(cli: Cli) -> Result<()> {
    pack::run(&PackConfig::from(cli))?;
    Ok(())
}

fn normalize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        cwd.join(path)
    }
}
