use std::path::PathBuf;

use abrasion_release::{ReleaseBundle, ReleaseManifest, ReservedEntry, open_release};
use anyhow::Result;
use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(
    name = "release-inspect",
    version,
    about = "Inspect Abrasion release archives"
)]
struct Args {
    /// Path to the release .zip
    #[arg(value_name = "FILE")]
    path: PathBuf,

    /// Emit JSON output
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bundle = open_release(&args.path)?;

    if args.json {
        print_json(&bundle)?;
    } else {
        print_human(&bundle);
    }

    Ok(())
}

fn print_human(bundle: &ReleaseBundle) {
    let manifest: &ReleaseManifest = &bundle.manifest;
    println!("Release: {}", bundle.path().display());
    println!(
        "Version: {}",
        manifest.version.as_deref().unwrap_or("unversioned")
    );
    if let Some(build_id) = &manifest.build_id {
        println!("Build: {build_id}");
    }
    println!("Files: {}", manifest.files.len());
    for file in &manifest.files {
        let marker = match ReservedEntry::from_name(&file.short_path) {
            Some(ReservedEntry::Executable) => " (executable)",
            _ => "",
        };
        println!(
            "  {}  {:>10}  {}{}",
            file.sha256, file.size, file.short_path, marker
        );
    }

    let entries = bundle.entry_names();
    let unlisted: Vec<_> = entries
        .iter()
        .filter(|name| manifest.file(name).is_none() && ReservedEntry::from_name(name).is_none())
        .collect();
    if unlisted.is_empty() {
        println!("Unlisted entries: none");
    } else {
        println!("Unlisted entries:");
        for name in unlisted {
            println!("  - {}", name);
        }
    }
}

fn print_json(bundle: &ReleaseBundle) -> Result<()> {
    let payload = json!({
        "path": bundle.path(),
        "manifest": bundle.manifest,
        "entries": bundle.entry_names(),
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
