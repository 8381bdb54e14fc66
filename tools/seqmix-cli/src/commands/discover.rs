//! List the frame sequences in a directory.

use std::path::PathBuf;

use seqmix_common::config::AppConfig;
use seqmix_processing_core::{discover_sequences, DiscoveryOptions};

pub fn run(config: &AppConfig, dir: PathBuf, all_files: bool) -> anyhow::Result<()> {
    let options = if all_files {
        DiscoveryOptions::any_extension()
    } else {
        DiscoveryOptions::from_config(&config.discovery)
    };

    let report = discover_sequences(&dir, &options)?;

    println!("Sequences in {}:", dir.display());
    if report.sequences.is_empty() {
        println!("  (none)");
    }
    for seq in &report.sequences {
        let first = seq.frames.first().copied().unwrap_or_default();
        let last = seq.frames.last().copied().unwrap_or_default();
        println!(
            "  {}  {} frame(s), {}-{}",
            seq.pattern,
            seq.frames.len(),
            first,
            last
        );
    }

    if !report.rejected.is_empty() {
        println!();
        println!("Rejected:");
        for err in &report.rejected {
            println!("  - {err}");
        }
    }

    Ok(())
}
