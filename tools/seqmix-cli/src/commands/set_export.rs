//! Change export settings.

use std::path::PathBuf;

use seqmix_common::config::AppConfig;
use seqmix_project_model::{AlignmentMode, CompressionPolicy, FrameRange, FrameRangePolicy};

/// Fields to change; `None` leaves a setting as it is.
#[derive(Debug, Default)]
pub struct ExportChanges {
    pub output_dir: Option<PathBuf>,
    pub pattern: Option<String>,
    pub policy: Option<FrameRangePolicy>,
    pub alignment: Option<AlignmentMode>,
    pub compression: Option<String>,
    pub compression_policy: Option<CompressionPolicy>,
    pub range: Option<String>,
    pub clear_range: bool,
}

pub fn run(config: &mut AppConfig, path: PathBuf, changes: ExportChanges) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    let export = &mut loaded.project.export;

    if let Some(dir) = changes.output_dir {
        config.session.last_output_dir = Some(dir.clone());
        export.output_dir = dir;
    }
    if let Some(pattern) = changes.pattern {
        // Checked by validation so an incomplete pattern can still be saved.
        export.filename_pattern = pattern;
    }
    if let Some(policy) = changes.policy {
        config.session.frame_policy = Some(policy.to_string());
        export.frame_policy = Some(policy);
    }
    if let Some(mode) = changes.alignment {
        export.alignment = Some(mode);
    }
    if let Some(compression) = changes.compression {
        let compression = match compression.as_str() {
            "" | "default" => None,
            _ => Some(compression),
        };
        config.session.compression = compression.clone();
        export.compression = compression;
    }
    if let Some(policy) = changes.compression_policy {
        export.compression_policy = policy;
    }
    if let Some(range) = changes.range {
        export.frame_range = Some(parse_range(&range)?);
    }
    if changes.clear_range {
        export.frame_range = None;
    }

    loaded.project.touch();
    super::save_project(&loaded)?;
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!("Export settings updated");
    Ok(())
}

/// `START-END`, inclusive.
fn parse_range(text: &str) -> anyhow::Result<FrameRange> {
    let (start, end) = text
        .split_once('-')
        .ok_or_else(|| anyhow::anyhow!("Frame range must look like START-END, got '{text}'"))?;
    let start: u64 = start
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid range start '{start}'"))?;
    let end: u64 = end
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid range end '{end}'"))?;
    if start > end {
        anyhow::bail!("Frame range {start}-{end} is empty");
    }
    Ok(FrameRange::new(start, end))
}
