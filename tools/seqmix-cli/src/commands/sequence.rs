//! Load and unload sequences.

use std::path::PathBuf;

use seqmix_common::config::AppConfig;
use seqmix_image_store::FsImageStore;
use seqmix_processing_core::{discover_frames, probe_sequence};
use seqmix_project_model::{SequencePathPattern, SequenceSpec};

pub fn add(
    config: &mut AppConfig,
    path: PathBuf,
    dir: PathBuf,
    pattern: String,
    id: Option<String>,
) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    let pattern = SequencePathPattern::parse(&pattern)?;

    let frames = discover_frames(&pattern, &dir)?;
    if frames.is_empty() {
        anyhow::bail!("No frames of {} in {}", pattern, dir.display());
    }

    let id = id.unwrap_or_else(|| default_id(&pattern, loaded.project.sequences.len()));
    let mut sequence = SequenceSpec::new(id, pattern, &dir, frames);
    probe_sequence(&FsImageStore::new(), &mut sequence)?;

    println!(
        "Loaded '{}': {} frame(s), {}-{}",
        sequence.id,
        sequence.frames().len(),
        sequence.first_frame().unwrap_or_default(),
        sequence.last_frame().unwrap_or_default()
    );
    if let Some(probe) = &sequence.probe {
        for (index, sub) in probe.subimages.iter().enumerate() {
            let channels: Vec<String> = sub
                .channels
                .iter()
                .map(|c| format!("{}:{}", c.name, c.format))
                .collect();
            println!("  subimage {index} {}: {}", sub.geometry, channels.join(" "));
        }
    }

    loaded.project.add_sequence(sequence)?;
    super::save_project(&loaded)?;

    config.session.last_input_dir = Some(dir);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

pub fn remove(path: PathBuf, id: String) -> anyhow::Result<()> {
    let mut loaded = super::load_project(&path)?;
    loaded.project.remove_sequence(&id)?;
    super::save_project(&loaded)?;

    let orphaned = loaded
        .project
        .export
        .output_channels
        .iter()
        .filter(|c| c.source.sequence_id == id)
        .count();
    println!("Removed sequence '{id}'");
    if orphaned > 0 {
        println!("  {orphaned} output channel(s) still refer to it");
    }
    Ok(())
}

/// `beauty.` -> `beauty`; an empty prefix falls back to a numbered id.
fn default_id(pattern: &SequencePathPattern, existing: usize) -> String {
    let trimmed = pattern
        .prefix()
        .trim_end_matches(|c: char| matches!(c, '.' | '_' | '-'));
    if trimmed.is_empty() {
        format!("seq{}", existing + 1)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_id() {
        let pattern = SequencePathPattern::parse("shot_beauty.%04d.png").unwrap();
        assert_eq!(default_id(&pattern, 0), "shot_beauty");

        let pattern = SequencePathPattern::parse("####.png").unwrap();
        assert_eq!(default_id(&pattern, 2), "seq3");
    }
}
