pub mod attrs;
pub mod channel;
pub mod discover;
pub mod export;
pub mod info;
pub mod init;
pub mod sequence;
pub mod set_export;
pub mod validate;

use std::path::Path;

use seqmix_image_store::ImageStore;
use seqmix_processing_core::probe_sequence;
use seqmix_project_model::{ChannelSourceRef, LoadedProject, Project};

pub fn load_project(path: &Path) -> anyhow::Result<LoadedProject> {
    LoadedProject::load(path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))
}

pub fn save_project(project: &LoadedProject) -> anyhow::Result<()> {
    project
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))
}

/// Probes are not stored in the project file; refresh them after loading.
/// A sequence that fails to probe stays unprobed and shows up in validation.
pub fn probe_all(project: &mut Project, store: &dyn ImageStore) {
    for sequence in &mut project.sequences {
        if let Err(e) = probe_sequence(store, sequence) {
            tracing::warn!(sequence = %sequence.id, error = %e, "Probe failed");
        }
    }
}

/// Parse `SEQ:CHANNEL` or `SEQ:CHANNEL@SUBIMAGE`.
pub fn parse_source(text: &str) -> anyhow::Result<ChannelSourceRef> {
    let (sequence, rest) = text
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Source must look like SEQ:CHANNEL[@SUBIMAGE], got '{text}'"))?;

    let (channel, subimage) = match rest.rsplit_once('@') {
        Some((channel, index)) => {
            let index: usize = index
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid subimage index '{index}' in '{text}'"))?;
            (channel, index)
        }
        None => (rest, 0),
    };

    if sequence.is_empty() || channel.is_empty() {
        anyhow::bail!("Source must look like SEQ:CHANNEL[@SUBIMAGE], got '{text}'");
    }
    Ok(ChannelSourceRef::new(sequence, channel).in_subimage(subimage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        let src = parse_source("beauty:R").unwrap();
        assert_eq!(src.sequence_id, "beauty");
        assert_eq!(src.channel_name, "R");
        assert_eq!(src.subimage_index, 0);

        let src = parse_source("beauty:diffuse.R@2").unwrap();
        assert_eq!(src.channel_name, "diffuse.R");
        assert_eq!(src.subimage_index, 2);

        assert!(parse_source("beauty").is_err());
        assert!(parse_source(":R").is_err());
        assert!(parse_source("beauty:R@x").is_err());
    }
}
