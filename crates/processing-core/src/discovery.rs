//! Sequence discovery.
//!
//! Files are grouped by the literal text around one digit run: the run that
//! ends at the extension, or the rightmost run in the stem when the stem does
//! not end in digits. The run length becomes the padding width of the group.
//!
//! A candidate is only accepted if every member filename is reproduced
//! exactly by formatting its frame number through the candidate pattern.
//! A candidate that fails this check is rejected as a whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use seqmix_common::config::DiscoveryDefaults;
use seqmix_common::error::{SeqmixError, SeqmixResult};
use seqmix_project_model::{FrameIndex, PatternError, SequencePathPattern};

/// Which files are considered during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Lowercase extensions without the dot. Empty accepts every file.
    pub extensions: Vec<String>,
}

/// A sequence found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSequence {
    pub pattern: SequencePathPattern,
    /// Ascending, unique.
    pub frames: Vec<FrameIndex>,
}

/// Why a candidate sequence was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("candidate '{candidate}' is not a valid pattern: {source}")]
    InvalidPattern {
        candidate: String,
        source: PatternError,
    },

    #[error("'{filename}' does not round-trip through '{pattern}'")]
    NotRoundTripping { pattern: String, filename: String },

    #[error("frame number in '{filename}' is out of range")]
    FrameOutOfRange { filename: String },
}

/// Outcome of grouping a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Accepted sequences, sorted by pattern.
    pub sequences: Vec<DiscoveredSequence>,
    /// Candidates that were dropped.
    pub rejected: Vec<DiscoveryError>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    prefix: String,
    width: usize,
    suffix: String,
}

#[derive(Debug, Default)]
struct Group {
    members: Vec<(String, String)>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from_config(&DiscoveryDefaults::default())
    }
}

impl DiscoveryOptions {
    pub fn from_config(config: &DiscoveryDefaults) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Consider every file regardless of extension.
    pub fn any_extension() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    pub fn accepts(&self, filename: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match extension_of(filename) {
            Some(ext) => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

/// Group the image files of `dir` into sequences.
pub fn discover_sequences(dir: &Path, options: &DiscoveryOptions) -> SeqmixResult<DiscoveryReport> {
    let names = list_files(dir)?;
    let report = group_filenames(&names, options);
    tracing::info!(
        dir = %dir.display(),
        files = names.len(),
        sequences = report.sequences.len(),
        rejected = report.rejected.len(),
        "Discovered sequences"
    );
    Ok(report)
}

/// Group bare filenames into sequences.
pub fn group_filenames<S: AsRef<str>>(names: &[S], options: &DiscoveryOptions) -> DiscoveryReport {
    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();

    for name in names.iter().map(|n| n.as_ref()) {
        if !options.accepts(name) {
            continue;
        }
        let Some((start, end)) = frame_digit_run(name) else {
            continue;
        };
        let key = GroupKey {
            prefix: name[..start].to_string(),
            width: end - start,
            suffix: name[end..].to_string(),
        };
        groups
            .entry(key)
            .or_default()
            .members
            .push((name.to_string(), name[start..end].to_string()));
    }

    let groups = fold_unpadded_groups(groups);

    let mut report = DiscoveryReport::default();
    for (key, group) in groups {
        match build_candidate(&key, &group) {
            Ok(sequence) => report.sequences.push(sequence),
            Err(err) => {
                tracing::warn!(error = %err, "Rejected sequence candidate");
                report.rejected.push(err);
            }
        }
    }
    report
        .sequences
        .sort_by(|a, b| a.pattern.as_str().cmp(b.pattern.as_str()));
    report
}

/// Frames of `dir` matching a known pattern.
///
/// A file whose literal parts match but whose digits are not the canonical
/// rendering for the pattern fails the whole scan.
pub fn discover_frames(pattern: &SequencePathPattern, dir: &Path) -> SeqmixResult<Vec<FrameIndex>> {
    let matcher = pattern.to_matcher();
    let mut frames = Vec::new();

    for name in list_files(dir)? {
        if matcher.digit_field(&name).is_none() {
            continue;
        }
        match matcher.extract_frame(&name) {
            Some(frame) => frames.push(frame),
            None => {
                let err = DiscoveryError::NotRoundTripping {
                    pattern: pattern.to_string(),
                    filename: name,
                };
                tracing::warn!(dir = %dir.display(), error = %err, "Frame scan failed");
                return Err(SeqmixError::discovery(err.to_string()));
            }
        }
    }

    frames.sort_unstable();
    frames.dedup();
    tracing::debug!(pattern = %pattern, frames = frames.len(), "Scanned frames");
    Ok(frames)
}

fn list_files(dir: &Path) -> SeqmixResult<Vec<String>> {
    if !dir.is_dir() {
        return Err(SeqmixError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path: PathBuf = entry?.path();
        if !path.is_file() {
            continue;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => names.push(name.to_string()),
            None => tracing::debug!(path = %path.display(), "Skipping non UTF-8 filename"),
        }
    }
    names.sort();
    Ok(names)
}

fn extension_of(filename: &str) -> Option<&str> {
    let dot = filename.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(&filename[dot + 1..])
}

/// Byte range of the frame digit run in `filename`.
fn frame_digit_run(filename: &str) -> Option<(usize, usize)> {
    let stem_end = match filename.rfind('.') {
        Some(dot) if dot > 0 => dot,
        _ => filename.len(),
    };
    let bytes = &filename.as_bytes()[..stem_end];

    let end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    Some((start, end))
}

/// Merge groups whose digit runs carry no leading zero into the narrowest
/// group with the same literals: `a.1000.exr` belongs with `a.0999.exr`.
fn fold_unpadded_groups(groups: BTreeMap<GroupKey, Group>) -> BTreeMap<GroupKey, Group> {
    let keys: Vec<GroupKey> = groups.keys().cloned().collect();
    let mut folded: BTreeMap<GroupKey, Group> = BTreeMap::new();

    for (key, group) in groups {
        let unpadded = group
            .members
            .iter()
            .all(|(_, digits)| digits.len() == 1 || !digits.starts_with('0'));
        let target = if unpadded {
            keys.iter()
                .filter(|k| k.prefix == key.prefix && k.suffix == key.suffix && k.width < key.width)
                .min_by_key(|k| k.width)
                .cloned()
                .unwrap_or_else(|| key.clone())
        } else {
            key
        };
        folded
            .entry(target)
            .or_default()
            .members
            .extend(group.members);
    }
    folded
}

fn build_candidate(key: &GroupKey, group: &Group) -> Result<DiscoveredSequence, DiscoveryError> {
    let candidate = format!("{}%0{}d{}", key.prefix, key.width, key.suffix);
    let pattern =
        SequencePathPattern::from_parts(&key.prefix, key.width, &key.suffix).map_err(|source| {
            DiscoveryError::InvalidPattern {
                candidate: candidate.clone(),
                source,
            }
        })?;

    let mut frames = Vec::with_capacity(group.members.len());
    for (filename, digits) in &group.members {
        let frame: FrameIndex = digits.parse().map_err(|_| DiscoveryError::FrameOutOfRange {
            filename: filename.clone(),
        })?;
        if pattern.format(frame) != *filename || pattern.extract_frame(filename) != Some(frame) {
            return Err(DiscoveryError::NotRoundTripping {
                pattern: candidate,
                filename: filename.clone(),
            });
        }
        frames.push(frame);
    }

    frames.sort_unstable();
    frames.dedup();
    Ok(DiscoveredSequence { pattern, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn patterns(report: &DiscoveryReport) -> Vec<&str> {
        report.sequences.iter().map(|s| s.pattern.as_str()).collect()
    }

    #[test]
    fn test_groups_by_literals_and_width() {
        let names = [
            "beauty.0001.exr",
            "beauty.0002.exr",
            "depth.00001.exr",
            "depth.00002.exr",
            "notes.txt",
        ];
        let report = group_filenames(&names, &DiscoveryOptions::default());
        assert_eq!(patterns(&report), vec!["beauty.%04d.exr", "depth.%05d.exr"]);
        assert_eq!(report.sequences[0].frames, vec![1, 2]);
        assert!(report.rejected.is_empty());
    }

    #[test]
    fn test_picks_run_adjacent_to_extension() {
        let names = ["shot_2024_v003.1001.exr", "shot_2024_v003.1002.exr"];
        let report = group_filenames(&names, &DiscoveryOptions::default());
        assert_eq!(patterns(&report), vec!["shot_2024_v003.%04d.exr"]);
        assert_eq!(report.sequences[0].frames, vec![1001, 1002]);
    }

    #[test]
    fn test_falls_back_to_rightmost_run_in_stem() {
        let names = ["plate_0010_denoised.png", "plate_0011_denoised.png"];
        let report = group_filenames(&names, &DiscoveryOptions::default());
        assert_eq!(patterns(&report), vec!["plate_%04d_denoised.png"]);
    }

    #[test]
    fn test_wider_unpadded_frames_fold_into_padded_group() {
        let names = ["a.0998.exr", "a.0999.exr", "a.1000.exr", "a.10000.exr"];
        let report = group_filenames(&names, &DiscoveryOptions::default());
        assert_eq!(patterns(&report), vec!["a.%04d.exr"]);
        assert_eq!(report.sequences[0].frames, vec![998, 999, 1000, 10000]);
    }

    #[test]
    fn test_distinct_padding_stays_separate() {
        let names = ["a.001.exr", "a.0001.exr"];
        let report = group_filenames(&names, &DiscoveryOptions::default());
        assert_eq!(patterns(&report), vec!["a.%03d.exr", "a.%04d.exr"]);
    }

    #[test]
    fn test_candidate_with_token_like_literal_is_rejected_whole() {
        let names = ["take#2_0001.exr", "take#2_0002.exr", "clean.0001.exr"];
        let report = group_filenames(&names, &DiscoveryOptions::default());
        assert_eq!(patterns(&report), vec!["clean.%04d.exr"]);
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(
            report.rejected[0],
            DiscoveryError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        let names = ["A.0001.EXR", "A.0002.EXR", "b.0001.mov"];
        let report = group_filenames(&names, &DiscoveryOptions::default());
        assert_eq!(patterns(&report), vec!["A.%04d.EXR"]);

        let all = group_filenames(&names, &DiscoveryOptions::any_extension());
        assert_eq!(all.sequences.len(), 2);
    }

    #[test]
    fn test_discover_sequences_and_frames_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["beauty.0003.exr", "beauty.0001.exr", "readme.md"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("beauty.0002.exr")).unwrap();

        let report = discover_sequences(dir.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(report.sequences.len(), 1);
        assert_eq!(report.sequences[0].frames, vec![1, 3]);

        let frames = discover_frames(&report.sequences[0].pattern, dir.path()).unwrap();
        assert_eq!(frames, vec![1, 3]);
    }

    #[test]
    fn test_discover_frames_fails_closed_on_non_canonical_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["beauty.0001.exr", "beauty.002.exr"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let pattern = SequencePathPattern::parse("beauty.%04d.exr").unwrap();
        let err = discover_frames(&pattern, dir.path()).unwrap_err();
        assert!(matches!(err, SeqmixError::Discovery { .. }));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_sequences(&dir.path().join("absent"), &DiscoveryOptions::default())
            .unwrap_err();
        assert!(matches!(err, SeqmixError::FileNotFound { .. }));
    }

    proptest! {
        #[test]
        fn prop_selects_run_adjacent_to_extension(
            head in "[a-z]{1,4}",
            noise in 0u32..100_000,
            width in 3usize..=6,
            frames in proptest::collection::btree_set(0u64..999, 1..6),
            ext in prop::sample::select(vec!["exr", "png", "tif"]),
        ) {
            let prefix = format!("{head}_v{noise}_");
            let names: Vec<String> = frames
                .iter()
                .map(|f| format!("{prefix}{f:0width$}.{ext}"))
                .collect();

            let report = group_filenames(&names, &DiscoveryOptions::default());
            prop_assert_eq!(report.sequences.len(), 1);
            let seq = &report.sequences[0];
            prop_assert_eq!(seq.pattern.prefix(), prefix.as_str());
            prop_assert_eq!(seq.pattern.frame_width(), width);
            prop_assert_eq!(&seq.frames, &frames.iter().copied().collect::<Vec<_>>());
            for (name, frame) in names.iter().zip(&seq.frames) {
                prop_assert_eq!(seq.pattern.extract_frame(name), Some(*frame));
                prop_assert_eq!(&seq.pattern.format(*frame), name);
            }
        }
    }
}
