use std::fs;

use seqmix_image_store::{ImageStore, MemoryImage, MemoryImageStore};
use seqmix_processing_core::{
    discover_frames, discover_sequences, export_permitted, probe_sequence, validate,
    DiscoveryOptions, IssueCode, ValidationContext,
};
use seqmix_project_model::{ChannelFormat, ChannelSourceRef, FrameRangePolicy, Project, SequenceSpec};

fn touch(dir: &std::path::Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), b"").unwrap();
    }
}

#[test]
fn discovered_sequences_validate_after_explicit_override() {
    let input = tempfile::tempdir().unwrap();
    touch(
        input.path(),
        &[
            "beauty.0001.exr",
            "beauty.0002.exr",
            "beauty.0003.exr",
            "depth.0001.exr",
            "depth.0002.exr",
            "notes.txt",
        ],
    );

    let report = discover_sequences(input.path(), &DiscoveryOptions::default()).unwrap();
    let patterns: Vec<&str> = report.sequences.iter().map(|s| s.pattern.as_str()).collect();
    assert_eq!(patterns, vec!["beauty.%04d.exr", "depth.%04d.exr"]);

    let store = MemoryImageStore::new();
    store.insert(
        input.path().join("beauty.0001.exr"),
        MemoryImage::filled(8, 4, &[("R", "half"), ("G", "half"), ("B", "half")], 0.5).unwrap(),
    );
    store.insert(
        input.path().join("depth.0001.exr"),
        MemoryImage::filled(8, 4, &[("Z", "float")], 1.0).unwrap(),
    );

    let mut project = Project::new("comp");
    for found in &report.sequences {
        let id = found.pattern.prefix().trim_end_matches('.').to_string();
        let mut seq = SequenceSpec::new(id, found.pattern.clone(), input.path(), found.frames.clone());
        probe_sequence(&store, &mut seq).unwrap();
        project.add_sequence(seq).unwrap();
    }

    project
        .add_output_channel(ChannelSourceRef::new("beauty", "R"), "R")
        .unwrap();
    project
        .add_output_channel(ChannelSourceRef::new("depth", "Z"), "Z")
        .unwrap();
    project.export.output_dir = input.path().join("out");
    project.export.frame_policy = Some(FrameRangePolicy::StopAtShortest);

    let modes = store.supported_compression_modes();
    let issues = validate(&ValidationContext::new(&project).with_compression_modes(&modes));
    assert!(issues
        .iter()
        .any(|i| i.code == IssueCode::ImplicitConversionBlocked));
    assert!(issues
        .iter()
        .any(|i| i.code == IssueCode::SequenceLengthMismatch));
    assert!(!export_permitted(&issues));

    project
        .set_format_override("R", Some(ChannelFormat::new("float")))
        .unwrap();
    let issues = validate(&ValidationContext::new(&project).with_compression_modes(&modes));
    assert!(export_permitted(&issues), "{issues:?}");
}

#[test]
fn frames_rescan_only_canonical_names() {
    let input = tempfile::tempdir().unwrap();
    touch(input.path(), &["shot.0010.png", "shot.0011.png", "shot.0012.png"]);

    let report = discover_sequences(input.path(), &DiscoveryOptions::default()).unwrap();
    let pattern = report.sequences[0].pattern.clone();
    assert_eq!(
        discover_frames(&pattern, input.path()).unwrap(),
        vec![10, 11, 12]
    );

    touch(input.path(), &["shot.013.png"]);
    assert!(discover_frames(&pattern, input.path()).is_err());
}
