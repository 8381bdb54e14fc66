use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use seqmix_export_engine::{ExportError, ExportEvent, ExportOrchestrator, ExportState};
use seqmix_image_store::{MemoryImage, MemoryImageStore, Samples, StoreError};
use seqmix_processing_core::{probe_sequence, IssueCode};
use seqmix_project_model::{
    AttributeSpec, ChannelFormat, ChannelSourceRef, CompressionPolicy, FrameRangePolicy, Project,
    SequencePathPattern, SequenceSpec,
};

struct Fixture {
    _dir: tempfile::TempDir,
    out: PathBuf,
    store: Arc<MemoryImageStore>,
    project: Project,
}

fn load_sequence(
    store: &MemoryImageStore,
    project: &mut Project,
    id: &str,
    frames: &[u64],
    channels: &[(&str, &str)],
) {
    let mut seq = SequenceSpec::new(
        id,
        SequencePathPattern::parse(&format!("{id}.%04d.exr")).unwrap(),
        "/renders",
        frames.to_vec(),
    );
    for frame in frames {
        store.insert(
            seq.frame_path(*frame),
            MemoryImage::filled(4, 2, channels, *frame as f32 / 10.0).unwrap(),
        );
    }
    probe_sequence(store, &mut seq).unwrap();
    project.add_sequence(seq).unwrap();
}

fn fixture(beauty: &[u64], depth: &[u64], policy: FrameRangePolicy) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let store = Arc::new(MemoryImageStore::new());
    let mut project = Project::new("comp");

    load_sequence(
        &store,
        &mut project,
        "beauty",
        beauty,
        &[("R", "half"), ("G", "half"), ("B", "half")],
    );
    load_sequence(&store, &mut project, "depth", depth, &[("Z", "half")]);

    for (seq, chan, name) in [("depth", "Z", "depth.Z"), ("beauty", "B", "B"), ("beauty", "R", "R")] {
        project
            .add_output_channel(ChannelSourceRef::new(seq, chan), name)
            .unwrap();
    }
    project
        .add_output_attribute(AttributeSpec::string("comment", "recombined"))
        .unwrap();
    project.export.output_dir = out.clone();
    project.export.filename_pattern = "comp.%04d.exr".to_string();
    project.export.frame_policy = Some(policy);

    Fixture {
        _dir: dir,
        out,
        store,
        project,
    }
}

fn output(fx: &Fixture, frame: u64) -> PathBuf {
    fx.out.join(format!("comp.{frame:04}.exr"))
}

fn run(orchestrator: &mut ExportOrchestrator, project: &Project) -> Vec<ExportEvent> {
    let events = orchestrator.start(project).unwrap();
    events.iter().collect()
}

#[test]
fn completed_run_writes_frames_in_recipe_order() {
    let fx = fixture(&[1, 2, 3], &[1, 2, 3], FrameRangePolicy::StopAtShortest);
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    let events = run(&mut orchestrator, &fx.project);
    assert_eq!(orchestrator.state(), ExportState::Completed);

    let written = fx.store.written_paths();
    assert_eq!(written, vec![output(&fx, 1), output(&fx, 2), output(&fx, 3)]);

    let image = fx.store.written(&output(&fx, 2)).unwrap();
    let names: Vec<_> = image.spec.channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["depth.Z", "B", "R"]);
    assert_eq!(image.attributes, fx.project.export.output_attributes);
    assert_eq!(image.spec.compression, None);

    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Progress(p) => Some(p.fraction),
            _ => None,
        })
        .collect();
    assert_eq!(fractions.len(), 3);
    assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(fractions.last().copied(), Some(1.0));

    match events.last() {
        Some(ExportEvent::Finished(summary)) => {
            assert_eq!(summary.state, ExportState::Completed);
            assert_eq!(summary.written, vec![1, 2, 3]);
        }
        other => panic!("expected Finished, got {other:?}"),
    }

    let summary = orchestrator.finish().unwrap();
    assert_eq!(summary.state, ExportState::Completed);
    assert_eq!(orchestrator.state(), ExportState::Idle);
}

#[test]
fn cancel_after_k_frames_keeps_exactly_k() {
    for k in [1usize, 3, 5] {
        let fx = fixture(&[1, 2, 3, 4, 5], &[1, 2, 3, 4, 5], FrameRangePolicy::StopAtShortest);
        let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

        let token = orchestrator.cancel_token();
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = writes.clone();
        fx.store.set_on_write(move |_: &Path| {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == k {
                token.store(true, Ordering::SeqCst);
            }
        });

        run(&mut orchestrator, &fx.project);
        let summary = orchestrator.finish().unwrap();

        assert_eq!(fx.store.written_paths().len(), k);
        assert_eq!(summary.state, ExportState::Cancelled);
        assert_eq!(summary.cancelled_after, Some(k as u64));
    }
}

#[test]
fn unreadable_source_skips_only_that_frame() {
    let fx = fixture(&[1, 2, 3, 4], &[1, 2, 3, 4], FrameRangePolicy::StopAtShortest);
    fx.store.fail_reads_of("/renders/beauty.0003.exr");
    fx.store.fail_writes_of(output(&fx, 1));
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    let events = run(&mut orchestrator, &fx.project);
    let summary = orchestrator.finish().unwrap();

    assert_eq!(summary.state, ExportState::Completed);
    assert_eq!(summary.written, vec![2, 4]);
    let skipped: Vec<_> = summary.skipped.iter().map(|s| s.frame).collect();
    assert_eq!(skipped, vec![1, 3]);
    assert!(events
        .iter()
        .any(|e| matches!(e, ExportEvent::FrameSkipped(s) if s.frame == 3)));
}

#[test]
fn setup_failure_fails_the_run() {
    let fx = fixture(&[1, 2, 3], &[1, 2, 3], FrameRangePolicy::StopAtShortest);
    fx.store.fail_all_writes_with(StoreError::OutputUnavailable {
        path: fx.out.clone(),
        message: "read-only volume".to_string(),
    });
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    run(&mut orchestrator, &fx.project);
    assert_eq!(orchestrator.state(), ExportState::Failed);
    let summary = orchestrator.finish().unwrap();

    assert!(summary.written.is_empty());
    assert!(summary.skipped.is_empty());
    assert!(summary.failure.unwrap().contains("read-only volume"));
}

#[test]
fn process_available_writes_partial_frames() {
    let fx = fixture(&[0, 2], &[0, 1], FrameRangePolicy::ProcessAvailable);
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    let events = run(&mut orchestrator, &fx.project);
    let summary = orchestrator.finish().unwrap();
    assert_eq!(summary.written, vec![0, 1, 2]);

    let frame1 = fx.store.written(&output(&fx, 1)).unwrap();
    let names: Vec<_> = frame1.spec.channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["depth.Z"]);

    let missing: Vec<(u64, Vec<String>)> = events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::MissingChannels { frame, channels } => Some((*frame, channels.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        missing,
        vec![
            (1, vec!["B".to_string(), "R".to_string()]),
            (2, vec!["depth.Z".to_string()]),
        ]
    );
}

#[test]
fn stop_at_shortest_logs_frames_it_cannot_resolve() {
    let fx = fixture(&[0, 1], &[1, 2], FrameRangePolicy::StopAtShortest);
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    let events = run(&mut orchestrator, &fx.project);
    let summary = orchestrator.finish().unwrap();
    assert_eq!(summary.state, ExportState::Completed);
    assert_eq!(summary.written, vec![1]);
    assert_eq!(summary.dropped, vec![0, 2]);

    let unresolved: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Log(line) if line.code == "frame_unresolved" => Some(line.message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        unresolved,
        vec![
            "frame 0 dropped: no source in depth",
            "frame 2 dropped: no source in beauty",
        ]
    );
}

#[test]
fn explicit_override_converts_samples() {
    let mut fx = fixture(&[1], &[1], FrameRangePolicy::StopAtShortest);
    for name in ["depth.Z", "B", "R"] {
        fx.project
            .set_format_override(name, Some(ChannelFormat::new("float")))
            .unwrap();
    }
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());
    run(&mut orchestrator, &fx.project);
    orchestrator.finish().unwrap();

    let image = fx.store.written(&output(&fx, 1)).unwrap();
    assert!(image
        .pixels
        .planes
        .iter()
        .all(|p| matches!(p.samples, Samples::F32(_))));
}

#[test]
fn duplicate_output_names_block_the_export() {
    let mut fx = fixture(&[1, 2], &[1, 2], FrameRangePolicy::StopAtShortest);
    fx.project.export.output_channels[2].output_name = "B".to_string();
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    match orchestrator.start(&fx.project) {
        Err(ExportError::Blocked { error_count, issues }) => {
            assert_eq!(error_count, 1);
            assert_eq!(issues[0].code, IssueCode::DuplicateOutputName);
        }
        other => panic!("expected Blocked, got {other:?}"),
    }
    assert_eq!(orchestrator.state(), ExportState::Idle);
    assert!(fx.store.written_paths().is_empty());
}

#[test]
fn unconvertible_override_blocks_before_any_frame() {
    let mut fx = fixture(&[1, 2], &[1, 2], FrameRangePolicy::StopAtShortest);
    fx.project
        .set_format_override("depth.Z", Some(ChannelFormat::new("double")))
        .unwrap();
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    match orchestrator.start(&fx.project) {
        Err(ExportError::Blocked { issues, .. }) => {
            assert!(issues
                .iter()
                .any(|i| i.code == IssueCode::UnsupportedFormatOverride));
        }
        other => panic!("expected Blocked, got {other:?}"),
    }
    assert!(fx.store.written_paths().is_empty());
}

#[test]
fn second_start_requires_collecting_the_first_run() {
    let fx = fixture(&[1], &[1], FrameRangePolicy::StopAtShortest);
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    run(&mut orchestrator, &fx.project);
    assert!(matches!(
        orchestrator.start(&fx.project),
        Err(ExportError::NotIdle {
            state: ExportState::Completed
        })
    ));

    orchestrator.finish().unwrap();
    run(&mut orchestrator, &fx.project);
    assert_eq!(orchestrator.finish().unwrap().state, ExportState::Completed);
}

/// One sequence taken whole, under its own channel names.
fn passthrough(frames: &[u64]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let store = Arc::new(MemoryImageStore::new());
    let mut project = Project::new("plate");

    load_sequence(
        &store,
        &mut project,
        "beauty",
        frames,
        &[("R", "half"), ("G", "half"), ("B", "half")],
    );
    for chan in ["R", "G", "B"] {
        project
            .add_output_channel(ChannelSourceRef::new("beauty", chan), chan)
            .unwrap();
    }
    project.export.output_dir = out.clone();
    project.export.filename_pattern = "comp.%04d.exr".to_string();
    project.export.frame_policy = Some(FrameRangePolicy::StopAtShortest);

    Fixture {
        _dir: dir,
        out,
        store,
        project,
    }
}

fn log_codes(events: &[ExportEvent], code: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ExportEvent::Log(line) if line.code == code))
        .count()
}

#[test]
fn unchanged_single_sequence_is_copied() {
    let fx = passthrough(&[1, 2]);
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    let events = run(&mut orchestrator, &fx.project);
    let summary = orchestrator.finish().unwrap();
    assert_eq!(summary.written, vec![1, 2]);
    assert_eq!(summary.copied, vec![1, 2]);
    assert_eq!(log_codes(&events, "export_mode"), 1);

    assert_eq!(
        fx.store.copied_from(&output(&fx, 2)),
        Some(PathBuf::from("/renders/beauty.0002.exr"))
    );
    assert!(fx.store.written(&output(&fx, 2)).is_none());
}

#[test]
fn failed_copy_recombines_the_rest() {
    let fx = passthrough(&[1, 2, 3]);
    fx.store.fail_copies_of(output(&fx, 2));
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    let events = run(&mut orchestrator, &fx.project);
    let summary = orchestrator.finish().unwrap();
    assert_eq!(summary.state, ExportState::Completed);
    assert_eq!(summary.written, vec![1, 2, 3]);
    assert_eq!(summary.copied, vec![1]);
    assert_eq!(log_codes(&events, "direct_copy_fallback"), 1);

    let names: Vec<_> = fx
        .store
        .written(&output(&fx, 3))
        .unwrap()
        .spec
        .channels
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["R", "G", "B"]);
    assert!(fx.store.written(&output(&fx, 2)).is_some());
}

#[test]
fn always_policy_recombines_every_frame() {
    let mut fx = passthrough(&[1, 2]);
    fx.project.export.compression_policy = CompressionPolicy::Always;
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    run(&mut orchestrator, &fx.project);
    let summary = orchestrator.finish().unwrap();
    assert_eq!(summary.written, vec![1, 2]);
    assert!(summary.copied.is_empty());
    assert!(fx.store.copied_from(&output(&fx, 1)).is_none());
    assert!(fx.store.written(&output(&fx, 1)).is_some());
}

#[test]
fn edited_attributes_rule_out_copying() {
    let mut fx = passthrough(&[1]);
    fx.project
        .add_output_attribute(AttributeSpec::string("comment", "graded"))
        .unwrap();
    let mut orchestrator = ExportOrchestrator::new(fx.store.clone());

    run(&mut orchestrator, &fx.project);
    let summary = orchestrator.finish().unwrap();
    assert!(summary.copied.is_empty());
    let image = fx.store.written(&output(&fx, 1)).unwrap();
    assert_eq!(image.attributes.names(), vec!["comment"]);
}
