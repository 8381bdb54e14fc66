//! Per-frame export plans.
//!
//! A plan is an immutable snapshot of everything the worker needs, taken
//! when the run starts. Later recipe edits never reach an in-flight export.

use std::path::PathBuf;

use seqmix_common::error::{SeqmixError, SeqmixResult};
use seqmix_processing_core::{
    recipe_alignment_inputs, resolve_alignment, AlignmentPlan, DroppedFrame,
};
use seqmix_project_model::{
    AlignmentMode, AttributeProvenance, AttributeSet, ChannelFormat, CompressionPolicy,
    FrameIndex, FrameRangePolicy, Project, SequencePathPattern,
};

/// One file read: a subimage of one source frame and the channels needed
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRead {
    pub sequence_id: String,
    pub source_frame: FrameIndex,
    pub path: PathBuf,
    pub subimage_index: usize,
    /// Unique, in first-use order.
    pub channels: Vec<String>,
}

/// Where one output channel comes from in a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlacement {
    pub output_name: String,
    /// Index into [`FramePlan::reads`].
    pub read: usize,
    pub source_channel: String,
    pub override_format: Option<ChannelFormat>,
}

/// Everything needed to produce one output frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    pub output_frame: FrameIndex,
    pub output_path: PathBuf,
    pub reads: Vec<SourceRead>,
    /// Available channels, in recipe order.
    pub placements: Vec<ChannelPlacement>,
    /// Output channels with no source at this frame.
    pub missing: Vec<String>,
    /// Source file that reproduces this frame unchanged, when the run copies.
    pub copy_from: Option<PathBuf>,
}

/// Snapshot of a run.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub output_dir: PathBuf,
    pub compression: Option<String>,
    pub attributes: AttributeSet,
    pub mode: AlignmentMode,
    pub policy: FrameRangePolicy,
    pub fallback_reason: Option<String>,
    /// Why frames are copied or recombined.
    pub direct_copy: DirectCopy,
    pub frames: Vec<FramePlan>,
    pub dropped: Vec<DroppedFrame>,
}

/// Whether a run may copy source files instead of recombining them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectCopy {
    /// Every output frame is one frame of `sequence_id`, unchanged.
    Eligible { sequence_id: String },
    Ineligible { reason: String },
}

impl DirectCopy {
    pub fn is_eligible(&self) -> bool {
        matches!(self, DirectCopy::Eligible { .. })
    }

    /// Drop back to recombination.
    pub fn disable(&mut self, reason: impl Into<String>) {
        *self = DirectCopy::Ineligible {
            reason: reason.into(),
        };
    }
}

impl FramePlan {
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}

impl ExportJob {
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }
}

/// Resolve alignment for `project` and plan every output frame.
pub fn build_export_job(project: &Project) -> SeqmixResult<ExportJob> {
    let export = &project.export;
    let policy = export
        .frame_policy
        .ok_or_else(|| SeqmixError::export("no frame range policy selected"))?;

    let inputs = recipe_alignment_inputs(project);
    let alignment = resolve_alignment(&inputs, policy, export.alignment, export.frame_range);
    let mut frames = build_frame_plans(project, &alignment)?;
    let direct_copy = match direct_copy_source(project) {
        Ok(sequence_id) => {
            for frame in &mut frames {
                frame.copy_from = frame.reads.first().map(|r| r.path.clone());
            }
            DirectCopy::Eligible { sequence_id }
        }
        Err(reason) => DirectCopy::Ineligible { reason },
    };

    Ok(ExportJob {
        output_dir: export.output_dir.clone(),
        compression: export.compression.clone(),
        attributes: export.output_attributes.clone(),
        mode: alignment.mode,
        policy,
        fallback_reason: alignment.fallback_reason,
        direct_copy,
        frames,
        dropped: alignment.dropped,
    })
}

/// The single sequence whose files an export would reproduce byte for
/// byte, or why recombination is needed.
///
/// Copying requires the recipe to take every channel of a single-subimage
/// sequence under its own name and in file order, with no format override,
/// no compression selector, the same file extension, and output
/// attributes identical to the source's.
pub fn direct_copy_source(project: &Project) -> Result<String, String> {
    let export = &project.export;
    if export.compression_policy == CompressionPolicy::Always {
        return Err("compression policy is 'always'".to_string());
    }
    let first = export
        .output_channels
        .first()
        .ok_or_else(|| "no output channels".to_string())?;
    let sequence_id = &first.source.sequence_id;

    if export
        .output_channels
        .iter()
        .any(|c| &c.source.sequence_id != sequence_id)
    {
        return Err("channels come from more than one sequence".to_string());
    }
    if let Some(channel) = export.output_channels.iter().find(|c| c.override_format.is_some()) {
        return Err(format!("'{}' has a format override", channel.output_name));
    }
    if let Some(mode) = &export.compression {
        return Err(format!("compression '{mode}' is requested"));
    }

    let sequence = project
        .sequence(sequence_id)
        .ok_or_else(|| format!("sequence '{sequence_id}' is not loaded"))?;
    let probe = sequence
        .probe
        .as_ref()
        .ok_or_else(|| format!("sequence '{sequence_id}' has not been probed"))?;
    let [subimage] = probe.subimages.as_slice() else {
        return Err(format!(
            "sequence '{sequence_id}' has {} subimages",
            probe.subimages.len()
        ));
    };

    let same_channels = subimage.channels.len() == export.output_channels.len()
        && subimage
            .channels
            .iter()
            .zip(&export.output_channels)
            .all(|(source, out)| {
                out.source.subimage_index == 0
                    && out.source.channel_name == source.name
                    && out.output_name == source.name
            });
    if !same_channels {
        return Err("output channels differ from the source's".to_string());
    }

    let output_pattern = SequencePathPattern::parse(&export.filename_pattern)
        .map_err(|e| e.to_string())?;
    if extension(output_pattern.suffix()) != extension(sequence.pattern.suffix()) {
        return Err("output file type differs from the source's".to_string());
    }

    let same_attributes = export.output_attributes.len() == subimage.attributes.len()
        && export.output_attributes.iter().all(|attr| {
            attr.provenance != AttributeProvenance::UserOverride
                && !attr.is_modified_since_import()
                && subimage
                    .attributes
                    .get(&attr.name)
                    .is_some_and(|source| source.same_value_as(attr))
        });
    if !same_attributes {
        return Err("output attributes differ from the source's".to_string());
    }

    Ok(sequence_id.clone())
}

fn extension(suffix: &str) -> Option<String> {
    suffix
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Group the recipe's sources for each resolved frame. Channels from the
/// same sequence, source frame and subimage share one read.
pub fn build_frame_plans(project: &Project, alignment: &AlignmentPlan) -> SeqmixResult<Vec<FramePlan>> {
    let export = &project.export;
    let pattern = SequencePathPattern::parse(&export.filename_pattern)
        .map_err(|e| SeqmixError::export(e.to_string()))?;

    let mut plans = Vec::with_capacity(alignment.frames.len());
    for resolved in &alignment.frames {
        let mut plan = FramePlan {
            output_frame: resolved.output_frame,
            output_path: export.output_dir.join(pattern.format(resolved.output_frame)),
            reads: Vec::new(),
            placements: Vec::new(),
            missing: Vec::new(),
            copy_from: None,
        };

        for channel in &export.output_channels {
            let source = &channel.source;
            let sequence = project.sequence(&source.sequence_id).ok_or_else(|| {
                SeqmixError::export(format!("sequence '{}' is not loaded", source.sequence_id))
            })?;

            let Some(frame) = resolved.source(&sequence.id).frame() else {
                plan.missing.push(channel.output_name.clone());
                continue;
            };

            let read = match plan.reads.iter().position(|r| {
                r.sequence_id == sequence.id
                    && r.source_frame == frame
                    && r.subimage_index == source.subimage_index
            }) {
                Some(index) => index,
                None => {
                    plan.reads.push(SourceRead {
                        sequence_id: sequence.id.clone(),
                        source_frame: frame,
                        path: sequence.frame_path(frame),
                        subimage_index: source.subimage_index,
                        channels: Vec::new(),
                    });
                    plan.reads.len() - 1
                }
            };

            let channels = &mut plan.reads[read].channels;
            if !channels.contains(&source.channel_name) {
                channels.push(source.channel_name.clone());
            }

            plan.placements.push(ChannelPlacement {
                output_name: channel.output_name.clone(),
                read,
                source_channel: source.channel_name.clone(),
                override_format: channel.override_format.clone(),
            });
        }

        plans.push(plan);
    }

    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqmix_project_model::{
        AttributeSpec, AttributeValue, ChannelSourceRef, ChannelSpec, FileProbe, ImageGeometry,
        SequenceSpec, SubImageProbe,
    };
    use std::path::Path;

    fn project(policy: FrameRangePolicy, a: Vec<u64>, b: Vec<u64>) -> Project {
        let mut project = Project::new("plan");
        project
            .add_sequence(SequenceSpec::new(
                "beauty",
                SequencePathPattern::parse("beauty.%04d.exr").unwrap(),
                "/in",
                a,
            ))
            .unwrap();
        project
            .add_sequence(SequenceSpec::new(
                "depth",
                SequencePathPattern::parse("depth.####.exr").unwrap(),
                "/in",
                b,
            ))
            .unwrap();
        for (seq, chan, name) in [
            ("depth", "Z", "Z"),
            ("beauty", "R", "R"),
            ("beauty", "G", "G"),
            ("beauty", "R", "R.copy"),
        ] {
            project
                .add_output_channel(ChannelSourceRef::new(seq, chan), name)
                .unwrap();
        }
        project.export.output_dir = PathBuf::from("/out");
        project.export.filename_pattern = "comp.%03d.exr".to_string();
        project.export.frame_policy = Some(policy);
        project
    }

    #[test]
    fn test_reads_are_grouped_per_source_file() {
        let job = build_export_job(&project(
            FrameRangePolicy::StopAtShortest,
            vec![1, 2],
            vec![1, 2],
        ))
        .unwrap();

        assert_eq!(job.total_frames(), 2);
        let frame = &job.frames[0];
        assert_eq!(frame.output_path, Path::new("/out/comp.001.exr"));
        assert_eq!(frame.reads.len(), 2);
        assert_eq!(frame.reads[0].path, Path::new("/in/depth.0001.exr"));
        assert_eq!(frame.reads[1].channels, vec!["R", "G"]);

        let names: Vec<_> = frame.placements.iter().map(|p| p.output_name.as_str()).collect();
        assert_eq!(names, vec!["Z", "R", "G", "R.copy"]);
        assert_eq!(frame.placements[3].read, 1);
    }

    #[test]
    fn test_held_frames_read_the_prior_file() {
        let job = build_export_job(&project(FrameRangePolicy::HoldLast, vec![1, 2, 3], vec![1]))
            .unwrap();
        let last = &job.frames[2];
        assert_eq!(last.output_frame, 3);
        assert_eq!(last.reads[0].path, Path::new("/in/depth.0001.exr"));
        assert_eq!(last.reads[1].path, Path::new("/in/beauty.0003.exr"));
        assert!(!last.is_partial());
    }

    #[test]
    fn test_partial_frames_list_missing_channels() {
        let job = build_export_job(&project(
            FrameRangePolicy::ProcessAvailable,
            vec![1],
            vec![2],
        ))
        .unwrap();
        assert_eq!(job.frames[0].missing, vec!["Z"]);
        assert_eq!(job.frames[1].missing, vec!["R", "G", "R.copy"]);
        assert_eq!(job.frames[1].placements.len(), 1);
    }

    fn plate() -> Project {
        let mut project = Project::new("plate");
        let mut seq = SequenceSpec::new(
            "plate",
            SequencePathPattern::parse("plate.%04d.EXR").unwrap(),
            "/in",
            vec![1, 2],
        );
        let mut attributes = AttributeSet::new();
        attributes
            .insert(AttributeSpec {
                provenance: AttributeProvenance::Input {
                    sequence_id: "plate".to_string(),
                    subimage_index: 0,
                },
                ..AttributeSpec::string("owner", "fx")
            })
            .unwrap();
        seq.probe = Some(FileProbe {
            path: PathBuf::from("/in/plate.0001.EXR"),
            subimages: vec![SubImageProbe {
                geometry: ImageGeometry {
                    width: 4,
                    height: 2,
                },
                channels: ["R", "G"]
                    .iter()
                    .map(|name| ChannelSpec {
                        name: name.to_string(),
                        format: ChannelFormat::new("half"),
                        subimage_index: 0,
                    })
                    .collect(),
                attributes,
            }],
        });
        project.add_sequence(seq).unwrap();
        for chan in ["R", "G"] {
            project
                .add_output_channel(ChannelSourceRef::new("plate", chan), chan)
                .unwrap();
        }
        project.import_attributes("plate", 0, &[]).unwrap();
        project.export.output_dir = PathBuf::from("/out");
        project.export.filename_pattern = "comp.%04d.exr".to_string();
        project.export.frame_policy = Some(FrameRangePolicy::StopAtShortest);
        project
    }

    #[test]
    fn test_unchanged_plate_is_copied_from_its_frames() {
        let job = build_export_job(&plate()).unwrap();
        assert_eq!(
            job.direct_copy,
            DirectCopy::Eligible {
                sequence_id: "plate".to_string()
            }
        );
        assert_eq!(
            job.frames[1].copy_from.as_deref(),
            Some(Path::new("/in/plate.0002.EXR"))
        );
    }

    #[test]
    fn test_any_change_requires_recombining() {
        let edits: Vec<fn(&mut Project)> = vec![
            |p: &mut Project| p.export.compression_policy = CompressionPolicy::Always,
            |p: &mut Project| p.export.compression = Some("zip".to_string()),
            |p: &mut Project| p.export.filename_pattern = "comp.%04d.png".to_string(),
            |p: &mut Project| p.export.output_channels[1].output_name = "green".to_string(),
            |p: &mut Project| p.export.output_channels.swap(0, 1),
            |p: &mut Project| p.export.output_channels.truncate(1),
            |p: &mut Project| p.export.output_channels[0].override_format = Some(ChannelFormat::new("float")),
            |p: &mut Project| {
                p.export.output_attributes.remove("owner");
            },
            |p: &mut Project| {
                p.export
                    .output_attributes
                    .set_value("owner", AttributeValue::String("comp".into()))
                    .unwrap();
            },
        ];
        for edit in edits {
            let mut project = plate();
            edit(&mut project);
            let job = build_export_job(&project).unwrap();
            assert!(!job.direct_copy.is_eligible(), "{:?}", job.direct_copy);
            assert!(job.frames.iter().all(|f| f.copy_from.is_none()));
        }

        let mut unprobed = plate();
        unprobed.sequences[0].probe = None;
        assert!(direct_copy_source(&unprobed).is_err());
    }

    #[test]
    fn test_job_requires_policy() {
        let mut p = project(FrameRangePolicy::HoldLast, vec![1], vec![1]);
        p.export.frame_policy = None;
        assert!(build_export_job(&p).is_err());
    }
}
