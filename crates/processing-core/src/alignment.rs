//! Frame alignment across sequences.
//!
//! Every sequence contributes a list of keys: its frame numbers when aligning
//! by frame number, or its zero-based positions when aligning by index. The
//! policy decides which keys become output frames and how a sequence that
//! lacks a key is filled. Output frames are always ascending.

use std::collections::{BTreeMap, BTreeSet};

use seqmix_project_model::{AlignmentMode, FrameIndex, FrameRange, FrameRangePolicy, SequenceSpec};

/// One sequence's frame list as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentInput {
    pub sequence_id: String,
    /// Ascending, unique.
    pub frames: Vec<FrameIndex>,
    /// False when `frames` are not real frame numbers.
    pub frame_numbers_known: bool,
}

/// Which frame of a sequence feeds an output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFrame {
    Exact(FrameIndex),
    /// Closest prior frame, substituted under HOLD_LAST.
    Held(FrameIndex),
    Unavailable,
}

/// An output frame and its per-sequence sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub output_frame: FrameIndex,
    pub sources: BTreeMap<String, SourceFrame>,
}

/// An output frame that could not be resolved under the active policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFrame {
    pub output_frame: FrameIndex,
    /// Sequences without a usable source frame.
    pub missing: Vec<String>,
}

/// Alignment mode actually used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDecision {
    pub mode: AlignmentMode,
    /// Set when frame-number alignment was wanted but not possible.
    pub fallback_reason: Option<String>,
}

/// Resolver output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentPlan {
    pub mode: AlignmentMode,
    pub policy: FrameRangePolicy,
    pub fallback_reason: Option<String>,
    pub frames: Vec<ResolvedFrame>,
    pub dropped: Vec<DroppedFrame>,
}

impl AlignmentInput {
    pub fn new(sequence_id: impl Into<String>, frames: Vec<FrameIndex>) -> Self {
        let mut frames = frames;
        frames.sort_unstable();
        frames.dedup();
        Self {
            sequence_id: sequence_id.into(),
            frames,
            frame_numbers_known: true,
        }
    }

    pub fn from_sequence(sequence: &SequenceSpec) -> Self {
        Self {
            sequence_id: sequence.id.clone(),
            frames: sequence.frames().to_vec(),
            frame_numbers_known: sequence.frame_numbers_known,
        }
    }

    /// Keys used for matching, mapped to the real frame numbers.
    fn keyed(&self, mode: AlignmentMode) -> BTreeMap<FrameIndex, FrameIndex> {
        match mode {
            AlignmentMode::ByFrameNumber => self.frames.iter().map(|f| (*f, *f)).collect(),
            AlignmentMode::ByIndex => self
                .frames
                .iter()
                .enumerate()
                .map(|(i, f)| (i as FrameIndex, *f))
                .collect(),
        }
    }
}

impl SourceFrame {
    pub fn frame(self) -> Option<FrameIndex> {
        match self {
            SourceFrame::Exact(f) | SourceFrame::Held(f) => Some(f),
            SourceFrame::Unavailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        self.frame().is_some()
    }
}

impl ResolvedFrame {
    pub fn source(&self, sequence_id: &str) -> SourceFrame {
        self.sources
            .get(sequence_id)
            .copied()
            .unwrap_or(SourceFrame::Unavailable)
    }

    /// Sequences with no source at this frame.
    pub fn unavailable(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, s)| !s.is_available())
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl AlignmentPlan {
    pub fn output_frames(&self) -> Vec<FrameIndex> {
        self.frames.iter().map(|f| f.output_frame).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Choose the alignment mode. A sequence without real frame numbers forces
/// index alignment.
pub fn determine_mode(inputs: &[AlignmentInput], requested: Option<AlignmentMode>) -> ModeDecision {
    if requested == Some(AlignmentMode::ByIndex) {
        return ModeDecision {
            mode: AlignmentMode::ByIndex,
            fallback_reason: None,
        };
    }

    let unknown: Vec<&str> = inputs
        .iter()
        .filter(|i| !i.frame_numbers_known)
        .map(|i| i.sequence_id.as_str())
        .collect();

    if unknown.is_empty() {
        ModeDecision {
            mode: AlignmentMode::ByFrameNumber,
            fallback_reason: None,
        }
    } else {
        ModeDecision {
            mode: AlignmentMode::ByIndex,
            fallback_reason: Some(format!(
                "sequence(s) {} have no frame numbers; aligning by index",
                unknown.join(", ")
            )),
        }
    }
}

/// Resolve the output frame list for `inputs` under `policy`.
///
/// `range`, when set, restricts the output frames after alignment.
pub fn resolve_alignment(
    inputs: &[AlignmentInput],
    policy: FrameRangePolicy,
    requested: Option<AlignmentMode>,
    range: Option<FrameRange>,
) -> AlignmentPlan {
    let decision = determine_mode(inputs, requested);
    let keyed: Vec<(&str, BTreeMap<FrameIndex, FrameIndex>)> = inputs
        .iter()
        .map(|i| (i.sequence_id.as_str(), i.keyed(decision.mode)))
        .collect();

    // Every policy starts from the union; keys a policy cannot fill end up
    // in `dropped` with the sequences that lack them.
    let output_keys: BTreeSet<FrameIndex> = keyed
        .iter()
        .flat_map(|(_, keys)| keys.keys().copied())
        .collect();

    let mut frames = Vec::new();
    let mut dropped = Vec::new();

    for key in output_keys {
        if range.is_some_and(|r| !r.contains(key)) {
            continue;
        }

        let sources: BTreeMap<String, SourceFrame> = keyed
            .iter()
            .map(|(id, keys)| (id.to_string(), pick_source(keys, key, policy)))
            .collect();
        let resolved = ResolvedFrame {
            output_frame: key,
            sources,
        };

        let missing: Vec<String> = resolved
            .unavailable()
            .into_iter()
            .map(str::to_string)
            .collect();

        if !missing.is_empty() && !policy.allows_partial_frames() {
            tracing::debug!(
                frame = key,
                policy = %policy,
                missing = ?missing,
                "Dropping unresolvable output frame"
            );
            dropped.push(DroppedFrame {
                output_frame: key,
                missing,
            });
        } else {
            frames.push(resolved);
        }
    }

    AlignmentPlan {
        mode: decision.mode,
        policy,
        fallback_reason: decision.fallback_reason,
        frames,
        dropped,
    }
}

fn pick_source(
    keys: &BTreeMap<FrameIndex, FrameIndex>,
    key: FrameIndex,
    policy: FrameRangePolicy,
) -> SourceFrame {
    if let Some(frame) = keys.get(&key) {
        return SourceFrame::Exact(*frame);
    }
    if policy == FrameRangePolicy::HoldLast {
        if let Some((_, frame)) = keys.range(..key).next_back() {
            return SourceFrame::Held(*frame);
        }
    }
    SourceFrame::Unavailable
}
