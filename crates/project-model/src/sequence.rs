//! Image sequences loaded into a project.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::pattern::{FrameIndex, SequencePathPattern};
use crate::probe::FileProbe;

/// A set of same-pattern files, one per frame number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSpec {
    /// Unique identifier within the project.
    pub id: String,

    /// Label shown to the user.
    pub display_name: String,

    pub pattern: SequencePathPattern,

    /// Absolute directory holding the frames.
    pub source_dir: PathBuf,

    /// Ascending, unique frame numbers.
    #[serde(deserialize_with = "deserialize_frames")]
    frames: Vec<FrameIndex>,

    /// False when the frame list is positional rather than real frame
    /// numbers. Such a sequence forces index alignment.
    #[serde(default = "default_true")]
    pub frame_numbers_known: bool,

    /// Probe of the representative frame. Not persisted; refreshed on load.
    #[serde(skip)]
    pub probe: Option<FileProbe>,
}

fn default_true() -> bool {
    true
}

fn deserialize_frames<'de, D>(deserializer: D) -> Result<Vec<FrameIndex>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let mut frames = Vec::<FrameIndex>::deserialize(deserializer)?;
    frames.sort_unstable();
    frames.dedup();
    Ok(frames)
}

impl SequenceSpec {
    pub fn new(
        id: impl Into<String>,
        pattern: SequencePathPattern,
        source_dir: impl Into<PathBuf>,
        frames: Vec<FrameIndex>,
    ) -> Self {
        let id = id.into();
        let mut spec = Self {
            display_name: id.clone(),
            id,
            pattern,
            source_dir: source_dir.into(),
            frames: Vec::new(),
            frame_numbers_known: true,
            probe: None,
        };
        spec.set_frames(frames);
        spec
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn frames(&self) -> &[FrameIndex] {
        &self.frames
    }

    /// Replace the frame list; sorted and deduplicated here.
    pub fn set_frames(&mut self, mut frames: Vec<FrameIndex>) {
        frames.sort_unstable();
        frames.dedup();
        self.frames = frames;
    }

    pub fn has_frame(&self, frame: FrameIndex) -> bool {
        self.frames.binary_search(&frame).is_ok()
    }

    pub fn first_frame(&self) -> Option<FrameIndex> {
        self.frames.first().copied()
    }

    pub fn last_frame(&self) -> Option<FrameIndex> {
        self.frames.last().copied()
    }

    /// Absolute path of a frame's file.
    pub fn frame_path(&self, frame: FrameIndex) -> PathBuf {
        self.source_dir.join(self.pattern.format(frame))
    }

    /// File used for probing: the first frame.
    pub fn representative_frame(&self) -> Option<PathBuf> {
        self.first_frame().map(|f| self.frame_path(f))
    }
}
