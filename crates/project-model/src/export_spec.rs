//! Export recipe settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeSet;
use crate::channel::OutputChannel;
use crate::pattern::FrameIndex;

/// Rule for reconciling differing per-sequence frame lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameRangePolicy {
    /// Only frames every sequence has.
    StopAtShortest,
    /// Union of frames; gaps filled with each sequence's closest prior frame.
    HoldLast,
    /// Union of frames; absent channels are left out and reported.
    ProcessAvailable,
}

/// How frames of different sequences are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlignmentMode {
    ByFrameNumber,
    ByIndex,
}

/// Whether an untouched single-source recipe may be written as a file copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionPolicy {
    /// Copy source files when re-encoding would not change them.
    #[default]
    Skip,
    /// Always decode and re-encode.
    Always,
}

/// Error for an unknown policy or mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{name}'")]
pub struct UnknownNameError {
    pub kind: &'static str,
    pub name: String,
}

impl FrameRangePolicy {
    pub const ALL: [FrameRangePolicy; 3] = [
        FrameRangePolicy::StopAtShortest,
        FrameRangePolicy::HoldLast,
        FrameRangePolicy::ProcessAvailable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FrameRangePolicy::StopAtShortest => "STOP_AT_SHORTEST",
            FrameRangePolicy::HoldLast => "HOLD_LAST",
            FrameRangePolicy::ProcessAvailable => "PROCESS_AVAILABLE",
        }
    }

    /// Whether frames may be written with some channels absent.
    pub fn allows_partial_frames(self) -> bool {
        matches!(self, FrameRangePolicy::ProcessAvailable)
    }
}

impl fmt::Display for FrameRangePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameRangePolicy {
    type Err = UnknownNameError;

    /// Accepts `HOLD_LAST`, `hold_last` and `hold-last`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| UnknownNameError {
                kind: "frame policy",
                name: s.to_string(),
            })
    }
}

impl AlignmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AlignmentMode::ByFrameNumber => "BY_FRAME_NUMBER",
            AlignmentMode::ByIndex => "BY_INDEX",
        }
    }
}

impl fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignmentMode {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").to_ascii_uppercase().as_str() {
            "BY_FRAME_NUMBER" => Ok(AlignmentMode::ByFrameNumber),
            "BY_INDEX" => Ok(AlignmentMode::ByIndex),
            _ => Err(UnknownNameError {
                kind: "alignment mode",
                name: s.to_string(),
            }),
        }
    }
}

impl CompressionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionPolicy::Skip => "skip",
            CompressionPolicy::Always => "always",
        }
    }
}

impl fmt::Display for CompressionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionPolicy {
    type Err = UnknownNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(CompressionPolicy::Skip),
            "always" => Ok(CompressionPolicy::Always),
            _ => Err(UnknownNameError {
                kind: "compression policy",
                name: s.to_string(),
            }),
        }
    }
}

/// Inclusive output frame window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: FrameIndex,
    pub end: FrameIndex,
}

impl FrameRange {
    pub fn new(start: FrameIndex, end: FrameIndex) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, frame: FrameIndex) -> bool {
        self.start <= frame && frame <= self.end
    }
}

/// Everything needed to write the output sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSpec {
    /// Destination directory; created at export start if missing.
    pub output_dir: PathBuf,

    /// Output filename template. Kept as written so that a template
    /// without a frame field can be reported instead of rejected on load.
    pub filename_pattern: String,

    /// Must be chosen before export.
    #[serde(default)]
    pub frame_policy: Option<FrameRangePolicy>,

    /// Requested alignment. `None` picks frame-number alignment when every
    /// sequence has real frame numbers.
    #[serde(default)]
    pub alignment: Option<AlignmentMode>,

    /// Opaque compression selector passed verbatim to the image store.
    /// `None` uses the store's default.
    #[serde(default)]
    pub compression: Option<String>,

    /// Re-encoding rule for recipes that reproduce one source unchanged.
    #[serde(default)]
    pub compression_policy: CompressionPolicy,

    /// The complete attribute set written to every output frame.
    #[serde(default)]
    pub output_attributes: AttributeSet,

    /// Output channels in file order.
    #[serde(default)]
    pub output_channels: Vec<OutputChannel>,

    /// Optional restriction of the output frames.
    #[serde(default)]
    pub frame_range: Option<FrameRange>,
}

impl Default for ExportSpec {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::new(),
            filename_pattern: "output.%04d.exr".to_string(),
            frame_policy: None,
            alignment: None,
            compression: None,
            compression_policy: CompressionPolicy::Skip,
            output_attributes: AttributeSet::new(),
            output_channels: Vec::new(),
            frame_range: None,
        }
    }
}

impl ExportSpec {
    pub fn output_channel(&self, name: &str) -> Option<&OutputChannel> {
        self.output_channels.iter().find(|c| c.output_name == name)
    }

    pub(crate) fn output_channel_mut(&mut self, name: &str) -> Option<&mut OutputChannel> {
        self.output_channels
            .iter_mut()
            .find(|c| c.output_name == name)
    }
}
