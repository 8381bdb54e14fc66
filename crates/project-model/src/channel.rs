//! Channel descriptions and output channel mapping.
//!
//! Channel names are opaque: a name like `diffuse.R` is never split into a
//! layer and a component. Formats are whatever tag the image store reports
//! for a channel and are compared verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric pixel type tag exactly as reported by the image store
/// (e.g. `half`, `float`, `uint32`). Never inferred.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelFormat(String);

impl ChannelFormat {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelFormat {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One channel of a probed source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Channel name as stored in the file.
    pub name: String,

    /// Pixel type tag reported by the image store.
    pub format: ChannelFormat,

    /// Subimage (part) the channel belongs to.
    pub subimage_index: usize,
}

/// Reference to a channel of a loaded sequence.
///
/// Not ownership: it must resolve against a live sequence at validation
/// and export time or it is dangling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelSourceRef {
    pub sequence_id: String,
    pub channel_name: String,
    #[serde(default)]
    pub subimage_index: usize,
}

impl ChannelSourceRef {
    pub fn new(sequence_id: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            channel_name: channel_name.into(),
            subimage_index: 0,
        }
    }

    pub fn in_subimage(mut self, subimage_index: usize) -> Self {
        self.subimage_index = subimage_index;
        self
    }
}

impl fmt::Display for ChannelSourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subimage_index == 0 {
            write!(f, "{}:{}", self.sequence_id, self.channel_name)
        } else {
            write!(
                f,
                "{}:{}@{}",
                self.sequence_id, self.channel_name, self.subimage_index
            )
        }
    }
}

/// A channel of the output image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChannel {
    /// Name written to the output file; unique within the recipe.
    pub output_name: String,

    /// Where the pixel data comes from.
    pub source: ChannelSourceRef,

    /// Explicitly requested output format. `None` keeps the source format;
    /// a mismatch without an override is a validation error, never a cast.
    #[serde(default)]
    pub override_format: Option<ChannelFormat>,
}

impl OutputChannel {
    pub fn new(output_name: impl Into<String>, source: ChannelSourceRef) -> Self {
        Self {
            output_name: output_name.into(),
            source,
            override_format: None,
        }
    }

    /// Format written for this channel given its source's reported format.
    pub fn effective_format<'a>(&'a self, source_format: &'a ChannelFormat) -> &'a ChannelFormat {
        self.override_format.as_ref().unwrap_or(source_format)
    }
}
