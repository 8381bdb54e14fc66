//! Normalized probe of a sequence's representative frame.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeSet;
use crate::channel::ChannelSpec;

/// Pixel dimensions of a subimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for ImageGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Channels and attributes of one subimage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubImageProbe {
    pub geometry: ImageGeometry,
    pub channels: Vec<ChannelSpec>,
    pub attributes: AttributeSet,
}

/// Probe of one file: every subimage it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProbe {
    /// File the probe was taken from.
    pub path: PathBuf,
    pub subimages: Vec<SubImageProbe>,
}

impl FileProbe {
    pub fn subimage(&self, index: usize) -> Option<&SubImageProbe> {
        self.subimages.get(index)
    }

    /// Channel `name` of subimage `subimage`.
    pub fn channel(&self, subimage: usize, name: &str) -> Option<&ChannelSpec> {
        self.subimage(subimage)?
            .channels
            .iter()
            .find(|c| c.name == name)
    }

    pub fn geometry(&self, subimage: usize) -> Option<ImageGeometry> {
        self.subimage(subimage).map(|s| s.geometry)
    }

    pub fn channel_count(&self) -> usize {
        self.subimages.iter().map(|s| s.channels.len()).sum()
    }
}
