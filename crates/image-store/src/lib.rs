//! Seqmix image store.
//!
//! The [`ImageStore`] trait is the only way the rest of the workspace touches
//! pixel files. It reports what a file contains, reads named channels as
//! typed planes, and writes a frame with exactly the channels, formats and
//! attributes it is given.
//!
//! Two implementations ship here:
//! - [`FsImageStore`]: PNG and TIFF through the `image` crate, with channel
//!   names and attributes kept in a JSON sidecar next to each file
//! - [`MemoryImageStore`]: an in-process store with failure injection

pub mod buffer;
pub mod error;
pub mod fs;
pub mod memory;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use seqmix_project_model::{
    AttributeSet, AttributeSpec, AttributeType, AttributeValue, ChannelFormat,
};

pub use buffer::{ChannelPlane, PixelBuffer, Samples};
pub use error::{StoreError, StoreResult};
pub use fs::FsImageStore;
pub use memory::{MemoryImage, MemoryImageStore, WrittenImage};

/// Attribute payload exactly as the store reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawAttributeValue {
    Int(i64),
    Float(f64),
    String(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    /// A type the store can only render as text.
    Other(String),
}

/// One attribute from a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAttribute {
    pub name: String,

    /// Store-specific type name (e.g. `v3f`, `chromaticities`).
    pub type_name: String,

    pub value: RawAttributeValue,

    /// Whether the store can write this attribute back unchanged.
    pub settable: bool,
}

/// One channel from a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChannel {
    pub name: String,
    pub format: ChannelFormat,
}

/// One subimage from a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSubimage {
    pub width: u32,
    pub height: u32,
    pub channels: Vec<RawChannel>,
    pub attributes: Vec<RawAttribute>,
}

/// Everything a probe found in a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProbe {
    pub subimages: Vec<RawSubimage>,
}

/// Layout of a frame to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImageSpec {
    pub width: u32,
    pub height: u32,

    /// Channel names and formats, in file order.
    pub channels: Vec<RawChannel>,

    /// Compression selector passed through verbatim. `None` is the store's
    /// default.
    pub compression: Option<String>,
}

/// Image I/O capability.
pub trait ImageStore: Send + Sync {
    /// Describe the subimages, channels and attributes of a file without
    /// reading its pixels.
    fn probe(&self, path: &Path) -> StoreResult<RawProbe>;

    /// Read the named channels of one subimage, in the order requested.
    fn read_channels(
        &self,
        path: &Path,
        subimage: usize,
        channels: &[String],
    ) -> StoreResult<PixelBuffer>;

    /// Write one single-subimage frame.
    fn write(
        &self,
        path: &Path,
        spec: &OutputImageSpec,
        attributes: &AttributeSet,
        pixels: &PixelBuffer,
    ) -> StoreResult<()>;

    /// Compression selectors accepted by [`ImageStore::write`].
    fn supported_compression_modes(&self) -> BTreeSet<String>;

    /// Channel formats an explicit override may name.
    fn conversion_formats(&self) -> BTreeSet<String> {
        buffer::format::ALL.iter().map(|f| f.to_string()).collect()
    }

    /// Whether [`ImageStore::copy_file`] can reproduce a file unchanged.
    fn supports_direct_copy(&self) -> bool {
        false
    }

    /// Copy `source` to `dest` byte for byte, names and attributes included.
    fn copy_file(&self, source: &Path, dest: &Path) -> StoreResult<()> {
        let _ = (source, dest);
        Err(StoreError::unsupported(format!(
            "store '{}' cannot copy files directly",
            self.name()
        )))
    }

    /// Store name for logs.
    fn name(&self) -> &str;
}

impl From<&AttributeSpec> for RawAttribute {
    fn from(attr: &AttributeSpec) -> Self {
        let value = match &attr.value {
            AttributeValue::Int(v) => RawAttributeValue::Int(*v),
            AttributeValue::Float(v) => RawAttributeValue::Float(*v),
            AttributeValue::String(v) => RawAttributeValue::String(v.clone()),
            AttributeValue::IntArray(v) => RawAttributeValue::IntList(v.clone()),
            AttributeValue::FloatArray(v) => RawAttributeValue::FloatList(v.clone()),
            AttributeValue::Opaque(v) => RawAttributeValue::Other(v.clone()),
        };
        let type_name = match &attr.type_tag {
            AttributeType::Opaque { type_name } => type_name.clone(),
            other => other.to_string(),
        };
        Self {
            name: attr.name.clone(),
            type_name,
            value,
            settable: attr.editable && attr.type_tag.is_settable(),
        }
    }
}

impl OutputImageSpec {
    /// Check that `pixels` matches this layout plane for plane.
    pub fn check_pixels(&self, pixels: &PixelBuffer) -> StoreResult<()> {
        if pixels.width != self.width || pixels.height != self.height {
            return Err(StoreError::unsupported(format!(
                "pixel data is {}x{}, spec is {}x{}",
                pixels.width, pixels.height, self.width, self.height
            )));
        }
        if pixels.planes.len() != self.channels.len() {
            return Err(StoreError::unsupported(format!(
                "pixel data has {} channels, spec has {}",
                pixels.planes.len(),
                self.channels.len()
            )));
        }
        for (plane, channel) in pixels.planes.iter().zip(&self.channels) {
            if plane.name != channel.name || plane.samples.format_tag() != channel.format.as_str()
            {
                return Err(StoreError::unsupported(format!(
                    "plane '{}' ({}) does not match spec channel '{}' ({})",
                    plane.name,
                    plane.samples.format_tag(),
                    channel.name,
                    channel.format
                )));
            }
        }
        Ok(())
    }

    /// Reject a compression selector the store does not list.
    pub fn check_compression(&self, supported: &BTreeSet<String>) -> StoreResult<()> {
        match &self.compression {
            Some(mode) if !supported.contains(mode) => Err(StoreError::unsupported(format!(
                "compression '{mode}' is not supported"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> OutputImageSpec {
        OutputImageSpec {
            width: 2,
            height: 1,
            channels: vec![RawChannel {
                name: "Y".to_string(),
                format: ChannelFormat::new("uint8"),
            }],
            compression: Some("best".to_string()),
        }
    }

    #[test]
    fn test_check_pixels_matches_names_and_formats() {
        let mut pixels = PixelBuffer::new(2, 1);
        pixels
            .push_plane(ChannelPlane::new("Y", Samples::U8(vec![1, 2])))
            .unwrap();
        spec().check_pixels(&pixels).unwrap();

        let mut wrong = PixelBuffer::new(2, 1);
        wrong
            .push_plane(ChannelPlane::new("Y", Samples::U16(vec![1, 2])))
            .unwrap();
        assert!(spec().check_pixels(&wrong).is_err());
    }

    #[test]
    fn test_check_compression() {
        let supported: BTreeSet<String> = ["default", "best"].iter().map(|s| s.to_string()).collect();
        spec().check_compression(&supported).unwrap();
        let mut other = spec();
        other.compression = Some("dwaa".to_string());
        assert!(other.check_compression(&supported).is_err());
        other.compression = None;
        other.check_compression(&supported).unwrap();
    }

    #[test]
    fn test_raw_attribute_json_shape() {
        let attr = RawAttribute {
            name: "worldToCamera".to_string(),
            type_name: "m44f".to_string(),
            value: RawAttributeValue::FloatList(vec![1.0; 16]),
            settable: true,
        };
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["value"]["kind"], "float_list");
        let back: RawAttribute = serde_json::from_value(json).unwrap();
        assert_eq!(back, attr);
    }
}
