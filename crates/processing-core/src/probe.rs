//! Probe normalization.
//!
//! Turns what an image store reports into the project model. Attribute
//! values the store can only render as text become opaque, read-only
//! attributes instead of being dropped.

use std::path::Path;

use seqmix_common::error::{SeqmixError, SeqmixResult};
use seqmix_image_store::{ImageStore, RawAttribute, RawAttributeValue, RawProbe};
use seqmix_project_model::{
    AttributeProvenance, AttributeSet, AttributeSpec, AttributeType, AttributeValue, ChannelSpec,
    FileProbe, ImageGeometry, NumericKind, SequenceSpec, SubImageProbe,
};

/// Convert a raw probe of `path` into the project model.
pub fn normalize_probe(sequence_id: &str, path: &Path, raw: &RawProbe) -> FileProbe {
    let subimages = raw
        .subimages
        .iter()
        .enumerate()
        .map(|(index, sub)| {
            let channels = sub
                .channels
                .iter()
                .map(|c| ChannelSpec {
                    name: c.name.clone(),
                    format: c.format.clone(),
                    subimage_index: index,
                })
                .collect();

            let mut attributes = AttributeSet::new();
            for raw_attr in &sub.attributes {
                let attr = normalize_attribute(sequence_id, index, raw_attr);
                if let Err(err) = attributes.insert(attr) {
                    tracing::warn!(
                        path = %path.display(),
                        subimage = index,
                        error = %err,
                        "Store reported the same attribute twice; keeping the first"
                    );
                }
            }

            SubImageProbe {
                geometry: ImageGeometry {
                    width: sub.width,
                    height: sub.height,
                },
                channels,
                attributes,
            }
        })
        .collect();

    FileProbe {
        path: path.to_path_buf(),
        subimages,
    }
}

fn normalize_attribute(sequence_id: &str, subimage: usize, raw: &RawAttribute) -> AttributeSpec {
    let (type_tag, value) = match &raw.value {
        RawAttributeValue::Int(v) => (AttributeType::Int, AttributeValue::Int(*v)),
        RawAttributeValue::Float(v) => (AttributeType::Float, AttributeValue::Float(*v)),
        RawAttributeValue::String(v) => (AttributeType::String, AttributeValue::String(v.clone())),
        RawAttributeValue::IntList(v) => (
            AttributeType::NumericArray {
                element: NumericKind::Int,
                len: v.len(),
            },
            AttributeValue::IntArray(v.clone()),
        ),
        RawAttributeValue::FloatList(v) => (
            AttributeType::NumericArray {
                element: NumericKind::Float,
                len: v.len(),
            },
            AttributeValue::FloatArray(v.clone()),
        ),
        RawAttributeValue::Other(text) => (
            AttributeType::Opaque {
                type_name: raw.type_name.clone(),
            },
            AttributeValue::Opaque(text.clone()),
        ),
    };

    let editable = raw.settable && type_tag.is_settable();
    AttributeSpec {
        name: raw.name.clone(),
        type_tag,
        value,
        provenance: AttributeProvenance::Input {
            sequence_id: sequence_id.to_string(),
            subimage_index: subimage,
        },
        editable,
        imported_value: None,
    }
}

/// Probe the representative frame of `sequence` and cache the result on it.
pub fn probe_sequence(store: &dyn ImageStore, sequence: &mut SequenceSpec) -> SeqmixResult<()> {
    let path = sequence.representative_frame().ok_or_else(|| {
        SeqmixError::discovery(format!("sequence '{}' has no frames", sequence.id))
    })?;

    let raw = store
        .probe(&path)
        .map_err(|e| SeqmixError::image_store(e.to_string()))?;
    let probe = normalize_probe(&sequence.id, &path, &raw);

    tracing::debug!(
        sequence = %sequence.id,
        path = %path.display(),
        subimages = probe.subimages.len(),
        channels = probe.channel_count(),
        "Probed sequence"
    );
    sequence.probe = Some(probe);
    Ok(())
}
