//! Filesystem image store on top of the `image` crate.
//!
//! PNG and TIFF carry at most four channels and no free-form metadata, so
//! every file written here gets a `<file>.seqmix.json` sidecar holding the
//! channel names and the attribute set. Probes prefer the sidecar names
//! when the channel count agrees with the decoded image.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::{ColorType, DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder};
use serde::{Deserialize, Serialize};

use seqmix_project_model::{AttributeSet, ChannelFormat};

use crate::buffer::{format, ChannelPlane, PixelBuffer, Samples};
use crate::error::{StoreError, StoreResult};
use crate::{ImageStore, OutputImageSpec, RawAttribute, RawChannel, RawProbe, RawSubimage};

/// Suffix appended to an image path to name its sidecar.
pub const SIDECAR_SUFFIX: &str = ".seqmix.json";

const COMPRESSION_MODES: [&str; 3] = ["default", "fast", "best"];

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    channels: Vec<String>,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Png,
    Tiff,
}

/// [`ImageStore`] over PNG and TIFF files.
#[derive(Debug, Default, Clone)]
pub struct FsImageStore;

impl FsImageStore {
    pub fn new() -> Self {
        Self
    }
}

/// Sidecar path for an image path.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

impl ImageStore for FsImageStore {
    fn probe(&self, path: &Path) -> StoreResult<RawProbe> {
        ensure_exists(path)?;

        let decoder = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| read_error(path, e))?
            .into_decoder()
            .map_err(|e| read_error(path, e))?;
        let (width, height) = decoder.dimensions();
        let (count, tag) = layout_of(decoder.color_type()).ok_or_else(|| StoreError::Read {
            path: path.to_path_buf(),
            message: format!("unsupported pixel layout {:?}", decoder.color_type()),
        })?;

        let sidecar = read_sidecar(path)?;
        let names = channel_names(count, sidecar.as_ref());
        let channels = names
            .into_iter()
            .map(|name| RawChannel {
                name,
                format: ChannelFormat::new(tag),
            })
            .collect();

        Ok(RawProbe {
            subimages: vec![RawSubimage {
                width,
                height,
                channels,
                attributes: sidecar.map(|s| s.attributes).unwrap_or_default(),
            }],
        })
    }

    fn read_channels(
        &self,
        path: &Path,
        subimage: usize,
        channels: &[String],
    ) -> StoreResult<PixelBuffer> {
        ensure_exists(path)?;
        if subimage != 0 {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                message: format!("no subimage {subimage}"),
            });
        }

        let image = image::open(path).map_err(|e| read_error(path, e))?;
        let (width, height) = (image.width(), image.height());
        let planes = decode_planes(path, image)?;
        let sidecar = read_sidecar(path)?;
        let names = channel_names(planes.len(), sidecar.as_ref());

        let mut decoded: Vec<(String, Samples)> = names.into_iter().zip(planes).collect();
        let mut out = PixelBuffer::new(width, height);
        for wanted in channels {
            let index = decoded
                .iter()
                .position(|(name, _)| name == wanted)
                .ok_or_else(|| StoreError::MissingChannel {
                    path: path.to_path_buf(),
                    subimage,
                    channel: wanted.clone(),
                })?;
            let (name, samples) = decoded.remove(index);
            out.push_plane(ChannelPlane::new(name, samples))?;
        }
        Ok(out)
    }

    fn write(
        &self,
        path: &Path,
        spec: &OutputImageSpec,
        attributes: &AttributeSet,
        pixels: &PixelBuffer,
    ) -> StoreResult<()> {
        spec.check_compression(&self.supported_compression_modes())?;
        spec.check_pixels(pixels)?;

        let container = container_of(path)?;
        let color = color_for(container, &spec.channels)?;
        if container == Container::Tiff && spec.compression.as_deref().unwrap_or("default") != "default" {
            return Err(StoreError::unsupported(
                "TIFF output only supports the default compression",
            ));
        }
        let bytes = interleave(pixels)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(StoreError::OutputUnavailable {
                    path: parent.to_path_buf(),
                    message: "directory does not exist".to_string(),
                });
            }
        }

        let file = File::create(path).map_err(|e| create_error(path, e))?;
        let writer = BufWriter::new(file);
        let encoded = match container {
            Container::Png => PngEncoder::new_with_quality(
                writer,
                png_compression(spec.compression.as_deref()),
                FilterType::Adaptive,
            )
            .write_image(&bytes, spec.width, spec.height, color),
            Container::Tiff => {
                TiffEncoder::new(writer).write_image(&bytes, spec.width, spec.height, color)
            }
        };
        encoded.map_err(|e| StoreError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let sidecar = Sidecar {
            channels: spec.channels.iter().map(|c| c.name.clone()).collect(),
            attributes: attributes.iter().map(RawAttribute::from).collect(),
        };
        let json = serde_json::to_vec_pretty(&sidecar).map_err(|e| StoreError::Write {
            path: sidecar_path(path),
            message: e.to_string(),
        })?;
        std::fs::write(sidecar_path(path), json).map_err(|e| create_error(&sidecar_path(path), e))?;

        tracing::debug!(path = %path.display(), channels = spec.channels.len(), "Wrote frame");
        Ok(())
    }

    fn supports_direct_copy(&self) -> bool {
        true
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> StoreResult<()> {
        ensure_exists(source)?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(StoreError::OutputUnavailable {
                    path: parent.to_path_buf(),
                    message: "directory does not exist".to_string(),
                });
            }
        }

        std::fs::copy(source, dest).map_err(|e| create_error(dest, e))?;
        let (from, to) = (sidecar_path(source), sidecar_path(dest));
        if from.is_file() {
            std::fs::copy(&from, &to).map_err(|e| create_error(&to, e))?;
        } else if to.is_file() {
            // A stale sidecar would rename the copied channels.
            std::fs::remove_file(&to).map_err(|e| create_error(&to, e))?;
        }

        tracing::debug!(source = %source.display(), dest = %dest.display(), "Copied frame");
        Ok(())
    }

    fn supported_compression_modes(&self) -> BTreeSet<String> {
        COMPRESSION_MODES.iter().map(|m| m.to_string()).collect()
    }

    fn name(&self) -> &str {
        "fs"
    }
}

fn ensure_exists(path: &Path) -> StoreResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StoreError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn create_error(path: &Path, e: std::io::Error) -> StoreError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::NotFound => {
            StoreError::OutputUnavailable {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        }
        _ => StoreError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    }
}

fn read_sidecar(path: &Path) -> StoreResult<Option<Sidecar>> {
    let sidecar = sidecar_path(path);
    if !sidecar.is_file() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(&sidecar).map_err(|e| read_error(&sidecar, e))?;
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|e| read_error(&sidecar, e))
}

fn channel_names(count: usize, sidecar: Option<&Sidecar>) -> Vec<String> {
    if let Some(sidecar) = sidecar.filter(|s| s.channels.len() == count) {
        return sidecar.channels.clone();
    }
    let defaults: &[&str] = match count {
        1 => &["Y"],
        2 => &["Y", "A"],
        3 => &["R", "G", "B"],
        _ => &["R", "G", "B", "A"],
    };
    defaults.iter().take(count).map(|n| n.to_string()).collect()
}

fn layout_of(color: ColorType) -> Option<(usize, &'static str)> {
    let layout = match color {
        ColorType::L8 => (1, format::UINT8),
        ColorType::La8 => (2, format::UINT8),
        ColorType::Rgb8 => (3, format::UINT8),
        ColorType::Rgba8 => (4, format::UINT8),
        ColorType::L16 => (1, format::UINT16),
        ColorType::La16 => (2, format::UINT16),
        ColorType::Rgb16 => (3, format::UINT16),
        ColorType::Rgba16 => (4, format::UINT16),
        ColorType::Rgb32F => (3, format::FLOAT),
        ColorType::Rgba32F => (4, format::FLOAT),
        _ => return None,
    };
    Some(layout)
}

fn decode_planes(path: &Path, image: DynamicImage) -> StoreResult<Vec<Samples>> {
    let planes = match image {
        DynamicImage::ImageLuma8(b) => split(b.into_raw(), 1, Samples::U8),
        DynamicImage::ImageLumaA8(b) => split(b.into_raw(), 2, Samples::U8),
        DynamicImage::ImageRgb8(b) => split(b.into_raw(), 3, Samples::U8),
        DynamicImage::ImageRgba8(b) => split(b.into_raw(), 4, Samples::U8),
        DynamicImage::ImageLuma16(b) => split(b.into_raw(), 1, Samples::U16),
        DynamicImage::ImageLumaA16(b) => split(b.into_raw(), 2, Samples::U16),
        DynamicImage::ImageRgb16(b) => split(b.into_raw(), 3, Samples::U16),
        DynamicImage::ImageRgba16(b) => split(b.into_raw(), 4, Samples::U16),
        DynamicImage::ImageRgb32F(b) => split(b.into_raw(), 3, Samples::F32),
        DynamicImage::ImageRgba32F(b) => split(b.into_raw(), 4, Samples::F32),
        other => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                message: format!("unsupported pixel layout {:?}", other.color()),
            })
        }
    };
    Ok(planes)
}

fn split<T: Copy>(data: Vec<T>, channels: usize, wrap: fn(Vec<T>) -> Samples) -> Vec<Samples> {
    (0..channels)
        .map(|c| wrap(data.iter().skip(c).step_by(channels).copied().collect()))
        .collect()
}

fn container_of(path: &Path) -> StoreResult<Container> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => Ok(Container::Png),
        Some("tif") | Some("tiff") => Ok(Container::Tiff),
        other => Err(StoreError::unsupported(format!(
            "cannot write '{}' files",
            other.unwrap_or("")
        ))),
    }
}

fn color_for(container: Container, channels: &[RawChannel]) -> StoreResult<ExtendedColorType> {
    let tag = match channels.first() {
        Some(first) => first.format.as_str(),
        None => return Err(StoreError::unsupported("no channels to write")),
    };
    if channels.iter().any(|c| c.format.as_str() != tag) {
        return Err(StoreError::unsupported(
            "all channels of a PNG or TIFF frame must share one format",
        ));
    }

    let color = match (container, tag, channels.len()) {
        (_, format::UINT8, 1) => ColorType::L8,
        (Container::Png, format::UINT8, 2) => ColorType::La8,
        (_, format::UINT8, 3) => ColorType::Rgb8,
        (_, format::UINT8, 4) => ColorType::Rgba8,
        (_, format::UINT16, 1) => ColorType::L16,
        (Container::Png, format::UINT16, 2) => ColorType::La16,
        (_, format::UINT16, 3) => ColorType::Rgb16,
        (_, format::UINT16, 4) => ColorType::Rgba16,
        (Container::Tiff, format::FLOAT, 3) => ColorType::Rgb32F,
        (Container::Tiff, format::FLOAT, 4) => ColorType::Rgba32F,
        (container, tag, count) => {
            return Err(StoreError::unsupported(format!(
                "{count} {tag} channel(s) cannot be written as {container:?}"
            )))
        }
    };
    Ok(color.into())
}

fn interleave(pixels: &PixelBuffer) -> StoreResult<Vec<u8>> {
    let count = pixels.pixel_count();
    if let Some(plane) = pixels.planes.iter().find(|p| p.samples.len() != count) {
        return Err(StoreError::unsupported(format!(
            "channel '{}' has {} samples, expected {count}",
            plane.name,
            plane.samples.len()
        )));
    }

    let mut out = Vec::with_capacity(count * pixels.planes.len() * 4);
    for i in 0..count {
        for plane in &pixels.planes {
            match &plane.samples {
                Samples::U8(v) => out.push(v[i]),
                Samples::U16(v) => out.extend_from_slice(&v[i].to_ne_bytes()),
                Samples::F32(v) => out.extend_from_slice(&v[i].to_ne_bytes()),
                Samples::U32(_) | Samples::F16(_) => {
                    return Err(StoreError::unsupported(format!(
                        "{} samples cannot be encoded",
                        plane.samples.format_tag()
                    )))
                }
            }
        }
    }
    Ok(out)
}

fn png_compression(mode: Option<&str>) -> CompressionType {
    match mode {
        Some("fast") => CompressionType::Fast,
        Some("best") => CompressionType::Best,
        _ => CompressionType::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqmix_project_model::AttributeSpec;

    fn rgba16_spec(names: [&str; 4]) -> OutputImageSpec {
        OutputImageSpec {
            width: 2,
            height: 1,
            channels: names
                .iter()
                .map(|n| RawChannel {
                    name: n.to_string(),
                    format: ChannelFormat::new(format::UINT16),
                })
                .collect(),
            compression: Some("best".to_string()),
        }
    }

    #[test]
    fn test_png_write_then_probe_and_read_keeps_names_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.0001.png");
        let store = FsImageStore::new();

        let names = ["diffuse.R", "diffuse.G", "diffuse.B", "mask"];
        let mut pixels = PixelBuffer::new(2, 1);
        for (i, name) in names.iter().enumerate() {
            pixels
                .push_plane(ChannelPlane::new(
                    *name,
                    Samples::U16(vec![i as u16 * 1000, 65535]),
                ))
                .unwrap();
        }
        let mut attributes = AttributeSet::new();
        attributes
            .insert(AttributeSpec::string("owner", "comp"))
            .unwrap();

        store
            .write(&path, &rgba16_spec(names), &attributes, &pixels)
            .unwrap();
        assert!(sidecar_path(&path).is_file());

        let probe = store.probe(&path).unwrap();
        let sub = &probe.subimages[0];
        assert_eq!((sub.width, sub.height), (2, 1));
        let probed: Vec<_> = sub.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(probed, names.to_vec());
        assert!(sub.channels.iter().all(|c| c.format.as_str() == "uint16"));
        assert_eq!(sub.attributes[0].name, "owner");

        let read = store
            .read_channels(&path, 0, &["mask".to_string(), "diffuse.G".to_string()])
            .unwrap();
        assert_eq!(read.planes[0].samples, Samples::U16(vec![3000, 65535]));
        assert_eq!(read.planes[1].samples, Samples::U16(vec![1000, 65535]));
    }

    #[test]
    fn test_png_without_sidecar_uses_default_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        let img = image::GrayImage::from_raw(2, 2, vec![0, 64, 128, 255]).unwrap();
        img.save(&path).unwrap();

        let probe = FsImageStore::new().probe(&path).unwrap();
        assert_eq!(probe.subimages[0].channels[0].name, "Y");
        assert_eq!(probe.subimages[0].channels[0].format.as_str(), "uint8");
        assert!(probe.subimages[0].attributes.is_empty());
    }

    #[test]
    fn test_write_rejects_what_the_container_cannot_hold() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new();
        let mut spec = OutputImageSpec {
            width: 1,
            height: 1,
            channels: vec![RawChannel {
                name: "Z".to_string(),
                format: ChannelFormat::new(format::FLOAT),
            }],
            compression: None,
        };
        let mut pixels = PixelBuffer::new(1, 1);
        pixels
            .push_plane(ChannelPlane::new("Z", Samples::F32(vec![1.0])))
            .unwrap();

        let err = store
            .write(&dir.path().join("z.png"), &spec, &AttributeSet::new(), &pixels)
            .unwrap_err();
        assert!(err.is_setup_failure());

        spec.compression = Some("dwaa".to_string());
        let err = store
            .write(&dir.path().join("z.tif"), &spec, &AttributeSet::new(), &pixels)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { .. }));
    }

    #[test]
    fn test_write_into_missing_directory_is_setup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("a.png");
        let spec = OutputImageSpec {
            width: 1,
            height: 1,
            channels: vec![RawChannel {
                name: "Y".to_string(),
                format: ChannelFormat::new(format::UINT8),
            }],
            compression: None,
        };
        let mut pixels = PixelBuffer::new(1, 1);
        pixels
            .push_plane(ChannelPlane::new("Y", Samples::U8(vec![1])))
            .unwrap();

        let err = FsImageStore::new()
            .write(&path, &spec, &AttributeSet::new(), &pixels)
            .unwrap_err();
        assert!(matches!(err, StoreError::OutputUnavailable { .. }));
    }

    #[test]
    fn test_copy_file_keeps_bytes_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new();
        let names = ["diffuse.R", "diffuse.G", "diffuse.B", "mask"];
        let mut pixels = PixelBuffer::new(2, 1);
        for (i, name) in names.iter().enumerate() {
            pixels
                .push_plane(ChannelPlane::new(*name, Samples::U16(vec![i as u16, 9])))
                .unwrap();
        }
        let source = dir.path().join("src.0001.png");
        store
            .write(&source, &rgba16_spec(names), &AttributeSet::new(), &pixels)
            .unwrap();

        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();
        let dest = out_dir.join("copy.0001.png");
        std::fs::write(sidecar_path(&dest), "stale").unwrap();
        store.copy_file(&source, &dest).unwrap();

        assert_eq!(std::fs::read(&source).unwrap(), std::fs::read(&dest).unwrap());
        let probe = store.probe(&dest).unwrap();
        let probed: Vec<_> = probe.subimages[0]
            .channels
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(probed, names.to_vec());

        let err = store
            .copy_file(&source, &dir.path().join("absent").join("a.png"))
            .unwrap_err();
        assert!(matches!(err, StoreError::OutputUnavailable { .. }));
        let err = store
            .copy_file(&dir.path().join("nope.png"), &out_dir.join("b.png"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsImageStore::new()
            .probe(&dir.path().join("nope.png"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
