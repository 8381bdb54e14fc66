//! In-process image store.
//!
//! Files are registered up front and written frames are kept for
//! inspection. Reads, writes and copies can be made to fail per path, and
//! a hook runs after every successful write or copy.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use seqmix_project_model::{AttributeSet, ChannelFormat};

use crate::buffer::{ChannelPlane, PixelBuffer, Samples};
use crate::error::{StoreError, StoreResult};
use crate::{ImageStore, OutputImageSpec, RawAttribute, RawChannel, RawProbe, RawSubimage};

type WriteHook = Arc<dyn Fn(&Path) + Send + Sync>;

/// A registered file: one entry per subimage.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryImage {
    pub subimages: Vec<(RawSubimage, PixelBuffer)>,
}

/// A frame captured by [`MemoryImageStore::write`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenImage {
    pub spec: OutputImageSpec,
    pub attributes: AttributeSet,
    pub pixels: PixelBuffer,
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, MemoryImage>,
    written: BTreeMap<PathBuf, WrittenImage>,
    copied: BTreeMap<PathBuf, PathBuf>,
    write_order: Vec<PathBuf>,
    failing_reads: BTreeSet<PathBuf>,
    failing_writes: BTreeSet<PathBuf>,
    failing_copies: BTreeSet<PathBuf>,
    write_failure: Option<StoreError>,
}

/// In-memory [`ImageStore`].
pub struct MemoryImageStore {
    state: Mutex<MemoryState>,
    compression_modes: BTreeSet<String>,
    on_write: Mutex<Option<WriteHook>>,
}

impl MemoryImage {
    /// Single-subimage image with every sample of every channel set to
    /// `value`. Channels are `(name, format)` pairs; a format outside
    /// [`format::ALL`](crate::buffer::format::ALL) is refused.
    pub fn filled(
        width: u32,
        height: u32,
        channels: &[(&str, &str)],
        value: f32,
    ) -> StoreResult<Self> {
        let count = width as usize * height as usize;
        let mut pixels = PixelBuffer::new(width, height);
        let mut raw_channels = Vec::with_capacity(channels.len());

        for (name, tag) in channels {
            let format = ChannelFormat::new(*tag);
            let samples = Samples::filled(&format, count, value)?;
            raw_channels.push(RawChannel {
                name: name.to_string(),
                format: format.clone(),
            });
            pixels.planes.push(ChannelPlane {
                name: name.to_string(),
                format,
                samples,
            });
        }

        Ok(Self {
            subimages: vec![(
                RawSubimage {
                    width,
                    height,
                    channels: raw_channels,
                    attributes: Vec::new(),
                },
                pixels,
            )],
        })
    }

    /// Add an attribute to the last subimage.
    pub fn with_attribute(mut self, attribute: RawAttribute) -> Self {
        if let Some((raw, _)) = self.subimages.last_mut() {
            raw.attributes.push(attribute);
        }
        self
    }

    /// Append the subimages of `other`.
    pub fn with_subimages_of(mut self, other: MemoryImage) -> Self {
        self.subimages.extend(other.subimages);
        self
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryImageStore {
    /// Store accepting compression selectors `none` and `zip`.
    pub fn new() -> Self {
        Self::with_compression_modes(["none", "zip"])
    }

    pub fn with_compression_modes<I, S>(modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(MemoryState::default()),
            compression_modes: modes.into_iter().map(Into::into).collect(),
            on_write: Mutex::new(None),
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, image: MemoryImage) {
        self.lock().files.insert(path.into(), image);
    }

    /// Make every read of `path` fail.
    pub fn fail_reads_of(&self, path: impl Into<PathBuf>) {
        self.lock().failing_reads.insert(path.into());
    }

    /// Make every write to `path` fail.
    pub fn fail_writes_of(&self, path: impl Into<PathBuf>) {
        self.lock().failing_writes.insert(path.into());
    }

    /// Make every direct copy onto `dest` fail. Writes to it still succeed.
    pub fn fail_copies_of(&self, dest: impl Into<PathBuf>) {
        self.lock().failing_copies.insert(dest.into());
    }

    /// Make every write fail with `error`.
    pub fn fail_all_writes_with(&self, error: StoreError) {
        self.lock().write_failure = Some(error);
    }

    /// Run `hook` after each successful write, outside the store lock.
    pub fn set_on_write(&self, hook: impl Fn(&Path) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.on_write.lock() {
            *slot = Some(Arc::new(hook));
        }
    }

    /// Paths written or copied so far, in order.
    pub fn written_paths(&self) -> Vec<PathBuf> {
        self.lock().write_order.clone()
    }

    pub fn written(&self, path: &Path) -> Option<WrittenImage> {
        self.lock().written.get(path).cloned()
    }

    /// Source of a frame produced by [`ImageStore::copy_file`].
    pub fn copied_from(&self, dest: &Path) -> Option<PathBuf> {
        self.lock().copied.get(dest).cloned()
    }

    fn run_hook(&self, path: &Path) {
        let hook = self.on_write.lock().ok().and_then(|slot| slot.clone());
        if let Some(hook) = hook {
            hook(path);
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ImageStore for MemoryImageStore {
    fn probe(&self, path: &Path) -> StoreResult<RawProbe> {
        let state = self.lock();
        if state.failing_reads.contains(path) {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                message: "injected read failure".to_string(),
            });
        }
        let image = state.files.get(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_path_buf(),
        })?;
        Ok(RawProbe {
            subimages: image.subimages.iter().map(|(raw, _)| raw.clone()).collect(),
        })
    }

    fn read_channels(
        &self,
        path: &Path,
        subimage: usize,
        channels: &[String],
    ) -> StoreResult<PixelBuffer> {
        let state = self.lock();
        if state.failing_reads.contains(path) {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                message: "injected read failure".to_string(),
            });
        }
        let image = state.files.get(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_path_buf(),
        })?;
        let (_, pixels) = image
            .subimages
            .get(subimage)
            .ok_or_else(|| StoreError::Read {
                path: path.to_path_buf(),
                message: format!("no subimage {subimage}"),
            })?;

        let mut out = PixelBuffer::new(pixels.width, pixels.height);
        for name in channels {
            let plane = pixels
                .plane(name)
                .ok_or_else(|| StoreError::MissingChannel {
                    path: path.to_path_buf(),
                    subimage,
                    channel: name.clone(),
                })?;
            out.planes.push(plane.clone());
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
        spec.check_compression(&self.compression_modes)?;
        spec.check_pixels(pixels)?;

        {
            let mut state = self.lock();
            if let Some(error) = &state.write_failure {
                return Err(error.clone());
            }
            if state.failing_writes.contains(path) {
                return Err(StoreError::Write {
                    path: path.to_path_buf(),
                    message: "injected write failure".to_string(),
                });
            }
            state.written.insert(
                path.to_path_buf(),
                WrittenImage {
                    spec: spec.clone(),
                    attributes: attributes.clone(),
                    pixels: pixels.clone(),
                },
            );
            state.write_order.push(path.to_path_buf());
        }

        self.run_hook(path);
        Ok(())
    }

    fn supports_direct_copy(&self) -> bool {
        true
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> StoreResult<()> {
        {
            let mut state = self.lock();
            if state.failing_reads.contains(source) {
                return Err(StoreError::Read {
                    path: source.to_path_buf(),
                    message: "injected read failure".to_string(),
                });
            }
            if !state.files.contains_key(source) {
                return Err(StoreError::NotFound {
                    path: source.to_path_buf(),
                });
            }
            if let Some(error) = &state.write_failure {
                return Err(error.clone());
            }
            if state.failing_writes.contains(dest) || state.failing_copies.contains(dest) {
                return Err(StoreError::Write {
                    path: dest.to_path_buf(),
                    message: "injected copy failure".to_string(),
                });
            }
            state.copied.insert(dest.to_path_buf(), source.to_path_buf());
            state.write_order.push(dest.to_path_buf());
        }

        self.run_hook(dest);
        Ok(())
    }

    fn supported_compression_modes(&self) -> BTreeSet<String> {
        self.compression_modes.clone()
    }

    fn name(&self) -> &str {
        "memory"
    }
}
