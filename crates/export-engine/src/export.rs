//! Export orchestration.
//!
//! One run at a time, on a dedicated worker thread. The worker reports
//! through a single ordered event queue; the caller drains it and collects
//! the run with [`ExportOrchestrator::finish`].

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;

use seqmix_common::error::SeqmixError;
use seqmix_image_store::{ChannelPlane, ImageStore, OutputImageSpec, PixelBuffer, RawChannel, StoreError};
use seqmix_processing_core::{export_permitted, validate, ValidationContext, ValidationIssue};
use seqmix_project_model::{FrameIndex, Project};

use crate::plan::{build_export_job, DirectCopy, ExportJob, FramePlan};

/// Run state. Terminal states return to `Idle` on [`ExportOrchestrator::finish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Transcript line severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Stable code, e.g. `frame_written`.
    pub code: &'static str,
    pub message: String,
}

/// Export progress report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Output frame just processed.
    pub frame: FrameIndex,
    /// Frames processed so far, written or skipped.
    pub completed: usize,
    pub total: usize,
    /// Current progress [0.0, 1.0].
    pub fraction: f64,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub state: ExportState,
    pub written: Vec<FrameIndex>,
    /// Written frames produced by copying their source file.
    pub copied: Vec<FrameIndex>,
    pub skipped: Vec<SkippedFrame>,
    /// Frames the alignment policy could not resolve.
    pub dropped: Vec<FrameIndex>,
    /// Last frame processed before a cancel was observed.
    pub cancelled_after: Option<FrameIndex>,
    /// Explanation for `Failed`.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFrame {
    pub frame: FrameIndex,
    pub reason: String,
}

/// Events from the worker, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Log(LogLine),
    Progress(ExportProgress),
    FrameWritten { frame: FrameIndex, path: PathBuf },
    FrameSkipped(SkippedFrame),
    MissingChannels { frame: FrameIndex, channels: Vec<String> },
    Finished(ExportSummary),
}

/// Reasons a run could not start.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("an export is {state}; collect it before starting another")]
    NotIdle { state: ExportState },

    #[error("export blocked by {error_count} validation error(s)")]
    Blocked {
        error_count: usize,
        issues: Vec<ValidationIssue>,
    },

    #[error("failed to plan export: {0}")]
    Plan(#[from] SeqmixError),

    #[error("failed to start export worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Drives one export run at a time.
pub struct ExportOrchestrator {
    store: Arc<dyn ImageStore>,
    state: Arc<Mutex<ExportState>>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<ExportSummary>>,
}

enum FrameFailure {
    /// Affects only this frame.
    Frame(String),
    /// Would repeat on every frame.
    Setup(String),
}

impl ExportState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportState::Idle => "IDLE",
            ExportState::Running => "RUNNING",
            ExportState::Completed => "COMPLETED",
            ExportState::Cancelled => "CANCELLED",
            ExportState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportState::Completed | ExportState::Cancelled | ExportState::Failed
        )
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => f.write_str("INFO"),
            LogLevel::Warning => f.write_str("WARNING"),
            LogLevel::Error => f.write_str("ERROR"),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.level,
            self.code,
            self.message
        )
    }
}

impl FrameFailure {
    fn from_store(err: StoreError) -> Self {
        if err.is_setup_failure() {
            FrameFailure::Setup(err.to_string())
        } else {
            FrameFailure::Frame(err.to_string())
        }
    }
}

impl ExportOrchestrator {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(ExportState::Idle)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> ExportState {
        *lock_state(&self.state)
    }

    /// Request a stop at the next frame boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// The cancel flag, for wiring to signals or callbacks. It stays valid
    /// across runs.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Validate `project` again, snapshot it, and start the worker.
    pub fn start(&mut self, project: &Project) -> Result<Receiver<ExportEvent>, ExportError> {
        let state = self.state();
        if state != ExportState::Idle {
            return Err(ExportError::NotIdle { state });
        }

        let modes = self.store.supported_compression_modes();
        let formats = self.store.conversion_formats();
        let issues = validate(
            &ValidationContext::new(project)
                .with_compression_modes(&modes)
                .with_conversion_formats(&formats),
        );
        if !export_permitted(&issues) {
            let error_count = issues.iter().filter(|i| i.is_error()).count();
            tracing::warn!(errors = error_count, "Export refused by validation");
            return Err(ExportError::Blocked {
                error_count,
                issues,
            });
        }

        let job = build_export_job(project)?;
        let (tx, rx) = mpsc::channel();

        self.cancel.store(false, Ordering::SeqCst);
        *lock_state(&self.state) = ExportState::Running;

        let store = Arc::clone(&self.store);
        let shared_state = Arc::clone(&self.state);
        let cancel = Arc::clone(&self.cancel);

        let spawned = std::thread::Builder::new()
            .name("seqmix-export".to_string())
            .spawn(move || {
                let summary = run_export(&job, store.as_ref(), &cancel, &EventSink { tx: tx.clone() });
                *lock_state(&shared_state) = summary.state;
                let _ = tx.send(ExportEvent::Finished(summary.clone()));
                summary
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(rx)
            }
            Err(err) => {
                *lock_state(&self.state) = ExportState::Idle;
                Err(ExportError::Spawn(err))
            }
        }
    }

    /// Wait for the worker, return its summary and go back to `Idle`.
    ///
    /// Blocks while the run is still going. Returns `None` when no run was
    /// started.
    pub fn finish(&mut self) -> Option<ExportSummary> {
        let handle = self.worker.take()?;
        let summary = handle.join().unwrap_or_else(|_| {
            tracing::error!("Export worker panicked");
            ExportSummary {
                state: ExportState::Failed,
                written: Vec::new(),
                copied: Vec::new(),
                skipped: Vec::new(),
                dropped: Vec::new(),
                cancelled_after: None,
                failure: Some("export worker panicked".to_string()),
            }
        });
        *lock_state(&self.state) = ExportState::Idle;
        Some(summary)
    }
}

fn lock_state(state: &Mutex<ExportState>) -> MutexGuard<'_, ExportState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct EventSink {
    tx: Sender<ExportEvent>,
}

impl EventSink {
    fn send(&self, event: ExportEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(event);
    }

    fn log(&self, level: LogLevel, code: &'static str, message: String) {
        match level {
            LogLevel::Info => tracing::info!(code, "{message}"),
            LogLevel::Warning => tracing::warn!(code, "{message}"),
            LogLevel::Error => tracing::error!(code, "{message}"),
        }
        self.send(ExportEvent::Log(LogLine {
            timestamp: Utc::now(),
            level,
            code,
            message,
        }));
    }
}

fn run_export(
    job: &ExportJob,
    store: &dyn ImageStore,
    cancel: &AtomicBool,
    events: &EventSink,
) -> ExportSummary {
    let total = job.total_frames();
    let mut summary = ExportSummary {
        state: ExportState::Running,
        written: Vec::new(),
        copied: Vec::new(),
        skipped: Vec::new(),
        dropped: job.dropped.iter().map(|d| d.output_frame).collect(),
        cancelled_after: None,
        failure: None,
    };

    events.log(
        LogLevel::Info,
        "export_started",
        format!(
            "exporting {total} frame(s) to {} with {} by {} via {}",
            job.output_dir.display(),
            job.policy,
            job.mode,
            store.name()
        ),
    );
    if let Some(reason) = &job.fallback_reason {
        events.log(LogLevel::Warning, "alignment_fallback", reason.clone());
    }

    let mut copying = match &job.direct_copy {
        DirectCopy::Eligible { .. } if !store.supports_direct_copy() => {
            events.log(
                LogLevel::Info,
                "export_mode",
                format!("recombining: store '{}' cannot copy files", store.name()),
            );
            false
        }
        DirectCopy::Eligible { sequence_id } => {
            events.log(
                LogLevel::Info,
                "export_mode",
                format!("copying frames of '{sequence_id}' without recompression"),
            );
            true
        }
        DirectCopy::Ineligible { reason } => {
            events.log(LogLevel::Info, "export_mode", format!("recombining: {reason}"));
            false
        }
    };
    for dropped in &job.dropped {
        events.log(
            LogLevel::Warning,
            "frame_unresolved",
            format!(
                "frame {} dropped: no source in {}",
                dropped.output_frame,
                dropped.missing.join(", ")
            ),
        );
    }

    if let Err(err) = std::fs::create_dir_all(&job.output_dir) {
        let message = format!(
            "cannot create output directory {}: {err}",
            job.output_dir.display()
        );
        events.log(LogLevel::Error, "export_failed", message.clone());
        summary.state = ExportState::Failed;
        summary.failure = Some(message);
        return summary;
    }

    let mut last_processed = None;
    for (index, frame) in job.frames.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        if frame.is_partial() {
            events.send(ExportEvent::MissingChannels {
                frame: frame.output_frame,
                channels: frame.missing.clone(),
            });
            events.log(
                LogLevel::Warning,
                "missing_channels",
                format!(
                    "frame {} written without {}",
                    frame.output_frame,
                    frame.missing.join(", ")
                ),
            );
        }

        let outcome = match frame.copy_from.as_deref().filter(|_| copying) {
            Some(source) => match store.copy_file(source, &frame.output_path) {
                Ok(()) => {
                    summary.copied.push(frame.output_frame);
                    Ok(())
                }
                Err(err) => {
                    events.log(
                        LogLevel::Warning,
                        "direct_copy_fallback",
                        format!(
                            "copying frame {} failed ({err}); recombining from here on",
                            frame.output_frame
                        ),
                    );
                    copying = false;
                    export_frame(store, job, frame)
                }
            },
            None => export_frame(store, job, frame),
        };

        match outcome {
            Ok(()) => {
                summary.written.push(frame.output_frame);
                events.send(ExportEvent::FrameWritten {
                    frame: frame.output_frame,
                    path: frame.output_path.clone(),
                });
                events.log(
                    LogLevel::Info,
                    "frame_written",
                    format!("frame {} -> {}", frame.output_frame, frame.output_path.display()),
                );
            }
            Err(FrameFailure::Frame(reason)) => {
                events.log(
                    LogLevel::Warning,
                    "frame_skipped",
                    format!("frame {} skipped: {reason}", frame.output_frame),
                );
                let skipped = SkippedFrame {
                    frame: frame.output_frame,
                    reason,
                };
                events.send(ExportEvent::FrameSkipped(skipped.clone()));
                summary.skipped.push(skipped);
            }
            Err(FrameFailure::Setup(reason)) => {
                events.log(
                    LogLevel::Error,
                    "export_failed",
                    format!("stopping at frame {}: {reason}", frame.output_frame),
                );
                summary.state = ExportState::Failed;
                summary.failure = Some(reason);
                return summary;
            }
        }

        last_processed = Some(frame.output_frame);
        let completed = index + 1;
        events.send(ExportEvent::Progress(ExportProgress {
            frame: frame.output_frame,
            completed,
            total,
            fraction: completed as f64 / total as f64,
        }));
    }

    if cancel.load(Ordering::SeqCst) {
        summary.state = ExportState::Cancelled;
        summary.cancelled_after = last_processed;
        let point = match last_processed {
            Some(frame) => format!("after frame {frame}"),
            None => "before the first frame".to_string(),
        };
        events.log(
            LogLevel::Warning,
            "export_cancelled",
            format!(
                "cancelled {point}; {} frame(s) already written are kept",
                summary.written.len()
            ),
        );
        return summary;
    }

    summary.state = ExportState::Completed;
    events.log(
        LogLevel::Info,
        "export_completed",
        format!(
            "{} written, {} skipped, {} dropped",
            summary.written.len(),
            summary.skipped.len(),
            summary.dropped.len()
        ),
    );
    summary
}

/// Read, assemble and write one frame.
fn export_frame(store: &dyn ImageStore, job: &ExportJob, frame: &FramePlan) -> Result<(), FrameFailure> {
    let mut sources = Vec::with_capacity(frame.reads.len());
    for read in &frame.reads {
        // Source files differ per frame, so any read failure is local.
        let buffer = store
            .read_channels(&read.path, read.subimage_index, &read.channels)
            .map_err(|e| FrameFailure::Frame(e.to_string()))?;
        sources.push(buffer);
    }

    let (width, height) = sources
        .first()
        .map(|b| (b.width, b.height))
        .ok_or_else(|| FrameFailure::Frame("no sources to read".to_string()))?;
    let mut output = PixelBuffer::new(width, height);

    for placement in &frame.placements {
        let source = &sources[placement.read];
        if (source.width, source.height) != (width, height) {
            return Err(FrameFailure::Frame(format!(
                "{} is {}x{}, expected {width}x{height}",
                frame.reads[placement.read].path.display(),
                source.width,
                source.height
            )));
        }
        let plane = source.plane(&placement.source_channel).ok_or_else(|| {
            FrameFailure::Frame(format!(
                "{} returned no channel '{}'",
                frame.reads[placement.read].path.display(),
                placement.source_channel
            ))
        })?;

        let samples = match &placement.override_format {
            Some(format) => plane
                .samples
                .convert_to(format)
                .map_err(FrameFailure::from_store)?,
            None => plane.samples.clone(),
        };
        output
            .push_plane(ChannelPlane::new(placement.output_name.clone(), samples))
            .map_err(|e| FrameFailure::Frame(e.to_string()))?;
    }

    let spec = OutputImageSpec {
        width,
        height,
        channels: output
            .planes
            .iter()
            .map(|p| RawChannel {
                name: p.name.clone(),
                format: p.format.clone(),
            })
            .collect(),
        compression: job.compression.clone(),
    };

    store
        .write(&frame.output_path, &spec, &job.attributes, &output)
        .map_err(FrameFailure::from_store)
}
