//! Seqmix Processing Core
//!
//! The decisions made before any pixel moves:
//! - **Discovery:** group a directory listing into frame sequences
//! - **Probe:** normalize what a store reports into the project model
//! - **Alignment:** resolve output frames under a frame range policy
//! - **Validation:** check a recipe and report structured issues
//!
//! Everything here is computation over data, except discovery's directory
//! listing and the store call made while probing.

pub mod alignment;
pub mod discovery;
pub mod probe;
pub mod validation;

pub use alignment::{
    determine_mode, resolve_alignment, AlignmentInput, AlignmentPlan, DroppedFrame, ModeDecision,
    ResolvedFrame, SourceFrame,
};
pub use discovery::{
    discover_frames, discover_sequences, group_filenames, DiscoveredSequence, DiscoveryError,
    DiscoveryOptions, DiscoveryReport,
};
pub use probe::{normalize_probe, probe_sequence};
pub use validation::{
    export_permitted, recipe_alignment_inputs, validate, IssueCode, Severity, ValidationContext,
    ValidationIssue,
};
