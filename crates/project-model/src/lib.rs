//! Seqmix Project Model
//!
//! Data contracts for recombining image sequences:
//! - **Patterns and sequences:** filename templates with one frame field and
//!   the frames discovered for them
//! - **Channels and attributes:** what a probe reports per subimage, and the
//!   closed attribute value model with explicit merge conflicts
//! - **Recipe:** output channels, output attributes and export settings,
//!   plus the edit operations on them
//! - **Project:** the explicit context object, persisted as versioned JSON
//!
//! Nothing in this crate converts a value implicitly. Mismatches are left in
//! place for validation to report.

pub mod attribute;
pub mod channel;
pub mod export_spec;
pub mod pattern;
pub mod probe;
pub mod project;
pub mod recipe;
pub mod sequence;

pub use attribute::*;
pub use channel::*;
pub use export_spec::*;
pub use pattern::*;
pub use probe::*;
pub use project::*;
pub use recipe::*;
pub use sequence::*;
