//! Seqmix Common Utilities
//!
//! Shared infrastructure for all seqmix crates:
//! - Error types and result aliases
//! - Tracing/logging initialization
//! - Configuration loading (persisted user defaults)

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
