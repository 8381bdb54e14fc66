//! Seqmix Export Engine
//!
//! Turns a validated recipe into written frames.
//!
//! # Pipeline
//!
//! ```text
//! recipe ── validate ── resolve alignment ── frame plans (snapshot)
//!                                                  │
//!                                       worker thread, per frame:
//!                                                  │
//!                 read grouped channels ── assemble in recipe order
//!                                                  │
//!                          convert on explicit override only
//!                                                  │
//!                         write with output attributes ── event queue
//! ```
//!
//! A recipe that reproduces one sequence unchanged copies each source file
//! instead, unless the compression policy is `always`. A failed copy falls
//! back to recombination for the rest of the run.

pub mod export;
pub mod plan;

pub use export::*;
pub use plan::{
    build_export_job, build_frame_plans, direct_copy_source, ChannelPlacement, DirectCopy,
    ExportJob, FramePlan, SourceRead,
};
