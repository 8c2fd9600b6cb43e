//! Transparency module for the acquisition engine.
//!
//! Tracks what the ingestion loop accepted, dropped or corrected, so that
//! silent fail-soft behavior remains auditable.

pub mod log;

// Re-export commonly used types
pub use log::{IngestStats, IngestStatsSnapshot};
