//! Core ingestion engine.
//!
//! This module contains:
//! - The tag routing table and channel identities
//! - Time reconstruction from the device sample counter
//! - Drawable window maintenance
//! - Append-only channel storage with display limits
//! - The per-run session tying them together

pub mod channels;
pub mod clock;
pub mod marks;
pub mod session;
pub mod store;
pub mod windowing;

// Re-export commonly used types
pub use channels::{Channel, Effect, Tag, TagSpec, SENTINEL, TAG_TABLE};
pub use clock::{ClockTick, DeviceClock};
pub use marks::{Mark, MarkLedger};
pub use session::{
    AcquisitionSession, ClockAnomaly, DispatchOutcome, WindowEvent, FALLBACK_LIMITS,
    FALLBACK_SERIES, FALLBACK_VALUE,
};
pub use store::{AggregateStats, ChannelStore, ReadError};
pub use windowing::{DrawableWindow, WindowManager};
