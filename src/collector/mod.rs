//! Transport adapters and the line decoder.
//!
//! This module turns raw transport lines into decoded [`Sample`]s. The
//! physical transport itself sits behind the [`LineSource`] trait.

pub mod decoder;
pub mod source;
pub mod types;

#[cfg(feature = "serial")]
pub mod serial;

// Re-export commonly used types
pub use decoder::{decode_line, DecodeError};
pub use source::{ChannelSource, LineSource, ReaderSource, TransportError};
pub use types::{ReadOutcome, Sample};

#[cfg(feature = "serial")]
pub use serial::SerialSource;
