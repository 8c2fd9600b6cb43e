//! Wire-level types shared by the transport adapters and the decoder.

use serde::{Deserialize, Serialize};

/// One decoded `<tag><integer>` line.
///
/// Samples are ephemeral: produced by the decoder and consumed by the session
/// within a single ingestion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// First character of the line
    pub tag: char,
    /// Integer payload following the tag
    pub value: i64,
}

impl Sample {
    pub fn new(tag: char, value: i64) -> Self {
        Self { tag, value }
    }
}

/// Result of a single read attempt on a line transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line (line terminator may still be attached)
    Line(String),
    /// The transport's read timeout elapsed without data
    Idle,
    /// The transport was closed by the peer or reached end of input
    Closed,
}
