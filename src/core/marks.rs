//! User-requested event markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user annotation of the current position in the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    /// 1-based label, in creation order
    pub number: usize,
    /// TimeAxis index current when the mark was requested
    pub tick_index: usize,
    /// Device time at `tick_index`
    pub time_secs: f64,
    /// Wall-clock seconds since the first tick
    pub wall_secs: f64,
    /// When the mark was requested
    pub created_at: DateTime<Utc>,
}

/// Ordered, append-only list of marks.
#[derive(Debug, Clone, Default)]
pub struct MarkLedger {
    marks: Vec<Mark>,
}

impl MarkLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        tick_index: usize,
        time_secs: f64,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Mark {
        let mark = Mark {
            number: self.marks.len() + 1,
            tick_index,
            time_secs,
            wall_secs: (now - started_at).num_milliseconds() as f64 / 1000.0,
            created_at: now,
        };
        self.marks.push(mark.clone());
        mark
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn as_slice(&self) -> &[Mark] {
        &self.marks
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }
}
