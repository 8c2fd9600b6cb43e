//! Time reconstruction from the device's periodic sample counter.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClockState {
    Uninitialized,
    Running { last_raw: i64, elapsed: f64 },
}

/// Result of feeding one tick to the clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    /// Elapsed seconds to append to the time axis
    pub elapsed: f64,
    /// Counter steps since the previous tick (0 for the first tick)
    pub delta_counts: i64,
    /// Whether this tick established the time base
    pub is_first: bool,
}

/// Converts raw counter values into monotonically accumulated seconds.
#[derive(Debug, Clone)]
pub struct DeviceClock {
    seconds_per_count: f64,
    state: ClockState,
    started_at: Option<DateTime<Utc>>,
}

impl DeviceClock {
    pub fn new(seconds_per_count: f64) -> Self {
        Self {
            seconds_per_count,
            state: ClockState::Uninitialized,
            started_at: None,
        }
    }

    /// Feed a tick using the current wall clock as the run start.
    pub fn tick(&mut self, raw: i64) -> ClockTick {
        self.tick_at(raw, Utc::now())
    }

    /// Feed a tick; `now` is recorded as the run start on the first tick.
    ///
    /// A negative delta is accepted as-is; callers decide how to flag it.
    pub fn tick_at(&mut self, raw: i64, now: DateTime<Utc>) -> ClockTick {
        match self.state {
            ClockState::Uninitialized => {
                self.state = ClockState::Running {
                    last_raw: raw,
                    elapsed: 0.0,
                };
                self.started_at = Some(now);
                ClockTick {
                    elapsed: 0.0,
                    delta_counts: 0,
                    is_first: true,
                }
            }
            ClockState::Running { last_raw, elapsed } => {
                let delta_counts = raw.saturating_sub(last_raw);
                let elapsed = elapsed + delta_counts as f64 * self.seconds_per_count;
                self.state = ClockState::Running {
                    last_raw: raw,
                    elapsed,
                };
                ClockTick {
                    elapsed,
                    delta_counts,
                    is_first: false,
                }
            }
        }
    }

    /// Timestamp of a beat reported at raw counter `raw`, relative to the
    /// latest tick. `None` before the time base exists.
    pub fn beat_time(&self, raw: i64) -> Option<f64> {
        match self.state {
            ClockState::Uninitialized => None,
            ClockState::Running { last_raw, elapsed } => {
                Some(elapsed + raw.saturating_sub(last_raw) as f64 * self.seconds_per_count)
            }
        }
    }

    /// Apply a device counter reset notice by shifting the baseline.
    ///
    /// Already reconstructed times are left untouched. Returns `false` when
    /// there is no baseline yet.
    pub fn apply_reset(&mut self, offset: i64) -> bool {
        match &mut self.state {
            ClockState::Uninitialized => false,
            ClockState::Running { last_raw, .. } => {
                *last_raw = last_raw.saturating_sub(offset);
                true
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ClockState::Running { .. })
    }

    pub fn elapsed(&self) -> Option<f64> {
        match self.state {
            ClockState::Uninitialized => None,
            ClockState::Running { elapsed, .. } => Some(elapsed),
        }
    }

    pub fn last_raw(&self) -> Option<i64> {
        match self.state {
            ClockState::Uninitialized => None,
            ClockState::Running { last_raw, .. } => Some(last_raw),
        }
    }

    /// Wall-clock time of the first tick.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn seconds_per_count(&self) -> f64 {
        self.seconds_per_count
    }
}
