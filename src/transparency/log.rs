//! Ingestion statistics.
//!
//! Every per-line failure the ingestion loop swallows is counted here so that
//! it stays observable without ever reaching the reader.

use crate::core::DispatchOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Atomic counters shared by the ingestion task and its readers.
#[derive(Debug)]
pub struct IngestStats {
    /// Lines delivered by the transport
    lines_read: AtomicU64,
    /// Samples that changed session state
    samples_applied: AtomicU64,
    /// Lines that failed to decode
    decode_failures: AtomicU64,
    /// Transport read errors
    transport_errors: AtomicU64,
    /// Reads that timed out without data
    idle_reads: AtomicU64,
    /// Tags outside the routing table
    unknown_tags: AtomicU64,
    /// Samples received before the first tick
    dropped_before_time_base: AtomicU64,
    /// Beat classifications with no beat to attach to
    orphan_beat_classes: AtomicU64,
    /// Device counter reset notices
    counter_resets: AtomicU64,
    /// Ticks with a negative counter delta
    clock_anomalies: AtomicU64,
    /// Samples arriving after the store was frozen
    writes_after_stop: AtomicU64,
    /// Reader requests answered with a fallback value
    fallback_reads: AtomicU64,
    /// When counting started
    since: RwLock<DateTime<Utc>>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            samples_applied: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            idle_reads: AtomicU64::new(0),
            unknown_tags: AtomicU64::new(0),
            dropped_before_time_base: AtomicU64::new(0),
            orphan_beat_classes: AtomicU64::new(0),
            counter_resets: AtomicU64::new(0),
            clock_anomalies: AtomicU64::new(0),
            writes_after_stop: AtomicU64::new(0),
            fallback_reads: AtomicU64::new(0),
            since: RwLock::new(Utc::now()),
        }
    }

    pub fn record_line(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle(&self) {
        self.idle_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_read(&self) {
        self.fallback_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Count the result of dispatching one decoded sample.
    pub fn record_outcome(&self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Applied => &self.samples_applied,
            DispatchOutcome::CounterReset => {
                self.samples_applied.fetch_add(1, Ordering::Relaxed);
                &self.counter_resets
            }
            DispatchOutcome::ClockAnomaly => {
                self.samples_applied.fetch_add(1, Ordering::Relaxed);
                &self.clock_anomalies
            }
            DispatchOutcome::UnknownTag => &self.unknown_tags,
            DispatchOutcome::BeforeTimeBase => &self.dropped_before_time_base,
            DispatchOutcome::OrphanBeatClass => &self.orphan_beat_classes,
            DispatchOutcome::Frozen => &self.writes_after_stop,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> IngestStatsSnapshot {
        let since = *self.since.read().unwrap_or_else(|e| e.into_inner());
        IngestStatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            samples_applied: self.samples_applied.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            idle_reads: self.idle_reads.load(Ordering::Relaxed),
            unknown_tags: self.unknown_tags.load(Ordering::Relaxed),
            dropped_before_time_base: self.dropped_before_time_base.load(Ordering::Relaxed),
            orphan_beat_classes: self.orphan_beat_classes.load(Ordering::Relaxed),
            counter_resets: self.counter_resets.load(Ordering::Relaxed),
            clock_anomalies: self.clock_anomalies.load(Ordering::Relaxed),
            writes_after_stop: self.writes_after_stop.load(Ordering::Relaxed),
            fallback_reads: self.fallback_reads.load(Ordering::Relaxed),
            since,
            duration_secs: (Utc::now() - since).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.lines_read,
            &self.samples_applied,
            &self.decode_failures,
            &self.transport_errors,
            &self.idle_reads,
            &self.unknown_tags,
            &self.dropped_before_time_base,
            &self.orphan_beat_classes,
            &self.counter_resets,
            &self.clock_anomalies,
            &self.writes_after_stop,
            &self.fallback_reads,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.since.write().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of ingestion statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStatsSnapshot {
    pub lines_read: u64,
    pub samples_applied: u64,
    pub decode_failures: u64,
    pub transport_errors: u64,
    pub idle_reads: u64,
    pub unknown_tags: u64,
    pub dropped_before_time_base: u64,
    pub orphan_beat_classes: u64,
    pub counter_resets: u64,
    pub clock_anomalies: u64,
    pub writes_after_stop: u64,
    pub fallback_reads: u64,
    pub since: DateTime<Utc>,
    pub duration_secs: u64,
}

impl IngestStatsSnapshot {
    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        format!(
            "Ingestion Statistics:\n\
             - Lines read: {}\n\
             - Samples applied: {}\n\
             - Malformed lines dropped: {}\n\
             - Transport errors: {}\n\
             - Unknown tags ignored: {}\n\
             - Samples before first tick: {}\n\
             - Beat classes without beat: {}\n\
             - Counter resets: {}\n\
             - Counter anomalies: {}\n\
             - Duration: {} seconds",
            self.lines_read,
            self.samples_applied,
            self.decode_failures,
            self.transport_errors,
            self.unknown_tags,
            self.dropped_before_time_base,
            self.orphan_beat_classes,
            self.counter_resets,
            self.clock_anomalies,
            self.duration_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counting() {
        let stats = IngestStats::new();

        stats.record_line();
        stats.record_line();
        stats.record_outcome(DispatchOutcome::Applied);
        stats.record_outcome(DispatchOutcome::ClockAnomaly);
        stats.record_outcome(DispatchOutcome::UnknownTag);
        stats.record_outcome(DispatchOutcome::BeforeTimeBase);
        stats.record_decode_failure();

        let snapshot = stats.stats();
        assert_eq!(snapshot.lines_read, 2);
        assert_eq!(snapshot.samples_applied, 2);
        assert_eq!(snapshot.clock_anomalies, 1);
        assert_eq!(snapshot.unknown_tags, 1);
        assert_eq!(snapshot.dropped_before_time_base, 1);
        assert_eq!(snapshot.decode_failures, 1);
    }

    #[test]
    fn test_reset() {
        let stats = IngestStats::new();
        stats.record_line();
        stats.record_transport_error();
        stats.record_fallback_read();
        stats.reset();

        let snapshot = stats.stats();
        assert_eq!(snapshot.lines_read, 0);
        assert_eq!(snapshot.transport_errors, 0);
        assert_eq!(snapshot.fallback_reads, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = IngestStats::new();
        let summary = stats.summary();

        assert!(summary.contains("Lines read"));
        assert!(summary.contains("Malformed lines dropped"));
        assert!(summary.contains("Counter anomalies"));
    }
}
