//! Whole-run report written after acquisition stops.
//!
//! Unlike the windowed reads, the report covers the full history of the
//! run: every tick-aligned series truncated to a common length, beats paired
//! with their classification codes, marks and counter anomalies.

use crate::core::{AcquisitionSession, Channel, ClockAnomaly, Mark, SENTINEL};
use crate::transparency::IngestStatsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A detected beat with its classification, if one arrived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatRecord {
    pub time_secs: f64,
    pub class: Option<i64>,
}

/// Name of this machine, or `"unknown"`.
pub fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Whole-run summary of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Values in the exported series
    pub count: usize,
    /// Of which were degenerate-transform markers
    pub sentinels: usize,
    /// Display bounds at the end of the run
    pub limits: (f64, f64),
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

impl ChannelSummary {
    fn from_series(channel: Channel, series: &[f64], limits: (f64, f64)) -> Self {
        use statrs::statistics::Statistics;

        let values: Vec<f64> = series
            .iter()
            .copied()
            .filter(|&v| !(channel.may_hold_sentinel() && v == SENTINEL))
            .collect();
        let finite = |v: f64| v.is_finite().then_some(v);

        Self {
            count: series.len(),
            sentinels: series.len() - values.len(),
            limits,
            mean: finite(values.iter().mean()),
            std_dev: finite(values.iter().std_dev()),
        }
    }
}

/// Everything recorded during one acquisition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub host: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub seconds_per_count: f64,
    pub drawable_seconds: f64,
    /// Ticks received, before truncation
    pub tick_count: usize,
    /// Common length every exported series is cut to
    pub aligned_len: usize,
    pub series: BTreeMap<Channel, Vec<f64>>,
    pub beats: Vec<BeatRecord>,
    pub marks: Vec<Mark>,
    pub anomalies: Vec<ClockAnomaly>,
    pub channels: BTreeMap<Channel, ChannelSummary>,
    /// Final run time divided by the number of ticks
    pub average_sample_period: Option<f64>,
    pub pulse_found: bool,
    pub pulse_regular: bool,
    pub stats: IngestStatsSnapshot,
}

impl RunReport {
    /// Build from a session. `host` is resolved by the caller so that no
    /// system call happens while the session is locked.
    pub fn from_session(
        session: &AcquisitionSession,
        stats: IngestStatsSnapshot,
        host: String,
    ) -> Self {
        let store = session.store();
        let config = session.config();

        // Channels the device never sent do not shorten the others.
        let aligned_len = Channel::ALL
            .into_iter()
            .filter(|c| c.is_tick_aligned())
            .map(|c| store.len(c))
            .filter(|&len| len > 0)
            .min()
            .unwrap_or(0);

        let mut series = BTreeMap::new();
        let mut channels = BTreeMap::new();
        for channel in Channel::ALL.into_iter().filter(|c| c.is_tick_aligned()) {
            if store.is_empty(channel) {
                continue;
            }
            let values = store.series(channel)[..aligned_len].to_vec();
            channels.insert(
                channel,
                ChannelSummary::from_series(channel, &values, session.channel_limits(channel)),
            );
            series.insert(channel, values);
        }

        let classes = store.series(Channel::BeatType);
        let beats = store
            .series(Channel::BeatTime)
            .iter()
            .enumerate()
            .map(|(i, &time_secs)| BeatRecord {
                time_secs,
                class: classes.get(i).map(|&code| code as i64),
            })
            .collect();

        let average_sample_period = series
            .get(&Channel::Time)
            .and_then(|time| Some(time.last()? / time.len() as f64));

        Self {
            run_id: session.run_id(),
            host,
            started_at: session.started_at(),
            finished_at: Utc::now(),
            seconds_per_count: config.seconds_per_count,
            drawable_seconds: config.drawable_seconds,
            tick_count: session.tick_count(),
            aligned_len,
            series,
            beats,
            marks: session.marks().to_vec(),
            anomalies: session.clock_anomalies().to_vec(),
            channels,
            average_sample_period,
            pulse_found: session.pulse_found(),
            pulse_regular: session.pulse_regular(),
            stats,
        }
    }

    /// File name derived from the run start, e.g. `run_20240101_120000.json`.
    pub fn file_name(&self) -> String {
        let stamp = self.started_at.unwrap_or(self.finished_at);
        format!("run_{}.json", stamp.format("%Y%m%d_%H%M%S"))
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.display(), "run report written");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let duration = self
            .series
            .get(&Channel::Time)
            .and_then(|time| time.last().copied())
            .unwrap_or(0.0);
        let period = self
            .average_sample_period
            .map(|p| format!("{p:.6} s"))
            .unwrap_or_else(|| "n/a".to_string());

        format!(
            "Run {}:\n\
             - Ticks: {} ({} aligned)\n\
             - Device time: {:.2} s\n\
             - Average sample time: {}\n\
             - Beats: {}\n\
             - Marks: {}\n\
             - Counter anomalies: {}",
            self.run_id,
            self.tick_count,
            self.aligned_len,
            duration,
            period,
            self.beats.len(),
            self.marks.len(),
            self.anomalies.len()
        )
    }
}

/// Errors that can occur when writing or reading a run report.
#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "IO error: {e}"),
            ReportError::Serialize(e) => write!(f, "Serialization error: {e}"),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<std::io::Error> for ReportError {
    fn from(e: std::io::Error) -> Self {
        ReportError::Io(e)
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        ReportError::Serialize(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use tempfile::tempdir;

    fn session_with(lines: &[&str]) -> AcquisitionSession {
        let mut session = AcquisitionSession::new(EngineConfig {
            seconds_per_count: 0.125,
            drawable_seconds: 1.0,
        });
        for line in lines {
            let _ = session.ingest_line(line);
        }
        session
    }

    #[test]
    fn test_series_truncated_to_common_length() {
        let session = session_with(&[
            "S0", "K1", "G500", "P800", "S4", "K2", "G1024", "P0", "S8", "K3", "Y0",
        ]);
        let report =
            RunReport::from_session(&session, IngestStatsSnapshot::default(), host_name());

        assert_eq!(report.tick_count, 3);
        assert_eq!(report.aligned_len, 1);
        assert_eq!(report.series[&Channel::Time], vec![0.0]);
        assert_eq!(report.series[&Channel::Ecg], vec![1.0]);
        assert!(!report.series.contains_key(&Channel::Hipass));
        assert_eq!(report.average_sample_period, Some(0.0));
    }

    #[test]
    fn test_channel_summary_skips_sentinels() {
        let session = session_with(&[
            "S0", "G500", "S1", "G1024", "S2", "G510", "S3", "G0",
        ]);
        let report =
            RunReport::from_session(&session, IngestStatsSnapshot::default(), host_name());

        let edr = report.channels[&Channel::Edr];
        assert_eq!(edr.count, 4);
        assert_eq!(edr.sentinels, 1);
        assert_eq!(edr.limits, (0.0, 218.0));
        let mean = edr.mean.unwrap();
        assert!((mean - (209.0 + 218.0 + 0.0) / 3.0).abs() < 1e-9);
        assert!(edr.std_dev.is_some());

        let time = &report.series[&Channel::Time];
        assert_eq!(time.len(), 4);
        assert_eq!(report.average_sample_period, Some(0.375 / 4.0));
    }

    #[test]
    fn test_beats_paired_with_classes() {
        let session = session_with(&["S0", "B0", "W5", "S8", "B6", "B8", "W2"]);
        let report =
            RunReport::from_session(&session, IngestStatsSnapshot::default(), host_name());

        assert_eq!(
            report.beats,
            vec![
                BeatRecord {
                    time_secs: 0.0,
                    class: Some(5)
                },
                BeatRecord {
                    time_secs: 0.75,
                    class: Some(2)
                },
                BeatRecord {
                    time_secs: 1.0,
                    class: None
                },
            ]
        );
    }

    #[test]
    fn test_empty_run() {
        let session = session_with(&[]);
        let report =
            RunReport::from_session(&session, IngestStatsSnapshot::default(), host_name());

        assert_eq!(report.aligned_len, 0);
        assert!(report.series.is_empty());
        assert_eq!(report.average_sample_period, None);
        assert!(report.started_at.is_none());
        assert!(report.summary().contains("n/a"));
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempdir().unwrap();
        let mut session = session_with(&["S0", "K7", "Y0", "S2", "K9", "Y0"]);
        session.add_mark().unwrap();
        let report =
            RunReport::from_session(&session, IngestStatsSnapshot::default(), host_name());

        let path = report.write_to(&dir.path().join("runs")).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("run_"));

        let loaded = RunReport::load(&path).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.series, report.series);
        assert_eq!(loaded.marks.len(), 1);
        assert_eq!(loaded.channels[&Channel::Ecg].limits, (7.0, 9.0));
    }
}
