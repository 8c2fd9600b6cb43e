//! Per-run acquisition state and tag dispatch.
//!
//! An [`AcquisitionSession`] owns every channel, the device clock, the
//! drawable window and the mark ledger of one run. The ingestion task is its
//! only writer.

use crate::collector::{decode_line, DecodeError, Sample};
use crate::config::EngineConfig;
use crate::core::channels::{Channel, Effect, Tag, TagSpec};
use crate::core::clock::DeviceClock;
use crate::core::marks::{Mark, MarkLedger};
use crate::core::store::{ChannelStore, ReadError};
use crate::core::windowing::{DrawableWindow, WindowManager};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned by windowed series reads that cannot be served.
pub const FALLBACK_SERIES: [f64; 2] = [0.0, 0.0];

/// Returned by single-value reads that cannot be served.
pub const FALLBACK_VALUE: f64 = 0.0;

/// Returned by limit reads for unknown channels.
pub const FALLBACK_LIMITS: (f64, f64) = (0.0, 1.0);

/// What happened to one decoded sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// `R` notice applied to the counter baseline
    CounterReset,
    /// Tick appended with a negative counter delta
    ClockAnomaly,
    UnknownTag,
    /// Non-tick sample before the first `S`
    BeforeTimeBase,
    /// `W` with no beat recorded yet
    OrphanBeatClass,
    /// Session already stopped
    Frozen,
}

/// A tick whose raw counter went backwards without a reset notice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockAnomaly {
    pub tick_index: usize,
    pub raw_counter: i64,
    pub delta_counts: i64,
}

/// A beat or mark placed relative to the newest drawable tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowEvent {
    /// Absolute run time in seconds
    pub time_secs: f64,
    /// `time_secs` minus the time of the newest drawable tick
    pub offset_secs: f64,
    /// Beat classification code, or mark number
    pub label: Option<i64>,
}

/// State of one acquisition run.
#[derive(Debug, Clone)]
pub struct AcquisitionSession {
    run_id: Uuid,
    config: EngineConfig,
    clock: DeviceClock,
    store: ChannelStore,
    window: WindowManager,
    marks: MarkLedger,
    anomalies: Vec<ClockAnomaly>,
    pulse_found: bool,
    pulse_regular: bool,
    frozen: bool,
}

impl AcquisitionSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            clock: DeviceClock::new(config.seconds_per_count),
            store: ChannelStore::new(),
            window: WindowManager::new(config.drawable_seconds),
            marks: MarkLedger::new(),
            anomalies: Vec::new(),
            pulse_found: false,
            pulse_regular: false,
            frozen: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Decode and apply one raw line.
    pub fn ingest_line(&mut self, line: &str) -> Result<DispatchOutcome, DecodeError> {
        let sample = decode_line(line)?;
        Ok(self.apply(sample))
    }

    pub fn apply(&mut self, sample: Sample) -> DispatchOutcome {
        self.apply_at(sample, Utc::now())
    }

    /// Route a sample through the tag table; `now` stamps the run start if
    /// this sample establishes the time base.
    pub fn apply_at(&mut self, sample: Sample, now: DateTime<Utc>) -> DispatchOutcome {
        if self.frozen {
            return DispatchOutcome::Frozen;
        }

        let Some(tag) = Tag::from_symbol(sample.tag) else {
            tracing::debug!(tag = %sample.tag, value = sample.value, "ignoring unknown tag");
            return DispatchOutcome::UnknownTag;
        };
        let spec = tag.spec();
        let value = sample.value;

        match spec.effect {
            Effect::Tick => self.apply_tick(value, now),
            _ if !self.clock.is_running() => {
                tracing::debug!(tag = %sample.tag, value, "dropping sample before first tick");
                DispatchOutcome::BeforeTimeBase
            }
            Effect::Beat => match self.clock.beat_time(value) {
                Some(t) => {
                    self.store.push(Channel::BeatTime, t);
                    DispatchOutcome::Applied
                }
                None => DispatchOutcome::BeforeTimeBase,
            },
            Effect::BeatClass => {
                if self.store.is_empty(Channel::BeatTime) {
                    tracing::debug!(code = value, "dropping beat classification, no beat yet");
                    return DispatchOutcome::OrphanBeatClass;
                }
                self.append(spec, value);
                DispatchOutcome::Applied
            }
            Effect::PulseRegularity => {
                self.pulse_regular = value != 0;
                DispatchOutcome::Applied
            }
            Effect::CounterReset => {
                self.clock.apply_reset(value);
                tracing::warn!(
                    offset = value,
                    baseline = ?self.clock.last_raw(),
                    "device counter reset"
                );
                DispatchOutcome::CounterReset
            }
            Effect::Store => {
                self.append(spec, value);
                DispatchOutcome::Applied
            }
            Effect::PulseFound => {
                self.append(spec, value);
                self.pulse_found = true;
                DispatchOutcome::Applied
            }
            Effect::HalfThreshold(half) => {
                self.append(spec, value);
                self.store.push(half, value as f64 * 0.5);
                DispatchOutcome::Applied
            }
            Effect::AdvanceWindow => {
                self.append(spec, value);
                self.window.advance(self.store.series(Channel::Time));
                DispatchOutcome::Applied
            }
        }
    }

    fn apply_tick(&mut self, raw: i64, now: DateTime<Utc>) -> DispatchOutcome {
        let tick = self.clock.tick_at(raw, now);
        self.store.push(Channel::Time, tick.elapsed);

        if tick.is_first {
            tracing::info!(raw_counter = raw, run_id = %self.run_id, "time base established");
        }

        if tick.delta_counts < 0 {
            let anomaly = ClockAnomaly {
                tick_index: self.store.len(Channel::Time) - 1,
                raw_counter: raw,
                delta_counts: tick.delta_counts,
            };
            tracing::warn!(
                tick_index = anomaly.tick_index,
                raw_counter = raw,
                delta_counts = tick.delta_counts,
                "sample counter went backwards without a reset notice"
            );
            self.anomalies.push(anomaly);
            return DispatchOutcome::ClockAnomaly;
        }

        DispatchOutcome::Applied
    }

    fn append(&mut self, spec: &TagSpec, value: i64) {
        let Some(channel) = spec.target else {
            return;
        };
        match (spec.transform)(value) {
            Some(v) => self.store.push(channel, v),
            None => {
                tracing::debug!(%channel, value, "degenerate transform, storing sentinel");
                self.store.push_sentinel(channel);
            }
        }
    }

    /// Make the store read-only; later samples are ignored.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Record a mark at the current window position.
    ///
    /// `None` before the first tick or after the run is frozen.
    pub fn add_mark(&mut self) -> Option<Mark> {
        self.add_mark_at(Utc::now())
    }

    pub fn add_mark_at(&mut self, now: DateTime<Utc>) -> Option<Mark> {
        if self.frozen {
            return None;
        }
        let started_at = self.clock.started_at()?;
        let tick_index = match self.window.window() {
            Some(w) => w.last,
            None => self.store.len(Channel::Time).checked_sub(1)?,
        };
        let time_secs = self.store.at(Channel::Time, tick_index).ok()?;
        Some(self.marks.record(tick_index, time_secs, started_at, now))
    }

    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }

    pub fn marks(&self) -> &[Mark] {
        self.marks.as_slice()
    }

    /// Live window, `None` until the first complete tick.
    pub fn window(&self) -> Option<DrawableWindow> {
        self.window.window()
    }

    pub fn resolve(name: &str) -> Result<Channel, ReadError> {
        Channel::from_name(name).ok_or_else(|| ReadError::UnknownChannel(name.to_string()))
    }

    /// Windowed contents of `channel` for the given window bounds.
    ///
    /// Tick-aligned channels yield `[first, last)`; beat channels yield the
    /// beats inside the drawable interval.
    pub fn read_drawable(
        &self,
        channel: Channel,
        window: Option<DrawableWindow>,
    ) -> Result<Vec<f64>, ReadError> {
        let w = window.ok_or(ReadError::NotReady)?;
        match channel {
            Channel::BeatTime => Ok(self
                .beats_in_window(Some(w))
                .into_iter()
                .map(|e| e.time_secs)
                .collect()),
            Channel::BeatType => Ok(self
                .beats_in_window(Some(w))
                .into_iter()
                .filter_map(|e| e.label.map(|code| code as f64))
                .collect()),
            _ => Ok(self.store.slice(channel, w.first, w.last)?.to_vec()),
        }
    }

    /// Value of `channel` at the newest drawable tick.
    pub fn read_last(
        &self,
        channel: Channel,
        window: Option<DrawableWindow>,
    ) -> Result<f64, ReadError> {
        let w = window.ok_or(ReadError::NotReady)?;
        if channel.is_tick_aligned() {
            return self.store.at(channel, w.last);
        }
        self.read_drawable(channel, Some(w))?
            .last()
            .copied()
            .ok_or(ReadError::Misaligned {
                channel,
                len: 0,
                needed: 1,
            })
    }

    /// Fail-soft windowed read against the live window.
    pub fn get_drawable(&self, name: &str) -> Vec<f64> {
        Self::resolve(name)
            .and_then(|channel| self.read_drawable(channel, self.window()))
            .unwrap_or_else(|e| {
                tracing::debug!(channel = name, error = %e, "serving fallback series");
                FALLBACK_SERIES.to_vec()
            })
    }

    /// Fail-soft read of the newest drawable value.
    pub fn get_last(&self, name: &str) -> f64 {
        Self::resolve(name)
            .and_then(|channel| self.read_last(channel, self.window()))
            .unwrap_or_else(|e| {
                tracing::debug!(channel = name, error = %e, "serving fallback value");
                FALLBACK_VALUE
            })
    }

    /// Display bounds: the run's min/max where tracked, else a fixed range.
    pub fn channel_limits(&self, channel: Channel) -> (f64, f64) {
        self.store
            .stats(channel)
            .limits()
            .unwrap_or_else(|| channel.default_limits())
    }

    pub fn get_channel_limits(&self, name: &str) -> (f64, f64) {
        match Self::resolve(name) {
            Ok(channel) => self.channel_limits(channel),
            Err(_) => FALLBACK_LIMITS,
        }
    }

    /// Beats inside the drawable interval `(t_last - drawable_seconds, t_last]`.
    ///
    /// Beat counters may go backwards, so every beat is checked rather than
    /// scanning back from the newest.
    pub fn beats_in_window(&self, window: Option<DrawableWindow>) -> Vec<WindowEvent> {
        let Some((edge, t_last)) = self.drawable_interval(window) else {
            return Vec::new();
        };
        let classes = self.store.series(Channel::BeatType);

        self.store
            .series(Channel::BeatTime)
            .iter()
            .enumerate()
            .filter(|(_, t)| **t > edge && **t <= t_last)
            .map(|(i, &t)| WindowEvent {
                time_secs: t,
                offset_secs: t - t_last,
                label: classes.get(i).map(|&code| code as i64),
            })
            .collect()
    }

    /// Marks inside the drawable interval.
    pub fn marks_in_window(&self, window: Option<DrawableWindow>) -> Vec<WindowEvent> {
        let Some((edge, t_last)) = self.drawable_interval(window) else {
            return Vec::new();
        };

        self.marks
            .as_slice()
            .iter()
            .filter(|m| m.time_secs > edge && m.time_secs <= t_last)
            .map(|m| WindowEvent {
                time_secs: m.time_secs,
                offset_secs: m.time_secs - t_last,
                label: Some(m.number as i64),
            })
            .collect()
    }

    /// Left edge (exclusive) and right edge (inclusive) in run seconds.
    fn drawable_interval(&self, window: Option<DrawableWindow>) -> Option<(f64, f64)> {
        let w = window?;
        let t_last = self.store.at(Channel::Time, w.last).ok()?;
        Some((t_last - self.config.drawable_seconds, t_last))
    }

    pub fn clock_anomalies(&self) -> &[ClockAnomaly] {
        &self.anomalies
    }

    pub fn pulse_found(&self) -> bool {
        self.pulse_found
    }

    pub fn pulse_regular(&self) -> bool {
        self.pulse_regular
    }

    /// Whether the first tick has established a time base.
    pub fn samples_received(&self) -> bool {
        self.clock.is_running()
    }

    pub fn tick_count(&self) -> usize {
        self.store.len(Channel::Time)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.clock.started_at()
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channels::SENTINEL;

    fn session() -> AcquisitionSession {
        AcquisitionSession::new(EngineConfig {
            seconds_per_count: 0.005,
            drawable_seconds: 13.0,
        })
    }

    fn feed(session: &mut AcquisitionSession, lines: &[&str]) -> Vec<DispatchOutcome> {
        lines
            .iter()
            .filter_map(|line| session.ingest_line(line).ok())
            .collect()
    }

    #[test]
    fn test_example_stream() {
        let mut s = session();
        feed(&mut s, &["S1", "K10", "G500", "S5", "K12", "G510"]);
        assert_eq!(s.window(), None);
        assert_eq!(s.get_drawable("ecg"), FALLBACK_SERIES.to_vec());

        feed(&mut s, &["Y1"]);
        assert_eq!(s.store().series(Channel::Time), &[0.0, 0.02]);
        assert_eq!(s.store().series(Channel::Ecg), &[10.0, 12.0]);
        assert_eq!(s.store().series(Channel::Edr), &[209.0, 218.0]);
        assert_eq!(s.window(), Some(DrawableWindow { first: 0, last: 1 }));

        assert_eq!(s.get_drawable("time"), vec![0.0]);
        assert_eq!(s.get_drawable("ecg"), vec![10.0]);
        assert_eq!(s.get_last("ecg"), 12.0);
        assert_eq!(s.get_last("edr"), 218.0);
    }

    #[test]
    fn test_unknown_channel_reads_fall_back() {
        let mut s = session();
        assert_eq!(s.get_drawable("bogus"), vec![0.0, 0.0]);
        assert_eq!(s.get_last("bogus"), 0.0);

        feed(&mut s, &["S1", "K1", "Y1", "S2", "K2", "Y1"]);
        assert_eq!(s.get_drawable("bogus"), vec![0.0, 0.0]);
        assert_eq!(s.get_last("bogus"), 0.0);
        assert_eq!(s.get_channel_limits("bogus"), FALLBACK_LIMITS);
    }

    #[test]
    fn test_misaligned_channel_falls_back() {
        let mut s = session();
        feed(&mut s, &["S1", "K1", "S2", "K2", "S3", "Y0"]);
        // ECG has no value for the newest tick yet
        assert_eq!(s.get_last("ecg"), FALLBACK_VALUE);
        assert_eq!(s.get_drawable("ecg"), vec![1.0, 2.0]);
        assert_eq!(s.get_drawable("hipass"), FALLBACK_SERIES.to_vec());
        assert!(matches!(
            s.read_last(Channel::Ecg, s.window()),
            Err(ReadError::Misaligned { needed: 3, .. })
        ));
    }

    #[test]
    fn test_samples_before_time_base_are_dropped() {
        let mut s = session();
        let outcomes = feed(&mut s, &["K10", "G500", "N1", "R5", "Y1", "S7", "K11"]);
        assert_eq!(
            outcomes,
            vec![
                DispatchOutcome::BeforeTimeBase,
                DispatchOutcome::BeforeTimeBase,
                DispatchOutcome::BeforeTimeBase,
                DispatchOutcome::BeforeTimeBase,
                DispatchOutcome::BeforeTimeBase,
                DispatchOutcome::Applied,
                DispatchOutcome::Applied,
            ]
        );
        assert_eq!(s.store().series(Channel::Ecg), &[11.0]);
        assert!(!s.pulse_regular());
        assert!(s.samples_received());
    }

    #[test]
    fn test_unknown_tags_and_bad_lines_leave_state_untouched() {
        let mut s = session();
        feed(&mut s, &["S1", "K1"]);
        assert_eq!(s.ingest_line("Z99"), Ok(DispatchOutcome::UnknownTag));
        assert!(s.ingest_line("Kabc").is_err());
        assert!(s.ingest_line("").is_err());
        assert_eq!(s.store().series(Channel::Ecg), &[1.0]);
        assert_eq!(s.tick_count(), 1);
    }

    #[test]
    fn test_pulse_channels_and_flags() {
        let mut s = session();
        feed(&mut s, &["S1", "P800", "O1000", "P0"]);
        assert!(s.pulse_found());
        assert_eq!(s.store().series(Channel::BpmSecondary), &[75.0, SENTINEL]);
        assert_eq!(s.store().series(Channel::BpmPrimary), &[60.0]);
        assert_eq!(s.channel_limits(Channel::BpmSecondary), (75.0, 75.0));

        feed(&mut s, &["N1"]);
        assert!(s.pulse_regular());
        feed(&mut s, &["N0"]);
        assert!(!s.pulse_regular());
    }

    #[test]
    fn test_edr_overflow_guard() {
        let mut s = session();
        feed(&mut s, &["S1", "G1024", "G2000", "G0"]);
        assert_eq!(s.store().series(Channel::Edr), &[SENTINEL, SENTINEL, 0.0]);
    }

    #[test]
    fn test_thresholds() {
        let mut s = session();
        feed(&mut s, &["S1", "T40", "Y30", "H12"]);
        assert_eq!(s.store().series(Channel::Threshold1Time), &[40.0]);
        assert_eq!(s.store().series(Channel::Threshold2Time), &[20.0]);
        assert_eq!(s.store().series(Channel::Threshold1Freq), &[30.0]);
        assert_eq!(s.store().series(Channel::Threshold2Freq), &[12.0]);
    }

    #[test]
    fn test_beat_timestamps_and_classes() {
        let mut s = session();
        let outcomes = feed(&mut s, &["S100", "W1", "S200", "B190", "W2", "B210", "W1"]);
        assert_eq!(outcomes[1], DispatchOutcome::OrphanBeatClass);

        let beats = s.store().series(Channel::BeatTime);
        assert_eq!(beats.len(), 2);
        assert!((beats[0] - 0.45).abs() < 1e-9);
        assert!((beats[1] - 0.55).abs() < 1e-9);
        assert_eq!(s.store().series(Channel::BeatType), &[2.0, 1.0]);
    }

    #[test]
    fn test_counter_reset_keeps_time_continuous() {
        let mut s = session();
        let outcomes = feed(&mut s, &["S100", "S103", "S107", "R50", "S60", "S64"]);
        assert_eq!(outcomes[3], DispatchOutcome::CounterReset);
        assert!(s.clock_anomalies().is_empty());

        let time = s.store().series(Channel::Time);
        assert_eq!(time.len(), 5);
        for pair in time.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= 0.0);
            assert!(gap <= 4.0 * 0.005 + 1e-9);
        }
    }

    #[test]
    fn test_negative_delta_is_kept_and_flagged() {
        let mut s = session();
        let outcomes = feed(&mut s, &["S100", "S110", "S105"]);
        assert_eq!(outcomes[2], DispatchOutcome::ClockAnomaly);
        assert_eq!(s.tick_count(), 3);
        assert_eq!(
            s.clock_anomalies(),
            &[ClockAnomaly {
                tick_index: 2,
                raw_counter: 105,
                delta_counts: -5
            }]
        );
        let time = s.store().series(Channel::Time);
        assert!(time[2] < time[1]);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let lines = [
            "S1", "K10", "G500", "F3", "Q9", "I27", "T40", "P800", "O790", "Y30", "S5", "K12",
            "G510", "B4", "W1", "F-2", "Q4", "I30", "T41", "P810", "O800", "Y31", "garbage",
        ];
        let mut a = session();
        let mut b = session();
        feed(&mut a, &lines);
        feed(&mut b, &lines);

        for channel in Channel::ALL {
            assert_eq!(a.store().series(channel), b.store().series(channel));
        }
        assert_eq!(a.window(), b.window());
    }

    #[test]
    fn test_window_tracks_drawable_seconds() {
        let mut s = AcquisitionSession::new(EngineConfig {
            seconds_per_count: 0.125,
            drawable_seconds: 1.0,
        });
        for i in 0..40 {
            s.ingest_line(&format!("S{i}")).unwrap();
            s.ingest_line(&format!("K{i}")).unwrap();
            s.ingest_line("Y1").unwrap();
        }
        let w = s.window().unwrap();
        assert_eq!(w, DrawableWindow { first: 31, last: 39 });
        assert_eq!(s.get_drawable("ecg"), (31..39).map(|v| v as f64).collect::<Vec<_>>());
        assert_eq!(s.get_last("ecg"), 39.0);
    }

    #[test]
    fn test_beats_and_marks_in_window() {
        let mut s = AcquisitionSession::new(EngineConfig {
            seconds_per_count: 0.125,
            drawable_seconds: 1.0,
        });
        assert!(s.add_mark().is_none());

        for i in 0..8 {
            feed(&mut s, &[format!("S{i}").as_str(), "Y0"]);
            if i == 2 {
                feed(&mut s, &["B2", "W7"]);
                s.add_mark().unwrap();
            }
        }
        feed(&mut s, &["B7", "W3"]);

        // window covers times 0.0..=0.875, every event is inside
        let beats = s.beats_in_window(s.window());
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[0].label, Some(7));
        assert_eq!(beats[1].offset_secs, 0.0);
        assert_eq!(s.get_drawable("beat_type"), vec![7.0, 3.0]);
        assert_eq!(s.get_last("beat_time"), 0.875);

        let marks = s.marks_in_window(s.window());
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].time_secs, 0.25);
        assert_eq!(marks[0].label, Some(1));

        for i in 8..20 {
            feed(&mut s, &[format!("S{i}").as_str(), "Y0"]);
        }
        assert_eq!(s.beats_in_window(s.window()), Vec::new());
        assert!(s.marks_in_window(s.window()).is_empty());
        assert_eq!(s.get_last("beat_time"), FALLBACK_VALUE);
    }

    #[test]
    fn test_out_of_order_beats_stay_visible() {
        let mut s = AcquisitionSession::new(EngineConfig {
            seconds_per_count: 0.125,
            drawable_seconds: 1.0,
        });
        for i in 0..20 {
            feed(&mut s, &[format!("S{i}").as_str(), "Y0"]);
        }
        // second beat lands well before the window edge
        feed(&mut s, &["B18", "W4", "B5", "W6"]);

        let beats = s.beats_in_window(s.window());
        assert_eq!(beats.len(), 1);
        assert_eq!(beats[0].time_secs, 2.25);
        assert_eq!(beats[0].label, Some(4));
        assert_eq!(s.get_drawable("beat_time"), vec![2.25]);
        assert_eq!(s.get_last("beat_type"), 4.0);
    }

    #[test]
    fn test_frozen_session_rejects_writes() {
        let mut s = session();
        feed(&mut s, &["S1", "K1", "Y1"]);
        s.freeze();
        assert_eq!(s.ingest_line("K2"), Ok(DispatchOutcome::Frozen));
        assert!(s.add_mark().is_none());
        assert_eq!(s.store().series(Channel::Ecg), &[1.0]);
        // reads still work
        assert_eq!(s.get_last("ecg"), 1.0);
    }

    #[test]
    fn test_limits_default_before_data() {
        let mut s = session();
        assert_eq!(s.get_channel_limits("ecg"), (-512.0, 512.0));
        feed(&mut s, &["S1", "K-40", "K90", "K3"]);
        assert_eq!(s.get_channel_limits("ecg"), (-40.0, 90.0));
    }
}
