//! Acquisition lifecycle and the reader-facing interface.
//!
//! An [`Acquisition`] owns the ingestion thread. The thread is the only
//! writer of the [`AcquisitionSession`]; front ends read through cloneable
//! [`SessionReader`] handles and bracket multi-read frames with a
//! [`Snapshot`] token.

use crate::collector::{LineSource, ReadOutcome, TransportError};
use crate::config::EngineConfig;
use crate::core::{
    AcquisitionSession, Channel, ClockAnomaly, DrawableWindow, Mark, ReadError, WindowEvent,
    FALLBACK_SERIES, FALLBACK_VALUE,
};
use crate::report::{self, RunReport};
use crate::transparency::{IngestStats, IngestStatsSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Pause after a failed transport read so a dead port does not spin.
const TRANSPORT_BACKOFF: Duration = Duration::from_millis(50);

/// State shared between the ingestion thread and every reader.
#[derive(Debug)]
struct Shared {
    session: RwLock<AcquisitionSession>,
    running: AtomicBool,
    stats: IngestStats,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, AcquisitionSession> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AcquisitionSession> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn serve_series(
        &self,
        session: &AcquisitionSession,
        name: &str,
        window: Option<DrawableWindow>,
    ) -> Vec<f64> {
        AcquisitionSession::resolve(name)
            .and_then(|channel| session.read_drawable(channel, window))
            .unwrap_or_else(|e| {
                self.stats.record_fallback_read();
                tracing::debug!(channel = name, error = %e, "serving fallback series");
                FALLBACK_SERIES.to_vec()
            })
    }

    fn serve_value(
        &self,
        session: &AcquisitionSession,
        name: &str,
        window: Option<DrawableWindow>,
    ) -> f64 {
        AcquisitionSession::resolve(name)
            .and_then(|channel| session.read_last(channel, window))
            .unwrap_or_else(|e| {
                self.stats.record_fallback_read();
                tracing::debug!(channel = name, error = %e, "serving fallback value");
                FALLBACK_VALUE
            })
    }

    /// Report of a frozen run; `None` while ingestion may still write.
    fn frozen_report(&self) -> Option<RunReport> {
        let host = report::host_name();
        let session = self.read();
        if !session.is_frozen() {
            return None;
        }
        Some(RunReport::from_session(&session, self.stats.stats(), host))
    }
}

/// Errors from the acquisition lifecycle.
#[derive(Debug)]
pub enum AcquisitionError {
    AlreadyRunning,
    NotRunning,
    /// No tick has arrived yet, so there is nothing to mark
    NoTimeBase,
    Transport(TransportError),
    ThreadPanicked,
}

impl std::fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionError::AlreadyRunning => write!(f, "Acquisition is already running"),
            AcquisitionError::NotRunning => write!(f, "Acquisition is not running"),
            AcquisitionError::NoTimeBase => write!(f, "No samples received yet"),
            AcquisitionError::Transport(e) => write!(f, "Transport error: {e}"),
            AcquisitionError::ThreadPanicked => write!(f, "Ingestion thread panicked"),
        }
    }
}

impl std::error::Error for AcquisitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AcquisitionError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for AcquisitionError {
    fn from(e: TransportError) -> Self {
        AcquisitionError::Transport(e)
    }
}

/// Runs one ingestion thread at a time over a [`LineSource`].
pub struct Acquisition {
    config: EngineConfig,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Acquisition {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                session: RwLock::new(AcquisitionSession::new(config)),
                running: AtomicBool::new(false),
                stats: IngestStats::new(),
            }),
            handle: None,
        }
    }

    /// Start a fresh run reading from `source`.
    ///
    /// Discards the previous run's data. Returns the new run id.
    pub fn start<S>(&mut self, source: S) -> Result<Uuid, AcquisitionError>
    where
        S: LineSource + Send + 'static,
    {
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(AcquisitionError::AlreadyRunning);
        }

        // A run that ended on its own still has a handle to reap.
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("previous ingestion thread panicked");
            }
        }

        let run_id = {
            let mut session = self.shared.write();
            *session = AcquisitionSession::new(self.config);
            session.run_id()
        };
        self.shared.stats.reset();
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let handle = thread::spawn(move || {
            ingest_loop(source, &shared);
        });
        self.handle = Some(handle);

        tracing::info!(%run_id, "acquisition started");
        Ok(run_id)
    }

    /// Stop the run, freeze the store and return its full report.
    ///
    /// Waits for the ingestion thread to finish the line it is on.
    pub fn stop(&mut self) -> Result<RunReport, AcquisitionError> {
        let handle = self.handle.take().ok_or(AcquisitionError::NotRunning)?;
        self.shared.running.store(false, Ordering::SeqCst);
        let joined = handle.join();

        self.shared.write().freeze();
        let report = self
            .shared
            .frozen_report()
            .ok_or(AcquisitionError::NotRunning)?;
        tracing::info!(
            run_id = %report.run_id,
            ticks = report.tick_count,
            marks = report.marks.len(),
            "acquisition stopped"
        );

        match joined {
            Ok(()) => Ok(report),
            Err(_) => Err(AcquisitionError::ThreadPanicked),
        }
    }

    /// Whether the ingestion thread is still consuming lines.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Mark the current window position.
    pub fn add_mark(&self) -> Result<Mark, AcquisitionError> {
        if !self.is_running() {
            return Err(AcquisitionError::NotRunning);
        }
        let mark = self
            .shared
            .write()
            .add_mark()
            .ok_or(AcquisitionError::NoTimeBase)?;
        tracing::info!(
            number = mark.number,
            tick_index = mark.tick_index,
            time_secs = mark.time_secs,
            "mark recorded"
        );
        Ok(mark)
    }

    pub fn mark_count(&self) -> usize {
        self.shared.read().mark_count()
    }

    pub fn run_id(&self) -> Uuid {
        self.shared.read().run_id()
    }

    pub fn reader(&self) -> SessionReader {
        SessionReader {
            shared: self.shared.clone(),
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.shared.stats.stats()
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Body of the ingestion thread.
///
/// No per-line failure ends the loop; only a stop request or a closed
/// transport does.
fn ingest_loop<S: LineSource>(mut source: S, shared: &Shared) {
    while shared.running.load(Ordering::SeqCst) {
        match source.next_line() {
            Ok(ReadOutcome::Line(line)) => {
                shared.stats.record_line();
                let result = shared.write().ingest_line(&line);
                match result {
                    Ok(outcome) => shared.stats.record_outcome(outcome),
                    Err(e) => {
                        shared.stats.record_decode_failure();
                        tracing::debug!(line = line.trim_end(), error = %e, "dropping malformed line");
                    }
                }
            }
            Ok(ReadOutcome::Idle) => shared.stats.record_idle(),
            Ok(ReadOutcome::Closed) => {
                tracing::info!("transport closed");
                break;
            }
            Err(e) => {
                shared.stats.record_transport_error();
                tracing::warn!(error = %e, "transport read failed");
                thread::sleep(TRANSPORT_BACKOFF);
            }
        }
    }

    shared.write().freeze();
    shared.running.store(false, Ordering::SeqCst);
}

/// Read-only handle onto the current run.
///
/// String-keyed reads are fail-soft: unknown channels, an unready window or
/// a short channel produce the documented fallback instead of an error.
#[derive(Debug, Clone)]
pub struct SessionReader {
    shared: Arc<Shared>,
}

impl SessionReader {
    /// `[first_drawable, last_drawable)` of a channel, or `[0, 0]`.
    pub fn get_drawable(&self, name: &str) -> Vec<f64> {
        let session = self.shared.read();
        self.shared.serve_series(&session, name, session.window())
    }

    /// Value at `last_drawable`, or `0`.
    pub fn get_last(&self, name: &str) -> f64 {
        let session = self.shared.read();
        self.shared.serve_value(&session, name, session.window())
    }

    pub fn get_channel_limits(&self, name: &str) -> (f64, f64) {
        self.shared.read().get_channel_limits(name)
    }

    /// Typed windowed read that reports why it failed.
    pub fn drawable(&self, channel: Channel) -> Result<Vec<f64>, ReadError> {
        let session = self.shared.read();
        session.read_drawable(channel, session.window())
    }

    pub fn last(&self, channel: Channel) -> Result<f64, ReadError> {
        let session = self.shared.read();
        session.read_last(channel, session.window())
    }

    /// Freeze the current window bounds for a batch of reads.
    pub fn acquire_snapshot(&self) -> Snapshot {
        let session = self.shared.read();
        Snapshot {
            shared: self.shared.clone(),
            run_id: session.run_id(),
            window: session.window(),
        }
    }

    /// Return to live reads. Equivalent to dropping the snapshot.
    pub fn release_snapshot(&self, snapshot: Snapshot) {
        snapshot.release();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn pulse_found(&self) -> bool {
        self.shared.read().pulse_found()
    }

    pub fn pulse_regular(&self) -> bool {
        self.shared.read().pulse_regular()
    }

    pub fn samples_received(&self) -> bool {
        self.shared.read().samples_received()
    }

    pub fn run_id(&self) -> Uuid {
        self.shared.read().run_id()
    }

    pub fn tick_count(&self) -> usize {
        self.shared.read().tick_count()
    }

    pub fn mark_count(&self) -> usize {
        self.shared.read().mark_count()
    }

    pub fn window(&self) -> Option<DrawableWindow> {
        self.shared.read().window()
    }

    pub fn beats_in_window(&self) -> Vec<WindowEvent> {
        let session = self.shared.read();
        session.beats_in_window(session.window())
    }

    pub fn marks_in_window(&self) -> Vec<WindowEvent> {
        let session = self.shared.read();
        session.marks_in_window(session.window())
    }

    pub fn clock_anomalies(&self) -> Vec<ClockAnomaly> {
        self.shared.read().clock_anomalies().to_vec()
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.shared.stats.stats()
    }

    /// Full report of the run once it has stopped.
    ///
    /// `None` while the run is live, since building it walks every series.
    pub fn report(&self) -> Option<RunReport> {
        self.shared.frozen_report()
    }
}

/// Window bounds frozen by [`SessionReader::acquire_snapshot`].
///
/// Ingestion keeps appending while a snapshot is held; the frozen indices
/// stay valid because channels only grow. A snapshot taken in an earlier
/// run serves fallback values.
#[derive(Debug)]
pub struct Snapshot {
    shared: Arc<Shared>,
    run_id: Uuid,
    window: Option<DrawableWindow>,
}

impl Snapshot {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn window(&self) -> Option<DrawableWindow> {
        self.window
    }

    fn session(&self) -> Result<RwLockReadGuard<'_, AcquisitionSession>, ReadError> {
        let session = self.shared.read();
        if session.run_id() != self.run_id {
            tracing::warn!(
                snapshot_run = %self.run_id,
                current_run = %session.run_id(),
                "read through a snapshot from a previous run"
            );
            return Err(ReadError::StaleSnapshot);
        }
        Ok(session)
    }

    pub fn get_drawable(&self, name: &str) -> Vec<f64> {
        match self.session() {
            Ok(session) => self.shared.serve_series(&session, name, self.window),
            Err(_) => {
                self.shared.stats.record_fallback_read();
                FALLBACK_SERIES.to_vec()
            }
        }
    }

    pub fn get_last(&self, name: &str) -> f64 {
        match self.session() {
            Ok(session) => self.shared.serve_value(&session, name, self.window),
            Err(_) => {
                self.shared.stats.record_fallback_read();
                FALLBACK_VALUE
            }
        }
    }

    pub fn drawable(&self, channel: Channel) -> Result<Vec<f64>, ReadError> {
        self.session()?.read_drawable(channel, self.window)
    }

    pub fn last(&self, channel: Channel) -> Result<f64, ReadError> {
        self.session()?.read_last(channel, self.window)
    }

    pub fn beats_in_window(&self) -> Vec<WindowEvent> {
        self.session()
            .map(|s| s.beats_in_window(self.window))
            .unwrap_or_default()
    }

    pub fn marks_in_window(&self) -> Vec<WindowEvent> {
        self.session()
            .map(|s| s.marks_in_window(self.window))
            .unwrap_or_default()
    }

    pub fn release(self) {}
}
