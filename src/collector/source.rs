//! Line transports feeding the ingestion loop.
//!
//! The physical transport is an external collaborator; everything the engine
//! needs from it is captured by [`LineSource`].

use crate::collector::types::ReadOutcome;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::{BufRead, ErrorKind};
use std::time::Duration;

/// Errors raised by a line transport.
#[derive(Debug)]
pub enum TransportError {
    /// The transport could not be opened
    Open(String),
    /// A read failed; the transport may still be usable
    Io(std::io::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Open(e) => write!(f, "Failed to open transport: {e}"),
            TransportError::Io(e) => write!(f, "Transport read failed: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(value: std::io::Error) -> Self {
        TransportError::Io(value)
    }
}

/// Something that yields raw protocol lines.
pub trait LineSource {
    /// Block for at most the transport's own read timeout.
    fn next_line(&mut self) -> Result<ReadOutcome, TransportError>;
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn next_line(&mut self) -> Result<ReadOutcome, TransportError> {
        (**self).next_line()
    }
}

/// Read one `\n`-terminated line, keeping partial data across timeouts.
pub(crate) fn pull_line<R: BufRead>(
    reader: &mut R,
    pending: &mut Vec<u8>,
) -> Result<ReadOutcome, TransportError> {
    match reader.read_until(b'\n', pending) {
        Ok(0) if pending.is_empty() => Ok(ReadOutcome::Closed),
        Ok(_) => {
            let line = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            Ok(ReadOutcome::Line(line))
        }
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Ok(ReadOutcome::Idle)
        }
        Err(e) => Err(TransportError::Io(e)),
    }
}

/// Replays lines from any buffered reader (capture file, stdin).
pub struct ReaderSource<R: BufRead> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(32),
        }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn next_line(&mut self) -> Result<ReadOutcome, TransportError> {
        pull_line(&mut self.reader, &mut self.pending)
    }
}

/// Lines pushed in-process through a channel.
///
/// Dropping every sender closes the source.
pub struct ChannelSource {
    receiver: Receiver<String>,
    poll_interval: Duration,
}

impl ChannelSource {
    pub fn new(receiver: Receiver<String>, poll_interval: Duration) -> Self {
        Self {
            receiver,
            poll_interval,
        }
    }

    /// Create a bounded channel and the source reading from it.
    pub fn pair(poll_interval: Duration) -> (Sender<String>, Self) {
        let (sender, receiver) = bounded(10_000);
        (sender, Self::new(receiver, poll_interval))
    }
}

impl LineSource for ChannelSource {
    fn next_line(&mut self) -> Result<ReadOutcome, TransportError> {
        match self.receiver.recv_timeout(self.poll_interval) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(RecvTimeoutError::Timeout) => Ok(ReadOutcome::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(ReadOutcome::Closed),
        }
    }
}
