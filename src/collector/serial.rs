//! Serial-port transport (enabled with the `serial` feature).

use crate::collector::source::{pull_line, LineSource, TransportError};
use crate::collector::types::ReadOutcome;
use serialport::SerialPort;
use std::io::BufReader;
use std::time::Duration;

/// Line source backed by a serial device such as `/dev/ttyAMA0`.
pub struct SerialSource {
    port_name: String,
    reader: BufReader<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialSource {
    /// Open the port; reads block for at most `read_timeout`.
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| TransportError::Open(format!("{port_name}: {e}")))?;

        tracing::info!(port = port_name, baud_rate, "serial port opened");

        Ok(Self {
            port_name: port_name.to_string(),
            reader: BufReader::new(port),
            pending: Vec::with_capacity(32),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl LineSource for SerialSource {
    fn next_line(&mut self) -> Result<ReadOutcome, TransportError> {
        pull_line(&mut self.reader, &mut self.pending)
    }
}
