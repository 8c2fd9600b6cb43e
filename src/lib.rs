//! Biosensor DAQ - ingestion and live windowing for ECG/EDR telemetry.
//!
//! A microcontroller streams tagged integer lines (`<tag><integer>\n`) over a
//! serial link. This library decodes them, rebuilds a continuous time axis
//! from the device's sample counter, keeps every channel in append-only
//! storage, and maintains a sliding "drawable" window that live displays
//! read from without ever blocking ingestion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Biosensor DAQ                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐   │
//! │  │ LineSource  │──▶│   Decoder   │──▶│ Tag table        │   │
//! │  │ (serial/io) │   │ (tag,value) │   │ (transform+route)│   │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘   │
//! │                                              │               │
//! │                 ┌────────────────────────────┤               │
//! │                 ▼                            ▼               │
//! │  ┌──────────────────────┐   ┌──────────────────────────┐   │
//! │  │ Clock + Window       │   │ Channel store + limits   │   │
//! │  └──────────────────────┘   └──────────────────────────┘   │
//! │                 │                            │               │
//! │                 └──────────▶ SessionReader ◀─┘               │
//! │                              (fail-soft, snapshots)          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use biosensor_daq::{Acquisition, ChannelSource, Config};
//! use std::time::Duration;
//!
//! let config = Config::default();
//! let mut acquisition = Acquisition::new(config.engine());
//!
//! let (lines, source) = ChannelSource::pair(Duration::from_millis(50));
//! acquisition.start(source).expect("not yet running");
//!
//! for line in ["S1", "K10", "G500", "S5", "K12", "G510", "Y1"] {
//!     lines.send(line.to_string()).unwrap();
//! }
//!
//! let reader = acquisition.reader();
//! let snapshot = reader.acquire_snapshot();
//! let ecg = snapshot.get_drawable("ecg");
//! snapshot.release();
//!
//! let report = acquisition.stop().expect("running");
//! println!("{} ticks, {:?}", report.tick_count, ecg);
//! ```

pub mod acquisition;
pub mod collector;
pub mod config;
pub mod core;
pub mod report;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use acquisition::{Acquisition, AcquisitionError, SessionReader, Snapshot};
pub use collector::{ChannelSource, LineSource, ReadOutcome, ReaderSource, TransportError};
pub use config::{Config, EngineConfig};
pub use crate::core::{AcquisitionSession, Channel, DrawableWindow, Mark, WindowEvent};
pub use report::{RunReport, ReportError};
pub use transparency::{IngestStats, IngestStatsSnapshot};

#[cfg(feature = "serial")]
pub use collector::SerialSource;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol reference shown by the CLI.
pub const PROTOCOL_REFERENCE: &str = r#"
Line format: <tag><integer>\n   (e.g. "S1042", "K-17")

  S  sample counter tick        time axis (counter * seconds_per_count)
  K  ECG sample                 ecg
  G  skin conductance (raw)     edr = value*220/(1024-value), -1 if >= 1024
  F  high-pass filtered         hipass
  Q  squared                    squared
  I  integrated                 integrated
  B  beat (counter value)       beat_time
  W  beat classification        beat_type (dropped before the first beat)
  P  secondary pulse period     bpm_secondary = 60000/value, -1 if 0
  O  primary pulse period       bpm_primary   = 60000/value, -1 if 0
  T  integrated threshold       threshold1_time, half into threshold2_time
  Y  filtered threshold         threshold1_freq, advances the live window
  H  secondary threshold        threshold2_freq
  N  pulse regularity flag      pulse_regular
  R  device counter reset       corrects the counter baseline
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_reference_lists_every_tag() {
        for spec in crate::core::TAG_TABLE.iter() {
            let row = format!("\n  {}  ", spec.symbol);
            assert!(PROTOCOL_REFERENCE.contains(&row), "missing tag {}", spec.symbol);
        }
    }
}
