//! Configuration for the biosensor acquisition engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for an acquisition front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial device the biosensor is attached to
    pub port: String,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Read timeout of the transport
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Device clock period: seconds per raw sample-counter step
    pub seconds_per_count: f64,

    /// Width of the live display in seconds
    pub window_seconds: f64,

    /// Blank lead-in kept on the right edge of the live display
    pub undrawn_seconds: f64,

    /// Path for exporting run reports
    pub export_path: PathBuf,

    /// Path for storing state
    pub data_path: PathBuf,

    /// Log every malformed line
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("biosensor-daq");

        Self {
            port: "/dev/ttyAMA0".to_string(),
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(1),
            seconds_per_count: 0.005,
            window_seconds: 15.0,
            undrawn_seconds: 2.0,
            export_path: data_dir.join("runs"),
            data_path: data_dir,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("biosensor-daq")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Trailing interval of data eligible for display.
    pub fn drawable_seconds(&self) -> f64 {
        self.window_seconds - self.undrawn_seconds
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.seconds_per_count > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "seconds_per_count must be positive, got {}",
                self.seconds_per_count
            )));
        }
        if !(self.drawable_seconds() > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "window_seconds ({}) must exceed undrawn_seconds ({})",
                self.window_seconds, self.undrawn_seconds
            )));
        }
        Ok(())
    }

    /// The part of the configuration the ingestion engine needs.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            seconds_per_count: self.seconds_per_count,
            drawable_seconds: self.drawable_seconds(),
        }
    }
}

/// Engine parameters fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds represented by one step of the device sample counter
    pub seconds_per_count: f64,
    /// `t_drawable`: span of the live window in seconds
    pub drawable_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Config::default().engine()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
