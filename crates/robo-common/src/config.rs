//! Configuration structures for the robot controller.
//!
//! Supports TOML deserialization with defaults that work on a stock
//! Linux host, and explicit overrides for embedded targets.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the kernel CPU description.
pub const DEFAULT_CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Size of the single bounded read from the CPU description (0x400 bytes).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 0x400;

/// Top-level controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoboConfig {
    /// Cycle-counter calibration settings.
    pub timing: TimingConfig,

    /// Control loop settings.
    pub control: ControlConfig,

    /// Wheels driven by the control loop.
    pub wheels: Vec<WheelConfig>,
}

/// Cycle-counter calibration configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Text source describing CPU properties.
    pub cpuinfo_path: PathBuf,

    /// Maximum bytes taken from the CPU description in one read.
    pub read_buffer_size: usize,

    /// Skip measurement and publish this cycles-per-microsecond value instead.
    /// Intended for targets with a fixed, known clock.
    pub fixed_cycles_per_us: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cpuinfo_path: PathBuf::from(DEFAULT_CPUINFO_PATH),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            fixed_cycles_per_us: None,
        }
    }
}

/// Control loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Period of one control loop iteration.
    #[serde(with = "humantime_serde")]
    pub loop_period: Duration,

    /// Number of loop timing samples kept for percentiles.
    pub histogram_size: usize,

    /// Refuse to start when calibration reports a failure or degraded result.
    pub fail_on_degraded_timing: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            loop_period: Duration::from_millis(10),
            histogram_size: 1_000,
            fail_on_degraded_timing: false,
        }
    }
}

/// Per-wheel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Motor port on the driver board.
    pub id: u8,

    /// Mounted mirrored; forward and backward are swapped.
    pub reversed: bool,

    /// Cruise speed, -255 (full reverse) to 255 (full forward).
    pub speed: i32,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            id: 1,
            reversed: false,
            speed: 0,
        }
    }
}

impl RoboConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
