//! Error taxonomy for the robot-control workspace.
//!
//! Timing failures keep an OS-style categorical code (see [`TimingError::code`])
//! so callers can branch on the category instead of matching message text.

use std::io;
use thiserror::Error;

/// Failures of the cycle-counter calibration and tick conversion paths.
#[derive(Debug, Error)]
pub enum TimingError {
    /// Calibration was already performed for this process.
    #[error("calibration state already initialized")]
    AlreadyInitialized,

    /// The CPU-description source could not be opened or read.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The frequency label was not found in the CPU description.
    #[error("CPU description does not contain the frequency label")]
    MissingLabel,

    /// The frequency value is not terminated by a newline inside the read buffer.
    #[error("malformed frequency record: no line terminator before end of buffer")]
    UnterminatedValue,

    /// The frequency text parsed to a value that cannot be a clock rate.
    #[error("frequency value out of range: {text:?}")]
    OutOfRange {
        /// The offending value text.
        text: String,
    },

    /// The frequency truncated to zero; state was pinned to 1 cycle/us.
    #[error("CPU frequency reported as {reported_mhz} MHz, pinned to 1 cycle/us")]
    Degraded {
        /// Frequency as parsed from the CPU description.
        reported_mhz: f64,
    },

    /// A tick conversion was attempted before calibration.
    #[error("calibration state is uninitialized")]
    Uninitialized,
}

impl TimingError {
    /// OS-style status code for this failure. Success is always 0.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::AlreadyInitialized | Self::Uninitialized => libc::EINVAL,
            Self::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            Self::MissingLabel
            | Self::UnterminatedValue
            | Self::OutOfRange { .. }
            | Self::Degraded { .. } => libc::EFAULT,
        }
    }

    /// Returns true when calibration failed but left a usable (pinned) frequency behind.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Build a [`TimingError::Io`] with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convert a calibration outcome into the integer status used at C-style boundaries.
#[must_use]
pub fn status_code<T>(result: &Result<T, TimingError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

/// Workspace error type for configuration, actuation and wrapped timing failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoboError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Timing subsystem failure.
    #[error("timing error (code {code}): {message}")]
    Timing {
        /// OS-style status code from [`TimingError::code`].
        code: i32,
        /// Rendered error message.
        message: String,
    },

    /// Motor driver failure.
    #[error("actuation error: {0}")]
    Actuation(String),

    /// Component used before `initialize`.
    #[error("{0} used before initialization")]
    NotInitialized(String),
}

impl From<TimingError> for RoboError {
    fn from(e: TimingError) -> Self {
        Self::Timing {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Convenience type alias for workspace operations.
pub type RoboResult<T> = Result<T, RoboError>;
