//! Elapsed-time measurement from native ticks.

use crate::calibration::{calibration, CalibrationCell};
use crate::tick::{now, Tick};
use robo_common::TimingError;
use std::time::Duration;

/// Measures time since a start tick.
///
/// Starting and reading a stopwatch never blocks or allocates. Converting
/// to time needs a calibrated [`CalibrationCell`]; the plain `elapsed*`
/// methods use the process-wide one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopwatch {
    start: Tick,
}

impl Stopwatch {
    /// Start measuring now.
    #[inline]
    #[must_use]
    pub fn start() -> Self {
        Self { start: now() }
    }

    /// Measure from an earlier sample.
    #[inline]
    #[must_use]
    pub const fn started_at(start: Tick) -> Self {
        Self { start }
    }

    /// Tick the stopwatch started at.
    #[inline]
    #[must_use]
    pub const fn start_tick(&self) -> Tick {
        self.start
    }

    /// Ticks since start.
    #[inline]
    #[must_use]
    pub fn elapsed_ticks(&self) -> u64 {
        now().wrapping_delta(self.start)
    }

    /// Restart from now, returning the ticks of the lap just finished.
    #[inline]
    pub fn restart(&mut self) -> u64 {
        let current = now();
        let lap = current.wrapping_delta(self.start);
        self.start = current;
        lap
    }

    /// Microseconds since start.
    ///
    /// # Errors
    ///
    /// [`TimingError::Uninitialized`] before calibration.
    #[inline]
    pub fn elapsed_micros(&self) -> Result<u64, TimingError> {
        self.elapsed_micros_with(calibration())
    }

    /// Time since start.
    ///
    /// # Errors
    ///
    /// [`TimingError::Uninitialized`] before calibration.
    #[inline]
    pub fn elapsed(&self) -> Result<Duration, TimingError> {
        self.elapsed_with(calibration())
    }

    /// Microseconds since start using `cell`.
    ///
    /// # Errors
    ///
    /// [`TimingError::Uninitialized`] if `cell` is not calibrated.
    #[inline]
    pub fn elapsed_micros_with(&self, cell: &CalibrationCell) -> Result<u64, TimingError> {
        cell.ticks_to_micros(self.elapsed_ticks())
    }

    /// Time since start using `cell`.
    ///
    /// # Errors
    ///
    /// [`TimingError::Uninitialized`] if `cell` is not calibrated.
    #[inline]
    pub fn elapsed_with(&self, cell: &CalibrationCell) -> Result<Duration, TimingError> {
        cell.ticks_to_duration(self.elapsed_ticks())
    }
}
