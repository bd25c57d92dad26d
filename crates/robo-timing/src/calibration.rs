//! One-shot CPU frequency calibration.
//!
//! The calibrated value is cycles per microsecond (numerically the clock rate
//! in MHz). It is published once into a [`CalibrationCell`] and never changes
//! afterwards; a second attempt is rejected with
//! [`TimingError::AlreadyInitialized`].
//!
//! Cell lifecycle:
//!
//! | Value | Meaning                                              |
//! |-------|------------------------------------------------------|
//! | 0     | uninitialized; conversions fail                      |
//! | 1     | calibrated, or pinned after a degraded reading       |
//! | n > 1 | calibrated                                           |
//!
//! The uninitialized to calibrated transition is a compare-and-set, so two
//! threads racing to calibrate cannot both publish.

use crate::cpuinfo::{mhz_to_cycles_per_us, parse_cpu_mhz};
use crate::tick::{TickUnit, NATIVE_UNIT};
use crossbeam_utils::CachePadded;
use robo_common::config::{TimingConfig, DEFAULT_CPUINFO_PATH, DEFAULT_READ_BUFFER_SIZE};
use robo_common::TimingError;
use std::fs::File;
use std::io::Read;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Single-assignment cycles-per-microsecond value.
#[derive(Debug, Default)]
pub struct CalibrationCell {
    cycles_per_us: CachePadded<AtomicU64>,
}

impl CalibrationCell {
    /// Create an uninitialized cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cycles_per_us: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Published cycles per microsecond, or `None` before calibration.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.cycles_per_us.load(Ordering::Acquire))
    }

    /// Whether a value has been published.
    #[inline]
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.get().is_some()
    }

    /// Publish `cycles_per_us`, pinning 0 to 1.
    ///
    /// # Errors
    ///
    /// [`TimingError::AlreadyInitialized`] if any value was published before,
    /// including by a concurrent caller.
    pub fn try_set(&self, cycles_per_us: u64) -> Result<NonZeroU64, TimingError> {
        let value = NonZeroU64::new(cycles_per_us).unwrap_or(NonZeroU64::MIN);
        self.cycles_per_us
            .compare_exchange(0, value.get(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| value)
            .map_err(|_| TimingError::AlreadyInitialized)
    }

    /// Convert a tick delta to whole microseconds.
    ///
    /// # Errors
    ///
    /// [`TimingError::Uninitialized`] before calibration.
    #[inline]
    pub fn ticks_to_micros(&self, delta: u64) -> Result<u64, TimingError> {
        let cycles_per_us = self.get().ok_or(TimingError::Uninitialized)?;
        Ok(delta / cycles_per_us.get())
    }

    /// Convert a tick delta to a [`Duration`] with nanosecond precision.
    ///
    /// # Errors
    ///
    /// [`TimingError::Uninitialized`] before calibration.
    #[inline]
    pub fn ticks_to_duration(&self, delta: u64) -> Result<Duration, TimingError> {
        let cycles_per_us = self.get().ok_or(TimingError::Uninitialized)?;
        let nanos = u128::from(delta) * 1_000 / u128::from(cycles_per_us.get());
        Ok(Duration::from_nanos(
            u64::try_from(nanos).unwrap_or(u64::MAX),
        ))
    }
}

/// Reads the CPU description and publishes the measured frequency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibrator {
    cpuinfo_path: PathBuf,
    read_buffer_size: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(DEFAULT_CPUINFO_PATH)
    }
}

impl Calibrator {
    /// Calibrator reading `cpuinfo_path` with the default 0x400-byte read.
    pub fn new(cpuinfo_path: impl Into<PathBuf>) -> Self {
        Self {
            cpuinfo_path: cpuinfo_path.into(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Build from the timing section of the configuration.
    #[must_use]
    pub fn from_config(config: &TimingConfig) -> Self {
        Self::new(config.cpuinfo_path.clone()).with_read_buffer_size(config.read_buffer_size)
    }

    /// Set the size of the single bounded read.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Path of the CPU description.
    #[must_use]
    pub fn cpuinfo_path(&self) -> &Path {
        &self.cpuinfo_path
    }

    /// Measure the clock rate and publish it into `cell`.
    ///
    /// Does no I/O when `cell` is already calibrated. The description is
    /// taken with one read of at most `read_buffer_size` bytes; a short read
    /// is parsed as-is.
    ///
    /// # Errors
    ///
    /// - [`TimingError::AlreadyInitialized`]: `cell` was set before.
    /// - [`TimingError::Io`]: the description could not be opened or read;
    ///   `cell` is untouched.
    /// - Parse errors from [`parse_cpu_mhz`]; `cell` is untouched.
    /// - [`TimingError::Degraded`]: the rate truncated to 0; `cell` holds 1.
    pub fn calibrate(&self, cell: &CalibrationCell) -> Result<NonZeroU64, TimingError> {
        if cell.is_calibrated() {
            warn!("CPU frequency calibration requested twice");
            return Err(TimingError::AlreadyInitialized);
        }

        let description = self.read_description()?;
        calibrate_from_bytes(cell, &description)
    }

    fn read_description(&self) -> Result<Vec<u8>, TimingError> {
        let path = &self.cpuinfo_path;
        let mut file = File::open(path).map_err(|e| {
            error!(path = %path.display(), err = ?e.raw_os_error(), "unable to open CPU description");
            TimingError::io(format!("unable to open {}", path.display()), e)
        })?;

        let mut buf = vec![0u8; self.read_buffer_size];
        let len = file.read(&mut buf).map_err(|e| {
            error!(path = %path.display(), err = ?e.raw_os_error(), "unable to read CPU description");
            TimingError::io(format!("unable to read {}", path.display()), e)
        })?;
        buf.truncate(len);

        debug!(path = %path.display(), bytes = len, "CPU description read");
        Ok(buf)
    }
}

/// Parse `description` and publish the result into `cell`.
///
/// Same state transitions as [`Calibrator::calibrate`] without the file I/O.
///
/// # Errors
///
/// See [`Calibrator::calibrate`].
pub fn calibrate_from_bytes(
    cell: &CalibrationCell,
    description: &[u8],
) -> Result<NonZeroU64, TimingError> {
    if cell.is_calibrated() {
        warn!("CPU frequency calibration requested twice");
        return Err(TimingError::AlreadyInitialized);
    }

    let mhz = match parse_cpu_mhz(description) {
        Ok(mhz) => mhz,
        Err(e @ TimingError::OutOfRange { .. }) => {
            info!(error = %e, "CPU frequency parse failed");
            return Err(e);
        }
        Err(e) => {
            error!(
                error = %e,
                description = %String::from_utf8_lossy(description),
                "CPU description does not contain a usable frequency"
            );
            return Err(e);
        }
    };

    let cycles_per_us = mhz_to_cycles_per_us(mhz);
    let published = cell.try_set(cycles_per_us).map_err(|e| {
        warn!("CPU frequency was published concurrently, measurement discarded");
        e
    })?;

    if cycles_per_us == 0 {
        info!(reported_mhz = mhz, "CPU frequency is zero, pinned to 1 cycle/us");
        return Err(TimingError::Degraded { reported_mhz: mhz });
    }

    info!(mhz, cycles_per_us = published.get(), "CPU frequency calibrated");
    Ok(published)
}

/// Publish a known cycles-per-microsecond value without measuring.
///
/// # Errors
///
/// [`TimingError::AlreadyInitialized`] if `cell` was set before, or
/// [`TimingError::Degraded`] if `cycles_per_us` is 0 (published as 1).
pub fn calibrate_fixed(
    cell: &CalibrationCell,
    cycles_per_us: u64,
) -> Result<NonZeroU64, TimingError> {
    let published = cell.try_set(cycles_per_us).map_err(|e| {
        warn!(cycles_per_us, "CPU frequency already calibrated, fixed value ignored");
        e
    })?;
    if cycles_per_us == 0 {
        warn!("fixed CPU frequency of 0 configured, pinned to 1 cycle/us");
        return Err(TimingError::Degraded { reported_mhz: 0.0 });
    }
    info!(cycles_per_us = published.get(), "CPU frequency set without measurement");
    Ok(published)
}

/// Calibrate `cell` for a target whose native ticks are `native_unit`.
///
/// A configured fixed frequency wins, then microsecond-tick targets are
/// pinned to 1 (their ticks already are microseconds), otherwise the CPU
/// description is measured.
///
/// # Errors
///
/// See [`Calibrator::calibrate`] and [`calibrate_fixed`].
pub fn calibrate_for_target(
    cell: &CalibrationCell,
    config: &TimingConfig,
    native_unit: TickUnit,
) -> Result<NonZeroU64, TimingError> {
    if cell.is_calibrated() {
        warn!("CPU frequency calibration requested twice");
        return Err(TimingError::AlreadyInitialized);
    }

    if let Some(fixed) = config.fixed_cycles_per_us {
        return calibrate_fixed(cell, fixed);
    }

    match native_unit {
        TickUnit::Microseconds => calibrate_fixed(cell, 1),
        TickUnit::Cycles => Calibrator::from_config(config).calibrate(cell),
    }
}

static CALIBRATION: CalibrationCell = CalibrationCell::new();

/// The process-wide calibration state.
#[inline]
#[must_use]
pub fn calibration() -> &'static CalibrationCell {
    &CALIBRATION
}

/// Calibrate the process-wide state from `/proc/cpuinfo`.
///
/// Call once during startup, before any tick delta is converted.
///
/// # Errors
///
/// See [`calibrate_for_target`].
pub fn initialize() -> Result<NonZeroU64, TimingError> {
    initialize_with(&TimingConfig::default())
}

/// Calibrate the process-wide state using `config`.
///
/// # Errors
///
/// See [`calibrate_for_target`].
pub fn initialize_with(config: &TimingConfig) -> Result<NonZeroU64, TimingError> {
    calibrate_for_target(&CALIBRATION, config, NATIVE_UNIT)
}

/// Publish 1 cycle/us if nothing has been published yet.
///
/// Used after a calibration failure that left the state uninitialized, so
/// later conversions run with degraded accuracy instead of failing.
pub fn ensure_safe_default() -> NonZeroU64 {
    match CALIBRATION.try_set(1) {
        Ok(value) => {
            warn!("timing degraded: using 1 cycle/us");
            value
        }
        Err(_) => CALIBRATION.get().unwrap_or(NonZeroU64::MIN),
    }
}

/// Process-wide cycles per microsecond, `None` before calibration.
#[inline]
#[must_use]
pub fn cycles_per_us() -> Option<NonZeroU64> {
    CALIBRATION.get()
}

/// Convert a native tick delta to microseconds.
///
/// # Errors
///
/// [`TimingError::Uninitialized`] before calibration.
#[inline]
pub fn ticks_to_micros(delta: u64) -> Result<u64, TimingError> {
    CALIBRATION.ticks_to_micros(delta)
}

/// Convert a native tick delta to a [`Duration`].
///
/// # Errors
///
/// [`TimingError::Uninitialized`] before calibration.
#[inline]
pub fn ticks_to_duration(delta: u64) -> Result<Duration, TimingError> {
    CALIBRATION.ticks_to_duration(delta)
}
