//! Cycle source.
//!
//! Two [`TickSource`] implementations exist with different units:
//!
//! | Source            | Targets       | One tick         |
//! |-------------------|---------------|------------------|
//! | [`CycleCounter`]  | x86_64        | one CPU cycle    |
//! | [`MonotonicClock`]| all           | one microsecond  |
//!
//! [`NativeTicks`] picks one per target at build time. Raw ticks from the two
//! sources are not interchangeable; only convert deltas through the
//! calibration published for the native source.

use std::fmt;

/// Opaque counter sample. Only the difference between two ticks taken on the
/// same machine carries meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(pub u64);

impl Tick {
    /// Raw counter value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier`, correct across a single counter wrap.
    #[inline]
    #[must_use]
    pub const fn wrapping_delta(self, earlier: Tick) -> u64 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What one tick of a source represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickUnit {
    /// Processor clock cycles; needs calibration to become time.
    Cycles,
    /// Microseconds of monotonic time.
    Microseconds,
}

/// A fast, allocation-free timestamp primitive.
pub trait TickSource {
    /// Unit of the ticks this source returns.
    const UNIT: TickUnit;

    /// Sample the source.
    fn now(&self) -> Tick;
}

/// Hardware time-stamp counter read with `rdtsc`.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleCounter;

#[cfg(target_arch = "x86_64")]
impl TickSource for CycleCounter {
    const UNIT: TickUnit = TickUnit::Cycles;

    #[inline(always)]
    fn now(&self) -> Tick {
        let lo: u32;
        let hi: u32;
        // SAFETY: rdtsc has no memory effects; it only writes edx:eax.
        unsafe {
            core::arch::asm!(
                "rdtsc",
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags),
            );
        }
        Tick(join_halves(hi, lo))
    }
}

/// Combine the two 32-bit halves of a counter read, `hi` in the upper bits.
#[inline(always)]
#[must_use]
pub const fn join_halves(hi: u32, lo: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}

/// Monotonic system clock at microsecond resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl TickSource for MonotonicClock {
    const UNIT: TickUnit = TickUnit::Microseconds;

    #[cfg(unix)]
    #[inline]
    fn now(&self) -> Tick {
        use nix::time::{clock_gettime, ClockId};
        use tracing::error;

        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => Tick(timespec_to_micros(ts.tv_sec() as u64, ts.tv_nsec() as u64)),
            Err(errno) => {
                error!(err = errno as i32, "clock_gettime(CLOCK_MONOTONIC) failed");
                debug_assert!(false, "monotonic clock unavailable: {errno}");
                Tick(0)
            }
        }
    }

    #[cfg(not(unix))]
    #[inline]
    fn now(&self) -> Tick {
        use std::sync::OnceLock;
        use std::time::Instant;

        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        Tick(u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX))
    }
}

/// `secs * 1_000_000 + nsecs / 1_000`.
#[inline]
#[must_use]
pub const fn timespec_to_micros(secs: u64, nsecs: u64) -> u64 {
    secs * 1_000_000 + nsecs / 1_000
}

/// Tick source used by [`now`] on this target.
#[cfg(target_arch = "x86_64")]
pub type NativeTicks = CycleCounter;

/// Tick source used by [`now`] on this target.
#[cfg(not(target_arch = "x86_64"))]
pub type NativeTicks = MonotonicClock;

/// Unit of [`now`] on this target.
pub const NATIVE_UNIT: TickUnit = <NativeTicks as TickSource>::UNIT;

/// Sample the native tick source.
#[inline(always)]
#[must_use]
pub fn now() -> Tick {
    NativeTicks::default().now()
}
