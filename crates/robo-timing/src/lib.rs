//! High-resolution timing for robot control loops.
//!
//! This crate provides:
//! - [`tick`]: the cycle source, a hardware cycle counter on x86_64 and a
//!   microsecond monotonic clock everywhere else
//! - [`cpuinfo`]: parsing of the kernel CPU description for the clock rate
//! - [`calibration`]: the one-shot, process-wide cycles-per-microsecond state
//! - [`stopwatch`]: elapsed-time measurement on top of the two
//!
//! Call [`initialize`] once during startup, before any tick delta is
//! converted to time.

pub mod calibration;
pub mod cpuinfo;
pub mod stopwatch;
pub mod tick;

pub use calibration::*;
pub use cpuinfo::{parse_cpu_mhz, CPU_MHZ_LABEL};
pub use stopwatch::Stopwatch;
pub use tick::*;
