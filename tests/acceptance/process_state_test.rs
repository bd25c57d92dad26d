//! The process-wide calibration state.
//!
//! This is the only test in the binary that touches the global cell.

use super::common::{write_cpuinfo, x86_cpuinfo};
use robo_common::config::TimingConfig;
use robo_common::TimingError;
use robo_timing::{NATIVE_UNIT, TickUnit};
use std::num::NonZeroU64;

#[test]
fn test_global_calibration_is_one_shot() {
    assert!(robo_timing::cycles_per_us().is_none());
    assert!(matches!(
        robo_timing::ticks_to_micros(1_000),
        Err(TimingError::Uninitialized)
    ));

    let file = write_cpuinfo(&x86_cpuinfo("1000.000"));
    let config = TimingConfig {
        cpuinfo_path: file.path().to_path_buf(),
        ..Default::default()
    };

    let expected = match NATIVE_UNIT {
        TickUnit::Cycles => 1000,
        TickUnit::Microseconds => 1,
    };
    let value = robo_timing::initialize_with(&config).unwrap();
    assert_eq!(value.get(), expected);

    // Neither a re-run nor a fixed override can change the published value.
    assert!(matches!(
        robo_timing::initialize_with(&config),
        Err(TimingError::AlreadyInitialized)
    ));
    let fixed = TimingConfig {
        fixed_cycles_per_us: Some(5),
        ..config
    };
    assert!(matches!(
        robo_timing::initialize_with(&fixed),
        Err(TimingError::AlreadyInitialized)
    ));
    assert!(matches!(
        robo_timing::initialize(),
        Err(TimingError::AlreadyInitialized)
    ));
    assert_eq!(robo_timing::ensure_safe_default().get(), expected);
    assert_eq!(
        robo_timing::cycles_per_us().map(NonZeroU64::get),
        Some(expected)
    );

    assert_eq!(
        robo_timing::ticks_to_micros(expected * 1_000).unwrap(),
        1_000
    );
}
