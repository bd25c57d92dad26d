//! Calibration from CPU description files.

use super::common::{write_cpuinfo, x86_cpuinfo, ARM_CPUINFO};
use robo_common::{status_code, TimingError};
use robo_timing::{CalibrationCell, Calibrator};
use std::num::NonZeroU64;
use std::time::Duration;

#[test]
fn test_well_formed_description_calibrates() {
    let file = write_cpuinfo(&x86_cpuinfo("2400.0"));
    let cell = CalibrationCell::new();

    let result = Calibrator::new(file.path()).calibrate(&cell);
    assert_eq!(status_code(&result), 0);
    assert_eq!(cell.get().map(NonZeroU64::get), Some(2400));
}

#[test]
fn test_end_to_end_scenario() {
    let file = write_cpuinfo("processor\t: 0\ncpu MHz\t\t: 1000.000\ncache size\t: 256 KB\n");
    let cell = CalibrationCell::new();

    let result = Calibrator::new(file.path()).calibrate(&cell);
    assert_eq!(status_code(&result), 0);
    assert_eq!(cell.get().map(NonZeroU64::get), Some(1000));

    assert_eq!(cell.ticks_to_micros(1_000_000).unwrap(), 1_000);
    assert_eq!(
        cell.ticks_to_duration(1_000_000).unwrap(),
        Duration::from_millis(1)
    );
}

#[test]
fn test_second_calibration_after_success() {
    let file = write_cpuinfo(&x86_cpuinfo("3600.000"));
    let cell = CalibrationCell::new();
    let calibrator = Calibrator::new(file.path());

    calibrator.calibrate(&cell).unwrap();
    let err = calibrator.calibrate(&cell).unwrap_err();

    assert!(matches!(err, TimingError::AlreadyInitialized));
    assert_eq!(err.code(), libc::EINVAL);
    assert_eq!(cell.get().map(NonZeroU64::get), Some(3600));
}

#[test]
fn test_second_calibration_after_degraded() {
    let file = write_cpuinfo(&x86_cpuinfo("0.4"));
    let cell = CalibrationCell::new();
    let calibrator = Calibrator::new(file.path());

    let err = calibrator.calibrate(&cell).unwrap_err();
    assert!(err.is_degraded());
    assert_ne!(err.code(), 0);
    assert_eq!(cell.get().map(NonZeroU64::get), Some(1));

    let err = calibrator.calibrate(&cell).unwrap_err();
    assert!(matches!(err, TimingError::AlreadyInitialized));
    assert_eq!(cell.get().map(NonZeroU64::get), Some(1));
}

#[test]
fn test_missing_label_leaves_state_uninitialized() {
    let file = write_cpuinfo(ARM_CPUINFO);
    let cell = CalibrationCell::new();

    let err = Calibrator::new(file.path()).calibrate(&cell).unwrap_err();
    assert!(matches!(err, TimingError::MissingLabel));
    assert_eq!(err.code(), libc::EFAULT);
    assert!(cell.get().is_none());
}

#[test]
fn test_infinite_frequency_rejected() {
    let file = write_cpuinfo(&x86_cpuinfo("1e400"));
    let cell = CalibrationCell::new();

    let err = Calibrator::new(file.path()).calibrate(&cell).unwrap_err();
    assert!(matches!(err, TimingError::OutOfRange { .. }));
    assert!(cell.get().is_none());
}

#[test]
fn test_unreadable_source_reports_os_error() {
    let dir = tempfile::tempdir().unwrap();
    let cell = CalibrationCell::new();

    let err = Calibrator::new(dir.path().join("missing"))
        .calibrate(&cell)
        .unwrap_err();
    assert!(matches!(err, TimingError::Io { .. }));
    assert!(err.code() > 0);
    assert!(cell.get().is_none());
}

#[test]
fn test_read_error_reports_os_code() {
    let dir = tempfile::tempdir().unwrap();
    let cell = CalibrationCell::new();

    let err = Calibrator::new(dir.path()).calibrate(&cell).unwrap_err();
    assert!(matches!(err, TimingError::Io { .. }));
    assert_eq!(err.code(), libc::EISDIR);
    assert_eq!(status_code(&Err::<(), _>(err)), libc::EISDIR);
    assert!(cell.get().is_none());
}

#[test]
fn test_oversized_frequency_rejected() {
    let file = write_cpuinfo(&x86_cpuinfo("1e300"));
    let cell = CalibrationCell::new();

    let err = Calibrator::new(file.path()).calibrate(&cell).unwrap_err();
    assert!(matches!(err, TimingError::OutOfRange { .. }));
    assert!(cell.get().is_none());
}

#[test]
fn test_record_beyond_read_window_not_seen() {
    let mut contents = String::new();
    while contents.len() < 2048 {
        contents.push_str("flags\t\t: fpu vme de pse tsc msr pae mce cx8 apic sep mtrr\n");
    }
    contents.push_str("cpu MHz\t\t: 2400.0\n");
    let file = write_cpuinfo(&contents);
    let cell = CalibrationCell::new();

    let err = Calibrator::new(file.path()).calibrate(&cell).unwrap_err();
    assert!(matches!(err, TimingError::MissingLabel));

    let err = Calibrator::new(file.path())
        .with_read_buffer_size(contents.len() - 1)
        .calibrate(&cell)
        .unwrap_err();
    assert!(matches!(err, TimingError::UnterminatedValue));

    Calibrator::new(file.path())
        .with_read_buffer_size(contents.len())
        .calibrate(&cell)
        .unwrap();
    assert_eq!(cell.get().map(NonZeroU64::get), Some(2400));
}

