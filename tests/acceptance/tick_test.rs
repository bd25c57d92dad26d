//! Cycle source behaviour on the host.

use robo_timing::{now, CalibrationCell, MonotonicClock, Stopwatch, TickSource};
use std::time::{Duration, Instant};

#[test]
fn test_consecutive_samples_non_decreasing() {
    let first = now();
    let second = now();
    assert!(second >= first);

    let clock = MonotonicClock;
    let first = clock.now();
    let second = clock.now();
    assert!(second >= first);
}

#[test]
fn test_monotonic_clock_counts_microseconds() {
    let clock = MonotonicClock;
    let wall = Instant::now();
    let start = clock.now();
    std::thread::sleep(Duration::from_millis(20));
    let delta = clock.now().wrapping_delta(start);
    let wall_us = wall.elapsed().as_micros() as u64;

    assert!(delta >= 19_000, "delta {delta}us");
    assert!(delta <= wall_us + 1_000, "delta {delta}us vs wall {wall_us}us");
}

#[test]
fn test_monotonic_deltas_convert_one_to_one() {
    // A cell holding 1 cycle/us makes MonotonicClock deltas convert 1:1.
    let cell = CalibrationCell::new();
    cell.try_set(1).unwrap();

    let clock = MonotonicClock;
    let watch = Stopwatch::started_at(clock.now());
    std::thread::sleep(Duration::from_millis(5));
    let ticks = clock.now().wrapping_delta(watch.start_tick());

    assert_eq!(cell.ticks_to_micros(ticks).unwrap(), ticks);
    assert!(cell.ticks_to_duration(ticks).unwrap() >= Duration::from_millis(4));
}

#[cfg(not(target_arch = "x86_64"))]
#[test]
fn test_stopwatch_with_microsecond_calibration() {
    // Native ticks are microseconds here, so 1 cycle/us is exact.
    let cell = CalibrationCell::new();
    cell.try_set(1).unwrap();

    let watch = Stopwatch::start();
    let wall = Instant::now();
    std::thread::sleep(Duration::from_millis(5));

    let elapsed = watch.elapsed_with(&cell).unwrap();
    let micros = watch.elapsed_micros_with(&cell).unwrap();
    assert!(elapsed >= Duration::from_millis(4));
    assert!(elapsed <= wall.elapsed() + Duration::from_millis(1));
    assert!(micros >= 4_000);
}
