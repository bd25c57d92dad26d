//! Acceptance scenarios.

mod calibration_test;
mod common;
mod process_state_test;
mod tick_test;
