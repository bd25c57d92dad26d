//! Robot controller daemon entry point.
//!
//! Calibrates the cycle counter once at startup, then drives the configured
//! wheels from a fixed-period control loop timed with native ticks.

mod signals;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use robo_actuation::{MotorDriver, SharedDriver, SimulatedDriver, Wheel};
use robo_common::config::{ControlConfig, RoboConfig};
use robo_common::metrics::LoopMetrics;
use robo_timing::{Stopwatch, TickUnit, NATIVE_UNIT};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::signals::SignalHandler;

/// Robot controller command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "robo-daemon",
    about = "Robot controller daemon - calibrated wheel control loop",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum loop iterations to run (0 = infinite).
    #[arg(long, default_value = "0")]
    max_cycles: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// Calibrate the cycle counter, report, and exit.
    #[arg(long)]
    calibrate_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting robot controller");

    let config = load_config(&args)?;
    info!(
        period = ?config.control.loop_period,
        wheels = config.wheels.len(),
        "Configuration loaded"
    );

    let timing = calibrate_timing(&config)?;
    if args.calibrate_only {
        info!(?timing, "Calibration complete");
        return Ok(());
    }
    if timing == LoopTiming::WallClock {
        warn!("Cycle counter is uncalibrated, control loop is paced by the monotonic clock");
    }

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    let driver: SharedDriver<SimulatedDriver> = Arc::new(Mutex::new(SimulatedDriver::new()));
    lock_driver(&driver)?
        .init()
        .context("Failed to initialize motor driver")?;
    info!("Simulated motor driver initialized");

    let mut wheels = config
        .wheels
        .iter()
        .map(|wheel| {
            Wheel::from_config(Arc::clone(&driver), wheel)
                .map(|w| (w, wheel.speed))
                .with_context(|| format!("Failed to initialize wheel on motor {}", wheel.id))
        })
        .collect::<Result<Vec<_>>>()?;

    let outcome = run_control_loop(&config.control, timing, &mut wheels, args.max_cycles, || {
        signal_handler.shutdown_requested()
    });

    info!("Shutting down...");
    for (wheel, _) in &mut wheels {
        if let Err(e) = wheel.shutdown() {
            warn!("Wheel shutdown failed: {}", e);
        }
    }
    if let Err(e) = lock_driver(&driver)?.shutdown() {
        warn!("Motor driver shutdown failed: {}", e);
    }

    let metrics = outcome?;
    info!(
        iterations = metrics.iterations(),
        overruns = metrics.overrun_count(),
        mean_us = metrics.mean().map(|d| d.as_micros()).unwrap_or(0),
        max_us = metrics.max().map(|d| d.as_micros()).unwrap_or(0),
        p99_us = metrics.percentile(99.0).map(|d| d.as_micros()).unwrap_or(0),
        signals = signal_handler.signal_count(),
        "Controller shutdown complete"
    );

    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "robo_daemon={},robo_timing={},robo_actuation={},robo_common={}",
        level, level, level, level
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `ROBO_CONFIG_PATH` environment variable
/// 3. `/etc/robo/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<RoboConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return RoboConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    if let Ok(env_path) = std::env::var("ROBO_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from ROBO_CONFIG_PATH");
            return RoboConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from ROBO_CONFIG_PATH={:?}", env_path)
            });
        }
        warn!(
            path = %env_path,
            "ROBO_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/robo/config.toml", "config/default.toml"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!(?path, "Loading config");
            return RoboConfig::from_file(&path)
                .with_context(|| format!("Failed to load config from {:?}", path));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(RoboConfig::default())
}

/// How the control loop measures its busy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopTiming {
    /// Native ticks converted through the calibrated rate.
    Ticks,
    /// Monotonic wall clock; cycle ticks at the pinned 1 cycle/us would
    /// read every iteration as an overrun.
    WallClock,
}

impl LoopTiming {
    fn for_calibration(calibrated: bool, native_unit: TickUnit) -> Self {
        if calibrated || native_unit == TickUnit::Microseconds {
            Self::Ticks
        } else {
            Self::WallClock
        }
    }
}

/// Calibrate the process-wide cycle counter state.
///
/// A failed or degraded calibration leaves timing usable at 1 cycle/us
/// unless `fail_on_degraded_timing` is set.
fn calibrate_timing(config: &RoboConfig) -> Result<LoopTiming> {
    match robo_timing::initialize_with(&config.timing) {
        Ok(cycles_per_us) => {
            info!(cycles_per_us = cycles_per_us.get(), "Cycle counter calibrated");
            Ok(LoopTiming::for_calibration(true, NATIVE_UNIT))
        }
        Err(e) => {
            error!(error = %e, code = e.code(), "Timing degraded: calibration failed");
            if config.control.fail_on_degraded_timing {
                return Err(anyhow::Error::new(e).context("CPU frequency calibration failed"));
            }
            let cycles_per_us = robo_timing::ensure_safe_default();
            info!(cycles_per_us = cycles_per_us.get(), "Continuing with default rate");
            Ok(LoopTiming::for_calibration(false, NATIVE_UNIT))
        }
    }
}

fn lock_driver<D: MotorDriver>(driver: &SharedDriver<D>) -> Result<std::sync::MutexGuard<'_, D>> {
    driver
        .lock()
        .map_err(|_| anyhow!("motor driver lock poisoned"))
}

/// Run the wheel control loop until `should_stop` or `max_cycles`.
///
/// Each iteration applies every wheel's cruise speed, records the busy time
/// and sleeps for the rest of the period.
fn run_control_loop<D, F>(
    control: &ControlConfig,
    timing: LoopTiming,
    wheels: &mut [(Wheel<D>, i32)],
    max_cycles: u64,
    should_stop: F,
) -> Result<LoopMetrics>
where
    D: MotorDriver,
    F: Fn() -> bool,
{
    let mut metrics = LoopMetrics::new(control.histogram_size, control.loop_period);
    let mut cycles = 0u64;

    info!(
        period_us = control.loop_period.as_micros(),
        ?timing,
        wheels = wheels.len(),
        "Entering control loop"
    );

    while !should_stop() {
        let iteration = Stopwatch::start();
        let wall = Instant::now();

        for (wheel, speed) in wheels.iter_mut() {
            wheel.set_speed(*speed).context("Failed to drive wheel")?;
        }

        let busy = match timing {
            LoopTiming::Ticks => iteration
                .elapsed()
                .context("Tick conversion before calibration")?,
            LoopTiming::WallClock => wall.elapsed(),
        };
        let busy_us = u64::try_from(busy.as_micros()).unwrap_or(u64::MAX);
        metrics.record_us(busy_us);

        if busy > control.loop_period {
            warn!(cycle = cycles, busy_us, "Control loop overrun");
        }

        cycles += 1;
        if max_cycles > 0 && cycles >= max_cycles {
            info!(cycles, "Maximum cycle count reached");
            break;
        }

        if cycles % 1000 == 0 {
            info!(
                cycles,
                avg_us = metrics.mean().map(|d| d.as_micros()).unwrap_or(0),
                max_us = metrics.max().map(|d| d.as_micros()).unwrap_or(0),
                overruns = metrics.overrun_count(),
                "Periodic status"
            );
        }

        std::thread::sleep(control.loop_period.saturating_sub(busy));
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use robo_actuation::MotorCommand;
    use robo_common::config::WheelConfig;
    use std::time::Duration;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["robo-daemon", "--calibrate-only"]);
        assert!(args.calibrate_only);
        assert!(args.config.is_none());
        assert_eq!(args.max_cycles, 0);
    }

    #[test]
    fn test_args_with_config() {
        let args = Args::parse_from(["robo-daemon", "-c", "robot.toml", "--max-cycles", "50"]);
        assert_eq!(args.config, Some(PathBuf::from("robot.toml")));
        assert_eq!(args.max_cycles, 50);
    }

    #[test]
    fn test_control_loop_drives_wheels() {
        robo_timing::ensure_safe_default();

        let mut driver = SimulatedDriver::new();
        driver.init().unwrap();
        let driver = Arc::new(Mutex::new(driver));

        let configs = [
            WheelConfig {
                id: 1,
                reversed: false,
                speed: 100,
            },
            WheelConfig {
                id: 2,
                reversed: true,
                speed: 100,
            },
        ];
        let mut wheels: Vec<_> = configs
            .iter()
            .map(|c| (Wheel::from_config(Arc::clone(&driver), c).unwrap(), c.speed))
            .collect();

        let control = ControlConfig {
            loop_period: Duration::from_millis(1),
            ..Default::default()
        };
        let metrics = run_control_loop(&control, LoopTiming::Ticks, &mut wheels, 3, || false).unwrap();
        assert_eq!(metrics.iterations(), 3);

        let driver = driver.lock().unwrap();
        assert_eq!(driver.motor(1).unwrap().command, MotorCommand::Forward);
        assert_eq!(driver.motor(2).unwrap().command, MotorCommand::Backward);
        assert_eq!(driver.motor(2).unwrap().speed, 100);
    }

    #[test]
    fn test_control_loop_honours_stop() {
        robo_timing::ensure_safe_default();

        let mut wheels: Vec<(Wheel<SimulatedDriver>, i32)> = Vec::new();
        let metrics = run_control_loop(
            &ControlConfig::default(),
            LoopTiming::Ticks,
            &mut wheels,
            0,
            || true,
        )
        .unwrap();
        assert_eq!(metrics.iterations(), 0);
    }

    #[test]
    fn test_uncalibrated_cycles_use_wall_clock() {
        assert_eq!(
            LoopTiming::for_calibration(false, TickUnit::Cycles),
            LoopTiming::WallClock
        );
        assert_eq!(
            LoopTiming::for_calibration(false, TickUnit::Microseconds),
            LoopTiming::Ticks
        );
        assert_eq!(
            LoopTiming::for_calibration(true, TickUnit::Cycles),
            LoopTiming::Ticks
        );
    }

    #[test]
    fn test_wall_clock_loop_does_not_overrun() {
        let mut wheels: Vec<(Wheel<SimulatedDriver>, i32)> = Vec::new();
        let control = ControlConfig {
            loop_period: Duration::from_millis(50),
            ..Default::default()
        };
        let metrics =
            run_control_loop(&control, LoopTiming::WallClock, &mut wheels, 3, || false).unwrap();
        assert_eq!(metrics.iterations(), 3);
        assert_eq!(metrics.overrun_count(), 0);
    }
}
