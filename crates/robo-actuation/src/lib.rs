//! Actuation layer: DC motor drivers and wheels.
//!
//! This crate provides:
//! - [`MotorDriver`] trait for boards that drive DC motor ports
//! - [`SimulatedDriver`] that records commands in memory
//! - [`wheel`] module mapping signed wheel speeds onto motor commands

pub mod wheel;

pub use wheel::*;

use robo_common::{RoboError, RoboResult};

/// Highest PWM speed a motor port accepts.
pub const MAX_DC_SPEED: u8 = u8::MAX;

/// Direction command for a DC motor port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorCommand {
    /// Drive forward at the given speed.
    Forward,
    /// Drive backward at the given speed.
    Backward,
    /// Short the motor terminals.
    Brake,
    /// Let the motor coast.
    #[default]
    Release,
}

/// Motor driver abstraction.
///
/// A driver owns the bus to one motor board; wheels address motors on it by port id.
pub trait MotorDriver: Send {
    /// Bring up the driver board.
    fn init(&mut self) -> RoboResult<()>;

    /// Apply `command` at `speed` to motor port `motor_id`.
    fn set_motor(&mut self, motor_id: u8, command: MotorCommand, speed: u8) -> RoboResult<()>;

    /// Release every motor and shut the board down.
    fn shutdown(&mut self) -> RoboResult<()>;

    /// Check if the driver is operational.
    fn is_operational(&self) -> bool {
        true
    }
}

/// Last state written to one simulated motor port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorState {
    /// Last command.
    pub command: MotorCommand,
    /// Last speed.
    pub speed: u8,
}

/// Number of ports on the simulated board.
pub const SIMULATED_PORTS: usize = 4;

/// In-memory driver with four ports, numbered 1 to 4.
#[derive(Debug, Default)]
pub struct SimulatedDriver {
    initialized: bool,
    motors: [MotorState; SIMULATED_PORTS],
    commands_sent: u64,
}

impl SimulatedDriver {
    /// Create a new simulated driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// State of port `motor_id`, if it exists.
    pub fn motor(&self, motor_id: u8) -> Option<MotorState> {
        port_index(motor_id).map(|idx| self.motors[idx])
    }

    /// Total motor commands accepted.
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }
}

fn port_index(motor_id: u8) -> Option<usize> {
    let idx = usize::from(motor_id).checked_sub(1)?;
    (idx < SIMULATED_PORTS).then_some(idx)
}

impl MotorDriver for SimulatedDriver {
    fn init(&mut self) -> RoboResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn set_motor(&mut self, motor_id: u8, command: MotorCommand, speed: u8) -> RoboResult<()> {
        if !self.initialized {
            return Err(RoboError::NotInitialized("simulated motor driver".into()));
        }
        let idx = port_index(motor_id)
            .ok_or_else(|| RoboError::Actuation(format!("no motor port {motor_id}")))?;
        self.motors[idx] = MotorState { command, speed };
        self.commands_sent += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> RoboResult<()> {
        self.motors = [MotorState::default(); SIMULATED_PORTS];
        self.initialized = false;
        Ok(())
    }

    fn is_operational(&self) -> bool {
        self.initialized
    }
}
