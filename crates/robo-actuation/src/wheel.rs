//! Wheel: a signed speed applied to one DC motor port.
//!
//! Positive speeds drive forward, negative speeds backward, zero releases
//! the motor. The magnitude is the PWM speed, clamped to 0..=255.

use crate::{MotorCommand, MotorDriver, MAX_DC_SPEED};
use robo_common::config::WheelConfig;
use robo_common::{RoboError, RoboResult};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Driver handle shared by all wheels on one board.
pub type SharedDriver<D> = Arc<Mutex<D>>;

/// One driven wheel.
///
/// Not `Clone`: two handles to the same motor port would fight over it.
#[derive(Debug)]
pub struct Wheel<D: MotorDriver> {
    driver: SharedDriver<D>,
    motor_id: Option<u8>,
    reversed: bool,
    speed: i32,
}

impl<D: MotorDriver> Wheel<D> {
    /// Create an uninitialized wheel on `driver`.
    pub fn new(driver: SharedDriver<D>) -> Self {
        Self {
            driver,
            motor_id: None,
            reversed: false,
            speed: 0,
        }
    }

    /// Create and initialize a wheel from configuration.
    pub fn from_config(driver: SharedDriver<D>, config: &WheelConfig) -> RoboResult<Self> {
        let mut wheel = Self::new(driver).with_reversed(config.reversed);
        wheel.initialize(config.id)?;
        Ok(wheel)
    }

    /// Swap forward and backward for a mirrored mount.
    #[must_use]
    pub fn with_reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    /// Attach to motor port `id` and release it.
    pub fn initialize(&mut self, id: u8) -> RoboResult<()> {
        if let Some(current) = self.motor_id {
            return Err(RoboError::Config(format!(
                "wheel already attached to motor {current}"
            )));
        }
        self.apply(id, MotorCommand::Release, 0)?;
        self.motor_id = Some(id);
        self.speed = 0;
        info!(motor = id, reversed = self.reversed, "Wheel initialized");
        Ok(())
    }

    /// Release the motor and detach. Does nothing if not initialized.
    pub fn shutdown(&mut self) -> RoboResult<()> {
        if let Some(id) = self.motor_id.take() {
            self.speed = 0;
            self.apply(id, MotorCommand::Release, 0)?;
            info!(motor = id, "Wheel shut down");
        }
        Ok(())
    }

    /// Drive at `speed` in -255..=255; larger magnitudes are clamped.
    pub fn set_speed(&mut self, speed: i32) -> RoboResult<()> {
        let id = self
            .motor_id
            .ok_or_else(|| RoboError::NotInitialized("wheel".into()))?;
        let speed = speed.clamp(-i32::from(MAX_DC_SPEED), i32::from(MAX_DC_SPEED));

        let command = self.get_cmd(speed);
        let dc_speed = Self::get_dc_speed(speed);
        self.apply(id, command, dc_speed)?;
        self.speed = speed;

        debug!(motor = id, speed, ?command, dc_speed, "Wheel speed set");
        Ok(())
    }

    /// Motor command for a signed speed, honouring the mount direction.
    #[must_use]
    pub fn get_cmd(&self, speed: i32) -> MotorCommand {
        match (speed.signum(), self.reversed) {
            (0, _) => MotorCommand::Release,
            (1, false) | (-1, true) => MotorCommand::Forward,
            _ => MotorCommand::Backward,
        }
    }

    /// PWM speed for a signed speed: the magnitude, clamped to 255.
    #[must_use]
    pub fn get_dc_speed(speed: i32) -> u8 {
        u8::try_from(speed.unsigned_abs()).unwrap_or(MAX_DC_SPEED)
    }

    /// Last speed applied.
    pub fn speed(&self) -> i32 {
        self.speed
    }

    /// Motor port, if initialized.
    pub fn motor_id(&self) -> Option<u8> {
        self.motor_id
    }

    fn apply(&self, id: u8, command: MotorCommand, dc_speed: u8) -> RoboResult<()> {
        let mut driver = self
            .driver
            .lock()
            .map_err(|_| RoboError::Actuation("motor driver lock poisoned".into()))?;
        driver.set_motor(id, command, dc_speed)
    }
}

impl<D: MotorDriver> Drop for Wheel<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Failed to release wheel motor on drop");
        }
    }
}
