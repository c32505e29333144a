use tracing::debug;

use crate::{
    datatypes::{FanMode, PulseTrain},
    error::{Error, Result},
};

/// Speed used by a fast-on request
pub const FAST_ON_SPEED: u8 = 3;

/// The narrow interface between an adapter and the radio core.
pub trait RemoteActions {
    /// Look up the pulse train for a command name
    fn resolve_command(&self, name: &str) -> Result<&PulseTrain>;

    /// Transmit a command using the remote's resend policy
    fn send(&mut self, name: &str) -> Result<()>;

    fn pin(&self) -> u8;

    /// Move the remote to another GPIO pin
    fn rebind(&mut self, pin: u8) -> Result<()>;
}

/// A multi-speed fan with a summer/winter mode.
///
/// Implementors provide the state and `apply_speed`; the host-facing
/// transitions are built on top of them.
pub trait Fan {
    fn speed(&self) -> u8;

    fn max_speed(&self) -> u8;

    fn mode(&self) -> FanMode;

    /// Speed restored by `turn_on` when the fan is off
    fn last_on_speed(&self) -> u8;

    /// Transmit the command for `speed` in the current mode and record it
    fn apply_speed(&mut self, speed: u8) -> Result<()>;

    /// Select the command table for later speed changes. Does not transmit.
    fn set_mode(&mut self, mode: FanMode);

    fn is_on(&self) -> bool {
        self.speed() > 0
    }

    fn turn_on(&mut self) -> Result<()> {
        let speed = if self.is_on() {
            self.speed()
        } else {
            self.last_on_speed()
        };
        self.apply_speed(speed)
    }

    fn turn_off(&mut self) -> Result<()> {
        self.apply_speed(0)
    }

    fn fast_on(&mut self) -> Result<()> {
        self.apply_speed(FAST_ON_SPEED.min(self.max_speed()))
    }

    fn increase_speed(&mut self) -> Result<()> {
        let speed = self.speed().saturating_add(1).min(self.max_speed());
        self.apply_speed(speed)
    }

    fn decrease_speed(&mut self) -> Result<()> {
        self.apply_speed(self.speed().saturating_sub(1))
    }

    fn set_speed(&mut self, value: u32) -> Result<()> {
        let max = self.max_speed();
        if value > u32::from(max) {
            debug!(value, max, "rejecting speed");
            return Err(Error::InvalidSpeed { value, max });
        }
        self.apply_speed(value as u8)
    }
}
