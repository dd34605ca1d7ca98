// Pin provider for a concrete controller board
//
// Profiles name pins by GPIO number; the board hands out embedded-hal
// handles for them. A pin may be acquired more than once (the fail-safe
// sweep touches pins that the next profile binds again).

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;

use crate::error::HardwareError;

/// Input bias for the start/stop lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
    None,
}

pub trait Board {
    type Output: OutputPin;
    type Pwm: SetDutyCycle;
    type Input: InputPin;

    /// Configure `pin` as a push-pull output.
    fn output(&mut self, pin: u8) -> Result<Self::Output, HardwareError>;

    /// Configure `pin` as a PWM output running at `freq_hz`.
    fn pwm(&mut self, pin: u8, freq_hz: u32) -> Result<Self::Pwm, HardwareError>;

    /// Configure `pin` as a digital input.
    fn input(&mut self, pin: u8, pull: Pull) -> Result<Self::Input, HardwareError>;
}
