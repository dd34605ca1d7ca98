// Direction/duty pin pair for one driven wheel

use std::collections::BTreeMap;

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use tracing::{debug, warn};

use super::profile::PinPair;
use crate::config::DUTY_MAX;
use crate::error::HardwareError;
use crate::messages::Role;

/// A single driven wheel. Owns its direction and duty outputs.
pub struct MotorChannel<O, P> {
    role: Role,
    pins: PinPair,
    dir: O,
    pwm: P,
    direction: bool,
    duty: u16,
}

impl<O, P> MotorChannel<O, P>
where
    O: OutputPin,
    P: SetDutyCycle,
{
    /// Take ownership of the outputs and force them to rest
    /// (direction low, duty 0).
    pub fn bind(role: Role, pins: PinPair, dir: O, pwm: P) -> Result<Self, HardwareError> {
        let mut channel = Self {
            role,
            pins,
            dir,
            pwm,
            direction: true,
            duty: u16::MAX,
        };
        channel.set_direction(false)?;
        channel.set_duty(0)?;
        Ok(channel)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pins(&self) -> PinPair {
        self.pins
    }

    /// Last direction bit written.
    pub fn direction(&self) -> bool {
        self.direction
    }

    /// Last logical duty written, in [0, DUTY_MAX].
    pub fn duty(&self) -> u16 {
        self.duty
    }

    pub fn set_direction(&mut self, bit: bool) -> Result<(), HardwareError> {
        let result = if bit {
            self.dir.set_high()
        } else {
            self.dir.set_low()
        };
        result.map_err(|e| HardwareError::new(self.pins.dir, format!("{e:?}")))?;
        self.direction = bit;
        Ok(())
    }

    /// Write a logical duty, clamped to [0, DUTY_MAX] and scaled onto the
    /// hardware range.
    pub fn set_duty(&mut self, duty: u16) -> Result<(), HardwareError> {
        let duty = duty.min(DUTY_MAX);
        if duty == self.duty {
            return Ok(());
        }
        let max = self.pwm.max_duty_cycle();
        let raw = (u32::from(duty) * u32::from(max) / u32::from(DUTY_MAX)) as u16;
        self.pwm
            .set_duty_cycle(raw)
            .map_err(|e| HardwareError::new(self.pins.pwm, format!("{e:?}")))?;
        debug!("{}: duty={} (raw {}/{})", self.role, duty, raw, max);
        self.duty = duty;
        Ok(())
    }

    /// Zero the duty output. Failures are logged, never returned.
    pub fn halt(&mut self) {
        if let Err(e) = self.set_duty(0) {
            warn!("Failed to halt {}: {}", self.role, e);
        }
    }
}

/// The live channel set of the active profile.
pub struct ChannelSet<O, P> {
    channels: BTreeMap<Role, MotorChannel<O, P>>,
}

impl<O, P> Default for ChannelSet<O, P> {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }
}

impl<O, P> ChannelSet<O, P>
where
    O: OutputPin,
    P: SetDutyCycle,
{
    pub fn insert(&mut self, channel: MotorChannel<O, P>) {
        self.channels.insert(channel.role(), channel);
    }

    pub fn get(&self, role: Role) -> Option<&MotorChannel<O, P>> {
        self.channels.get(&role)
    }

    pub fn get_mut(&mut self, role: Role) -> Option<&mut MotorChannel<O, P>> {
        self.channels.get_mut(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.channels.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotorChannel<O, P>> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn halt(&mut self, role: Role) {
        if let Some(channel) = self.channels.get_mut(&role) {
            channel.halt();
        }
    }

    /// Zero every duty output.
    pub fn halt_all(&mut self) {
        for channel in self.channels.values_mut() {
            channel.halt();
        }
    }

    /// True when every channel is at rest.
    pub fn is_idle(&self) -> bool {
        self.channels.values().all(|c| c.duty() == 0)
    }
}
