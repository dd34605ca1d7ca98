// Positional servo on a 50 Hz duty output

use embedded_hal::pwm::SetDutyCycle;
use tracing::debug;

use crate::config::{DUTY_MAX, SERVO_MIN_DUTY, SERVO_SPAN};
use crate::error::HardwareError;

/// Logical duty for a position in [0, 1]. Out-of-range positions are
/// clamped; NaN is treated as 0.
pub fn position_duty(position: f32) -> u16 {
    let position = if position.is_nan() {
        0.0
    } else {
        position.clamp(0.0, 1.0)
    };
    (f32::from(SERVO_MIN_DUTY) + position * f32::from(SERVO_SPAN)) as u16
}

pub struct Servo<P> {
    pin: u8,
    pwm: P,
    position: Option<f32>,
}

impl<P: SetDutyCycle> Servo<P> {
    /// Take the output without moving the horn; nothing is written until
    /// the first [`set_position`](Self::set_position).
    pub fn bind(pin: u8, pwm: P) -> Self {
        Self {
            pin,
            pwm,
            position: None,
        }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Last commanded position, after clamping.
    pub fn position(&self) -> Option<f32> {
        self.position
    }

    /// Move to `position`. Returns the logical duty written.
    pub fn set_position(&mut self, position: f32) -> Result<u16, HardwareError> {
        let duty = position_duty(position);
        let max = self.pwm.max_duty_cycle();
        let raw = (u32::from(duty) * u32::from(max) / u32::from(DUTY_MAX)) as u16;
        self.pwm
            .set_duty_cycle(raw)
            .map_err(|e| HardwareError::new(self.pin, format!("{e:?}")))?;
        let clamped = if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) };
        debug!("servo {}: position={} duty={} (raw {}/{})", self.pin, clamped, duty, raw, max);
        self.position = Some(clamped);
        Ok(duty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SERVO_FREQ_HZ;
    use crate::motor::board::Board;
    use crate::motor::sim::{PinMode, SimBoard};

    #[test]
    fn test_position_duty_range() {
        assert_eq!(position_duty(0.0), 40);
        assert_eq!(position_duty(0.5), 77);
        assert_eq!(position_duty(1.0), 115);
        assert_eq!(position_duty(-0.3), 40);
        assert_eq!(position_duty(7.0), 115);
        assert_eq!(position_duty(f32::NAN), 40);
    }

    #[test]
    fn test_bind_writes_nothing() {
        let mut board = SimBoard::new();
        let servo = Servo::bind(33, board.pwm(33, SERVO_FREQ_HZ).unwrap());
        assert_eq!(servo.position(), None);
        assert!(board.trace().is_empty());
        assert_eq!(board.pin(33).mode, PinMode::Pwm { freq_hz: 50 });
    }

    #[test]
    fn test_set_position_scales_to_hardware() {
        let mut board = SimBoard::with_max_duty(4095);
        let mut servo = Servo::bind(32, board.pwm(32, SERVO_FREQ_HZ).unwrap());

        assert_eq!(servo.set_position(1.5).unwrap(), 115);
        assert_eq!(servo.position(), Some(1.0));
        assert_eq!(board.duty(32), 460);

        assert_eq!(servo.set_position(0.0).unwrap(), 40);
        assert_eq!(board.duty(32), 160);
    }
}
