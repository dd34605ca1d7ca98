// Duty scaling, timing, safety inputs and loadable runtime settings
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// Logical duty range (10-bit PWM)
pub const DUTY_MAX: u16 = 1023;

// Deadband floor for continuous driving; any nonzero duty is raised to at least this
pub const MIN_DUTY: u16 = 300;

// Executor tick (20 Hz)
pub const TICK: Duration = Duration::from_millis(50);

// Stop-release polling interval
pub const DEBOUNCE: Duration = Duration::from_millis(100);

// PWM carrier frequency used when binding a profile
pub const PWM_FREQ_HZ: u32 = 1000;

// Servo outputs: 50 Hz, duty SERVO_MIN_DUTY..SERVO_MIN_DUTY + SERVO_SPAN over position 0..1
pub const SERVO_FREQ_HZ: u32 = 50;
pub const SERVO_MIN_DUTY: u16 = 40;
pub const SERVO_SPAN: u16 = 75;

// Safety inputs
pub const START_PIN: u8 = 34; // pull-down, pressed = high
pub const STOP_PIN: u8 = 0; // pull-up, pressed = low

/// Which logic level means "asserted" for a digital input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    /// Interpret a raw pin level.
    pub fn is_asserted(self, high: bool) -> bool {
        match self {
            Polarity::ActiveHigh => high,
            Polarity::ActiveLow => !high,
        }
    }
}

/// Start/stop input wiring and stop handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    pub start_pin: u8,
    pub stop_pin: u8,
    pub start_polarity: Polarity,
    pub stop_polarity: Polarity,
    pub debounce_ms: u64,
    /// After a stop is released, rebuild the active profile from scratch
    /// instead of resuming in place.
    pub restart_on_stop: bool,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            start_pin: START_PIN,
            stop_pin: STOP_PIN,
            start_polarity: Polarity::ActiveHigh,
            stop_polarity: Polarity::ActiveLow,
            debounce_ms: DEBOUNCE.as_millis() as u64,
            restart_on_stop: false,
        }
    }
}

impl SafetySettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Runtime settings. Every field falls back to the constants above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub min_duty: u16,
    pub tick_ms: u64,
    pub pwm_freq_hz: u32,
    pub safety: SafetySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_duty: MIN_DUTY,
            tick_ms: TICK.as_millis() as u64,
            pwm_freq_hz: PWM_FREQ_HZ,
            safety: SafetySettings::default(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Executor tick; a zero tick would never advance the duration loop.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Deadband floor, never above the duty range.
    pub fn min_duty(&self) -> u16 {
        self.min_duty.min(DUTY_MAX)
    }
}
