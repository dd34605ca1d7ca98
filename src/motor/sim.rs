// In-memory board for simulation and tests
//
// All handles share one state: per-pin level/duty, a timestamped write
// trace, scripted input levels and a virtual clock advanced by SimDelay.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as DigitalErrorType, InputPin, OutputPin};
use embedded_hal::pwm::{ErrorType as PwmErrorType, SetDutyCycle};

use super::board::{Board, Pull};
use crate::config::DUTY_MAX;
use crate::error::HardwareError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PinMode {
    #[default]
    Unused,
    Output,
    Pwm { freq_hz: u32 },
    Input(Pull),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinState {
    pub mode: PinMode,
    pub high: bool,
    pub duty: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Level(bool),
    Duty(u16),
}

/// One recorded pin write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Write {
    pub at: Duration,
    pub pin: u8,
    pub kind: WriteKind,
}

#[derive(Debug)]
struct Inner {
    now: Duration,
    max_duty: u16,
    pins: BTreeMap<u8, PinState>,
    trace: Vec<Write>,
    inputs: BTreeMap<u8, Vec<(Duration, bool)>>,
    faulty: BTreeSet<u8>,
}

impl Inner {
    fn acquire(&mut self, pin: u8, mode: PinMode) -> Result<(), HardwareError> {
        if self.faulty.contains(&pin) {
            return Err(HardwareError::new(pin, "simulated fault"));
        }
        self.pins.entry(pin).or_default().mode = mode;
        Ok(())
    }

    fn write(&mut self, pin: u8, kind: WriteKind) {
        let state = self.pins.entry(pin).or_default();
        match kind {
            WriteKind::Level(high) => state.high = high,
            WriteKind::Duty(duty) => state.duty = duty,
        }
        self.trace.push(Write {
            at: self.now,
            pin,
            kind,
        });
    }

    fn input_level(&self, pin: u8) -> bool {
        let scripted = self
            .inputs
            .get(&pin)
            .and_then(|events| events.iter().rev().find(|(at, _)| *at <= self.now))
            .map(|&(_, high)| high);
        scripted.unwrap_or(matches!(
            self.pins.get(&pin).map(|s| s.mode),
            Some(PinMode::Input(Pull::Up))
        ))
    }
}

/// Simulated controller board.
#[derive(Debug, Clone)]
pub struct SimBoard {
    inner: Rc<RefCell<Inner>>,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self::with_max_duty(DUTY_MAX)
    }

    /// Board whose PWM peripheral reports `max_duty` as its full scale.
    pub fn with_max_duty(max_duty: u16) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                now: Duration::ZERO,
                max_duty,
                pins: BTreeMap::new(),
                trace: Vec::new(),
                inputs: BTreeMap::new(),
                faulty: BTreeSet::new(),
            })),
        }
    }

    /// Delay source that advances this board's clock.
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            inner: Rc::clone(&self.inner),
        }
    }

    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    pub fn pin(&self, pin: u8) -> PinState {
        self.inner.borrow().pins.get(&pin).copied().unwrap_or_default()
    }

    pub fn duty(&self, pin: u8) -> u16 {
        self.pin(pin).duty
    }

    pub fn level(&self, pin: u8) -> bool {
        self.pin(pin).high
    }

    pub fn trace(&self) -> Vec<Write> {
        self.inner.borrow().trace.clone()
    }

    pub fn clear_trace(&self) {
        self.inner.borrow_mut().trace.clear();
    }

    /// Force a pin to a level/duty without going through a handle, e.g. to
    /// model an actuator left energized by a crash.
    pub fn poke(&self, pin: u8, high: bool, duty: u16) {
        let mut inner = self.inner.borrow_mut();
        let state = inner.pins.entry(pin).or_default();
        state.high = high;
        state.duty = duty;
    }

    /// Drive an input line from now on.
    pub fn set_input(&self, pin: u8, high: bool) {
        let now = self.now();
        self.schedule(pin, now, high);
    }

    /// Drive an input line starting at `at` on the virtual clock.
    pub fn schedule(&self, pin: u8, at: Duration, high: bool) {
        let mut inner = self.inner.borrow_mut();
        let events = inner.inputs.entry(pin).or_default();
        events.push((at, high));
        events.sort_by_key(|&(at, _)| at);
    }

    /// Make every later acquisition of `pin` fail.
    pub fn fail_pin(&self, pin: u8) {
        self.inner.borrow_mut().faulty.insert(pin);
    }
}

impl Board for SimBoard {
    type Output = SimOutput;
    type Pwm = SimPwm;
    type Input = SimInput;

    fn output(&mut self, pin: u8) -> Result<SimOutput, HardwareError> {
        self.inner.borrow_mut().acquire(pin, PinMode::Output)?;
        Ok(SimOutput {
            pin,
            inner: Rc::clone(&self.inner),
        })
    }

    fn pwm(&mut self, pin: u8, freq_hz: u32) -> Result<SimPwm, HardwareError> {
        self.inner
            .borrow_mut()
            .acquire(pin, PinMode::Pwm { freq_hz })?;
        Ok(SimPwm {
            pin,
            inner: Rc::clone(&self.inner),
        })
    }

    fn input(&mut self, pin: u8, pull: Pull) -> Result<SimInput, HardwareError> {
        self.inner.borrow_mut().acquire(pin, PinMode::Input(pull))?;
        Ok(SimInput {
            pin,
            inner: Rc::clone(&self.inner),
        })
    }
}

#[derive(Debug)]
pub struct SimOutput {
    pin: u8,
    inner: Rc<RefCell<Inner>>,
}

impl DigitalErrorType for SimOutput {
    type Error = Infallible;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.inner.borrow_mut().write(self.pin, WriteKind::Level(false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.inner.borrow_mut().write(self.pin, WriteKind::Level(true));
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimPwm {
    pin: u8,
    inner: Rc<RefCell<Inner>>,
}

impl PwmErrorType for SimPwm {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.inner.borrow().max_duty
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.inner.borrow_mut().write(self.pin, WriteKind::Duty(duty));
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimInput {
    pin: u8,
    inner: Rc<RefCell<Inner>>,
}

impl DigitalErrorType for SimInput {
    type Error = Infallible;
}

impl InputPin for SimInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.inner.borrow().input_level(self.pin))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.inner.borrow().input_level(self.pin))
    }
}

/// Blocking delay on the simulated clock. Returns immediately.
#[derive(Debug, Clone)]
pub struct SimDelay {
    inner: Rc<RefCell<Inner>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.inner.borrow_mut().now += Duration::from_nanos(u64::from(ns));
    }
}
