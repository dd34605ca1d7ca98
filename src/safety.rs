// Start/stop supervisor gating all actuation
//
// Two states, STOPPED (initial) and RUNNING. A stop press halts every
// channel at once and blocks until the button is released. Leaving STOPPED
// takes a fresh start press observed after the release; holding start
// through a stop does not count.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{Polarity, SafetySettings};
use crate::error::HardwareError;
use crate::motor::{Board, ChannelSet, Pull};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyState {
    Running,
    Stopped,
}

/// What a single poll changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Started,
    Stopped,
}

pub struct SafetySupervisor<I> {
    start: I,
    stop: I,
    start_polarity: Polarity,
    stop_polarity: Polarity,
    debounce: Duration,
    restart_on_stop: bool,
    state: SafetyState,
    // Start level seen at the previous poll. Begins asserted so that a
    // button held at power-up is not taken as a press.
    start_held: bool,
    restart_pending: bool,
    stop_read_failed: bool,
}

impl<I: InputPin> SafetySupervisor<I> {
    pub fn new(start: I, stop: I, settings: &SafetySettings) -> Self {
        Self {
            start,
            stop,
            start_polarity: settings.start_polarity,
            stop_polarity: settings.stop_polarity,
            debounce: settings.debounce().max(Duration::from_millis(1)),
            restart_on_stop: settings.restart_on_stop,
            state: SafetyState::Stopped,
            start_held: true,
            restart_pending: false,
            stop_read_failed: false,
        }
    }

    /// Acquire the start/stop inputs from `board`, biased towards their
    /// released level.
    pub fn from_board<B>(board: &mut B, settings: &SafetySettings) -> Result<Self, HardwareError>
    where
        B: Board<Input = I>,
    {
        let start = board.input(settings.start_pin, idle_pull(settings.start_polarity))?;
        let stop = board.input(settings.stop_pin, idle_pull(settings.stop_polarity))?;
        Ok(Self::new(start, stop, settings))
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SafetyState::Running
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Check both inputs once.
    ///
    /// A stop press halts `channels` before anything else and then blocks,
    /// polling every debounce interval, until the press is released.
    pub fn poll<O, P, D>(&mut self, channels: &mut ChannelSet<O, P>, delay: &mut D) -> Transition
    where
        O: OutputPin,
        P: SetDutyCycle,
        D: DelayNs,
    {
        if self.stop_asserted() {
            channels.halt_all();
            let was_running = self.is_running();
            self.state = SafetyState::Stopped;
            self.start_held = true;
            warn!("Stop asserted, all channels halted");

            let debounce_ms = u32::try_from(self.debounce.as_millis()).unwrap_or(u32::MAX);
            while self.stop_asserted() {
                delay.delay_ms(debounce_ms);
            }
            info!("Stop released");

            if self.restart_on_stop {
                self.restart_pending = true;
            }
            return if was_running {
                Transition::Stopped
            } else {
                Transition::Unchanged
            };
        }

        let start = self.start_asserted();
        let pressed = start && !self.start_held;
        self.start_held = start;

        if pressed && self.state == SafetyState::Stopped {
            self.state = SafetyState::Running;
            info!("Start pressed, running");
            return Transition::Started;
        }
        Transition::Unchanged
    }

    /// True once after a stop event when `restart_on_stop` is set.
    pub fn take_restart_request(&mut self) -> bool {
        std::mem::take(&mut self.restart_pending)
    }

    /// Return to the power-up state: STOPPED, waiting for a fresh start press.
    pub fn reset(&mut self) {
        self.state = SafetyState::Stopped;
        self.start_held = true;
        self.restart_pending = false;
    }

    // A stop line that cannot be read counts as pressed. Logged once per
    // run of failures.
    fn stop_asserted(&mut self) -> bool {
        match self.stop.is_high() {
            Ok(high) => {
                if std::mem::take(&mut self.stop_read_failed) {
                    info!("Stop input readable again");
                }
                self.stop_polarity.is_asserted(high)
            }
            Err(e) => {
                if !self.stop_read_failed {
                    error!("Failed to read stop input, treating as pressed: {:?}", e);
                    self.stop_read_failed = true;
                }
                true
            }
        }
    }

    // A start line that cannot be read counts as released.
    fn start_asserted(&mut self) -> bool {
        match self.start.is_high() {
            Ok(high) => self.start_polarity.is_asserted(high),
            Err(e) => {
                error!("Failed to read start input: {:?}", e);
                false
            }
        }
    }
}

fn idle_pull(polarity: Polarity) -> Pull {
    match polarity {
        Polarity::ActiveHigh => Pull::Down,
        Polarity::ActiveLow => Pull::Up,
    }
}
