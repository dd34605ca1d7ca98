// Timed and continuous motion, gated by the safety supervisor
//
// Everything runs on one thread. The only waits are the executor tick and
// the supervisor's stop-release polling, both plain blocking delays. The
// supervisor is polled before any duty is applied and on every tick, so a
// stop press reaches the wheels within one tick.

use std::collections::BTreeMap;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use tracing::{debug, error, info, warn};

use crate::config::{SERVO_FREQ_HZ, Settings};
use crate::error::{ConfigError, HardwareError};
use crate::messages::{Direction, Motion, MotionCommand, Outcome, Role};
use crate::motor::{
    Assignment, Board, ChannelSet, ConfigRegistry, KinematicsResolver, ProfileTable, Servo,
};
use crate::safety::{SafetyState, SafetySupervisor, Transition};

/// Hardware state shared by the registry, executor and supervisor.
/// Owned by the caller and passed around by reference.
pub struct DriveContext<B: Board, D> {
    pub board: B,
    pub channels: ChannelSet<B::Output, B::Pwm>,
    pub safety: SafetySupervisor<B::Input>,
    pub servos: BTreeMap<u8, Servo<B::Pwm>>,
    pub delay: D,
    // Continuous-drive assignment currently applied, if any
    live: Option<Assignment>,
}

impl<B: Board, D: DelayNs> DriveContext<B, D> {
    /// Acquire the safety inputs. No profile is bound yet.
    pub fn new(mut board: B, delay: D, settings: &Settings) -> Result<Self, HardwareError> {
        let safety = SafetySupervisor::from_board(&mut board, &settings.safety)?;
        Ok(Self {
            board,
            channels: ChannelSet::default(),
            safety,
            servos: BTreeMap::new(),
            delay,
            live: None,
        })
    }

    /// Poll the supervisor once. A stop clears any continuous drive.
    pub fn poll_safety(&mut self) -> Transition {
        let transition = self.safety.poll(&mut self.channels, &mut self.delay);
        if !self.safety.is_running() {
            self.live = None;
        }
        transition
    }

    /// Entry gate for actuation: STOPPED at entry means no motion, even with
    /// start held. Only a RUNNING supervisor is polled here, to catch a stop.
    fn admit(&mut self) -> bool {
        if self.safety.is_running() {
            self.poll_safety();
        }
        if !self.safety.is_running() {
            self.channels.halt_all();
            return false;
        }
        true
    }

    pub fn is_driving(&self) -> bool {
        self.live.is_some()
    }

    fn sleep(&mut self, duration: Duration) {
        self.delay
            .delay_ms(u32::try_from(duration.as_millis()).unwrap_or(u32::MAX));
    }

    fn set_directions(&mut self, assignment: &Assignment) -> Result<(), HardwareError> {
        for (role, cmd) in assignment.iter() {
            let (Some(bit), Some(channel)) = (cmd.direction, self.channels.get_mut(role)) else {
                continue;
            };
            channel.set_direction(bit)?;
        }
        Ok(())
    }

    fn set_duties(&mut self, assignment: &Assignment) -> Result<(), HardwareError> {
        for (role, cmd) in assignment.iter() {
            match self.channels.get_mut(role) {
                Some(channel) => channel.set_duty(cmd.duty)?,
                None => debug!("{} not bound in active profile", role),
            }
        }
        Ok(())
    }

    fn fault(&mut self, e: HardwareError) -> Outcome {
        error!("Pin write failed, halting: {}", e);
        self.channels.halt_all();
        self.live = None;
        Outcome::Faulted { pin: e.pin }
    }
}

impl<B: Board, D> Drop for DriveContext<B, D> {
    fn drop(&mut self) {
        // Leave the base at rest when the controller goes away
        self.channels.halt_all();
    }
}

/// Applies assignments to the live channels.
#[derive(Debug, Clone, Copy)]
pub struct MotionExecutor {
    tick: Duration,
}

impl MotionExecutor {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Run `assignment` for `duration`, then bring every channel to rest.
    ///
    /// Returns `NotRunning` without moving anything if the supervisor is
    /// STOPPED on entry, and `Interrupted` if it stops part-way.
    pub fn execute<B: Board, D: DelayNs>(
        &self,
        ctx: &mut DriveContext<B, D>,
        assignment: &Assignment,
        duration: Duration,
    ) -> Outcome {
        if !ctx.admit() {
            return Outcome::NotRunning;
        }

        // Timed motion replaces any continuous drive
        if ctx.live.take().is_some() {
            ctx.channels.halt_all();
        }

        if let Err(e) = ctx.set_directions(assignment) {
            return ctx.fault(e);
        }

        let mut elapsed = Duration::ZERO;
        while elapsed < duration {
            ctx.poll_safety();
            if !ctx.safety.is_running() {
                ctx.channels.halt_all();
                info!("Motion interrupted after {:?}", elapsed);
                return Outcome::Interrupted {
                    elapsed_ms: elapsed.as_millis() as u64,
                };
            }
            if let Err(e) = ctx.set_duties(assignment) {
                return ctx.fault(e);
            }
            ctx.sleep(self.tick);
            elapsed = elapsed.saturating_add(self.tick);
        }

        ctx.channels.halt_all();
        Outcome::Completed
    }

    /// Apply `assignment` and leave it running until [`stop_drive`](Self::stop_drive)
    /// or a stop press. The caller keeps polling the supervisor.
    pub fn drive<B: Board, D: DelayNs>(
        &self,
        ctx: &mut DriveContext<B, D>,
        assignment: Assignment,
    ) -> Outcome {
        if !ctx.admit() {
            return Outcome::NotRunning;
        }

        // Only one assignment may be live: release wheels the new one drops
        if let Some(previous) = ctx.live.take() {
            for role in previous.roles() {
                if assignment.get(role).is_none() {
                    ctx.channels.halt(role);
                }
            }
        }

        let applied = ctx
            .set_directions(&assignment)
            .and_then(|()| ctx.set_duties(&assignment));
        if let Err(e) = applied {
            return ctx.fault(e);
        }
        ctx.live = Some(assignment);
        Outcome::Completed
    }

    /// Zero the wheels of the live continuous drive, if any.
    pub fn stop_drive<B: Board, D: DelayNs>(&self, ctx: &mut DriveContext<B, D>) {
        if let Some(live) = ctx.live.take() {
            for role in live.roles() {
                ctx.channels.halt(role);
            }
        }
    }

    /// Pause between motions, still polling the supervisor every tick.
    pub fn safe_wait<B: Board, D: DelayNs>(
        &self,
        ctx: &mut DriveContext<B, D>,
        duration: Duration,
    ) -> Outcome {
        let mut elapsed = Duration::ZERO;
        while elapsed < duration {
            ctx.poll_safety();
            if !ctx.safety.is_running() {
                ctx.channels.halt_all();
                return Outcome::Interrupted {
                    elapsed_ms: elapsed.as_millis() as u64,
                };
            }
            ctx.sleep(self.tick);
            elapsed = elapsed.saturating_add(self.tick);
        }
        Outcome::Completed
    }
}

/// Registry, resolver and executor bound to one drive context.
pub struct Runtime<B: Board, D> {
    registry: ConfigRegistry,
    resolver: KinematicsResolver,
    executor: MotionExecutor,
    ctx: DriveContext<B, D>,
}

impl<B: Board, D: DelayNs> Runtime<B, D> {
    pub fn new(board: B, delay: D, table: ProfileTable, settings: &Settings) -> Result<Self, ConfigError> {
        let ctx = DriveContext::new(board, delay, settings)?;
        info!(
            "Runtime ready: tick {:?}, min duty {}, {} profile(s)",
            settings.tick(),
            settings.min_duty(),
            table.ids().count()
        );
        Ok(Self {
            registry: ConfigRegistry::with_pwm_freq(table, settings.pwm_freq_hz),
            resolver: KinematicsResolver::from_settings(settings),
            executor: MotionExecutor::new(settings.tick()),
            ctx,
        })
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &KinematicsResolver {
        &self.resolver
    }

    pub fn context(&self) -> &DriveContext<B, D> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut DriveContext<B, D> {
        &mut self.ctx
    }

    pub fn state(&self) -> SafetyState {
        self.ctx.safety.state()
    }

    pub fn is_running(&self) -> bool {
        self.ctx.safety.is_running()
    }

    /// Switch to profile `id`. Must not be called mid-motion; any continuous
    /// drive is dropped first.
    pub fn select_profile(&mut self, id: &str) -> Result<(), ConfigError> {
        self.executor.stop_drive(&mut self.ctx);
        let DriveContext { board, channels, .. } = &mut self.ctx;
        self.registry.select_profile(board, channels, id)
    }

    /// Run one timed command.
    pub fn run(&mut self, cmd: &MotionCommand) -> Outcome {
        info!(
            "Running {} at {}% for {:?}",
            cmd.motion,
            cmd.speed,
            cmd.duration()
        );
        let assignment = self.resolver.resolve(cmd.motion, cmd.speed, cmd.direction);
        self.execute(&assignment, cmd.duration())
    }

    /// Run a timed command given as a raw symbol. Unknown symbols are
    /// reported and ignored.
    pub fn run_symbol(
        &mut self,
        symbol: &str,
        speed: i32,
        duration: Duration,
        direction: Direction,
    ) -> Outcome {
        let assignment = self.resolver.resolve_symbol(symbol, speed, direction);
        if assignment.is_empty() {
            return Outcome::Ignored;
        }
        self.execute(&assignment, duration)
    }

    /// Run a single wheel for `duration`.
    pub fn run_role(&mut self, role: Role, speed: i32, duration: Duration, direction: Direction) -> Outcome {
        let cmd = MotionCommand::new(Motion::Single(role), speed, duration).with_direction(direction);
        self.run(&cmd)
    }

    /// Start continuous driving; duty stays applied until [`stop_drive`](Self::stop_drive).
    pub fn drive(&mut self, motion: Motion, speed: i32, direction: Direction) -> Outcome {
        let assignment = self.resolver.resolve_continuous(motion, speed, direction);
        let outcome = self.executor.drive(&mut self.ctx, assignment);
        self.handle_restart();
        outcome
    }

    pub fn stop_drive(&mut self) {
        self.executor.stop_drive(&mut self.ctx);
    }

    pub fn stop_role(&mut self, role: Role) {
        debug!("Stopping {}", role);
        self.ctx.channels.halt(role);
    }

    pub fn stop_all(&mut self) {
        self.ctx.live = None;
        self.ctx.channels.halt_all();
    }

    pub fn poll_safety(&mut self) -> Transition {
        let transition = self.ctx.poll_safety();
        self.handle_restart();
        transition
    }

    /// Block until the supervisor is RUNNING.
    pub fn wait_for_start(&mut self) {
        info!("Waiting for start");
        let debounce = self.ctx.safety.debounce();
        loop {
            self.poll_safety();
            if self.is_running() {
                break;
            }
            self.ctx.sleep(debounce);
        }
    }

    /// Acquire `pin` as a servo output at 50 Hz. The horn does not move
    /// until the first [`set_servo`](Self::set_servo).
    pub fn attach_servo(&mut self, pin: u8) -> Result<(), HardwareError> {
        let pwm = self.ctx.board.pwm(pin, SERVO_FREQ_HZ)?;
        self.ctx.servos.insert(pin, Servo::bind(pin, pwm));
        info!("Servo attached on pin {}", pin);
        Ok(())
    }

    /// Move the servo on `pin` to `position` (clamped to [0, 1]). Refused
    /// while STOPPED, like any other actuation.
    pub fn set_servo(&mut self, pin: u8, position: f32) -> Outcome {
        let admitted = self.ctx.admit();
        self.handle_restart();
        if !admitted {
            return Outcome::NotRunning;
        }
        let Some(servo) = self.ctx.servos.get_mut(&pin) else {
            warn!("No servo on pin {}, ignoring", pin);
            return Outcome::Ignored;
        };
        match servo.set_position(position) {
            Ok(_) => Outcome::Completed,
            Err(e) => self.ctx.fault(e),
        }
    }

    /// Pause for `duration`, honouring stop presses.
    pub fn safe_wait(&mut self, duration: Duration) -> Outcome {
        let outcome = self.executor.safe_wait(&mut self.ctx, duration);
        self.handle_restart();
        outcome
    }

    fn execute(&mut self, assignment: &Assignment, duration: Duration) -> Outcome {
        if self.registry.active().is_none() {
            warn!("No profile selected, nothing will move");
        }
        let outcome = self.executor.execute(&mut self.ctx, assignment, duration);
        self.handle_restart();
        outcome
    }

    // Fail-safe mode: a stop event rebuilds the active profile and puts the
    // supervisor back in its power-up state.
    fn handle_restart(&mut self) {
        if !self.ctx.safety.take_restart_request() {
            return;
        }
        info!("Restarting after stop");
        self.ctx.live = None;
        self.ctx.safety.reset();
        let DriveContext { board, channels, .. } = &mut self.ctx;
        if let Err(e) = self.registry.reselect(board, channels) {
            error!("Restart failed to rebind profile: {}", e);
        }
    }
}
