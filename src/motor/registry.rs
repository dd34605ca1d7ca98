// Profile selection with a fail-safe sweep of every known pin

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use tracing::{debug, error, info, warn};

use super::board::Board;
use super::channel::{ChannelSet, MotorChannel};
use super::profile::{PinPair, ProfileTable, RobotConfig};
use crate::config::PWM_FREQ_HZ;
use crate::error::{ConfigError, HardwareError, Result};
use crate::messages::Role;

/// Owns the profile table and knows which profile is bound.
pub struct ConfigRegistry {
    table: ProfileTable,
    pwm_freq_hz: u32,
    active: Option<String>,
}

impl ConfigRegistry {
    pub fn new(table: ProfileTable) -> Self {
        Self::with_pwm_freq(table, PWM_FREQ_HZ)
    }

    pub fn with_pwm_freq(table: ProfileTable, pwm_freq_hz: u32) -> Self {
        Self {
            table,
            pwm_freq_hz,
            active: None,
        }
    }

    pub fn table(&self) -> &ProfileTable {
        &self.table
    }

    /// Id of the bound profile, if any.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_config(&self) -> Option<&RobotConfig> {
        self.active.as_deref().and_then(|id| self.table.get(id).ok())
    }

    /// Replace `channels` with a fresh binding of profile `id`.
    ///
    /// Unknown ids fail before any pin is touched. Otherwise the current set
    /// is halted and released, every pin of every profile is forced off, and
    /// the selected roles are bound at rest. On a bind failure `channels` is
    /// left empty.
    pub fn select_profile<B: Board>(
        &mut self,
        board: &mut B,
        channels: &mut ChannelSet<B::Output, B::Pwm>,
        id: &str,
    ) -> Result<()> {
        let config = match self.table.get(id) {
            Ok(config) => config.clone(),
            Err(e) => {
                warn!("{}, keeping current binding", e);
                return Err(e);
            }
        };

        channels.halt_all();
        *channels = ChannelSet::default();
        self.active = None;

        let failures = self.reset_all_pins(board);
        if failures > 0 {
            warn!("Fail-safe reset skipped {} pin(s)", failures);
        }

        let mut fresh = ChannelSet::default();
        for (role, pins) in config.iter() {
            match self.bind(board, role, pins) {
                Ok(channel) => fresh.insert(channel),
                Err(e) => {
                    fresh.halt_all();
                    error!("Profile {} not bound, {} failed: {}", id, role, e);
                    return Err(ConfigError::Bind {
                        role,
                        pin: e.pin,
                        reason: e.reason,
                    });
                }
            }
        }

        info!("Profile {} active ({} roles)", id, fresh.len());
        *channels = fresh;
        self.active = Some(id.to_string());
        Ok(())
    }

    /// Rebind the active profile from scratch (full sweep included).
    /// No-op when nothing is bound.
    pub fn reselect<B: Board>(
        &mut self,
        board: &mut B,
        channels: &mut ChannelSet<B::Output, B::Pwm>,
    ) -> Result<()> {
        match self.active.clone() {
            Some(id) => self.select_profile(board, channels, &id),
            None => Ok(()),
        }
    }

    /// Force every duty pin to 0 and every direction pin low, across the
    /// union of all profiles. Failures are logged and skipped; returns how
    /// many pins could not be reset.
    pub fn reset_all_pins<B: Board>(&self, board: &mut B) -> usize {
        let mut failures = 0;

        for pin in self.table.all_pwm_pins() {
            let result = board.pwm(pin, self.pwm_freq_hz).and_then(|mut pwm| {
                pwm.set_duty_cycle(0)
                    .map_err(|e| HardwareError::new(pin, format!("{e:?}")))
            });
            if let Err(e) = result {
                warn!("Fail-safe reset: {}", e);
                failures += 1;
            }
        }

        for pin in self.table.all_dir_pins() {
            let result = board.output(pin).and_then(|mut out| {
                out.set_low()
                    .map_err(|e| HardwareError::new(pin, format!("{e:?}")))
            });
            if let Err(e) = result {
                warn!("Fail-safe reset: {}", e);
                failures += 1;
            }
        }

        debug!("Fail-safe reset done, {} failure(s)", failures);
        failures
    }

    fn bind<B: Board>(
        &self,
        board: &mut B,
        role: Role,
        pins: PinPair,
    ) -> std::result::Result<MotorChannel<B::Output, B::Pwm>, HardwareError> {
        let dir = board.output(pins.dir)?;
        let pwm = board.pwm(pins.pwm, self.pwm_freq_hz)?;
        MotorChannel::bind(role, pins, dir, pwm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::{PinMode, SimBoard};

    fn two_profiles() -> ProfileTable {
        ProfileTable::from_json(
            r#"{
                "a": {
                    "front_left": { "dir": 23, "pwm": 25 },
                    "back_right": { "dir": 14, "pwm": 13 }
                },
                "b": {
                    "front_left": { "dir": 25, "pwm": 23 },
                    "front_right": { "dir": 19, "pwm": 18 }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_profile_touches_nothing() {
        let mut board = SimBoard::new();
        let mut channels = ChannelSet::default();
        let mut registry = ConfigRegistry::new(two_profiles());

        let err = registry.select_profile(&mut board, &mut channels, "zzz");
        assert!(matches!(err, Err(ConfigError::UnknownProfile(_))));
        assert!(board.trace().is_empty());
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn test_select_binds_only_selected_roles() {
        let mut board = SimBoard::new();
        let mut channels = ChannelSet::default();
        let mut registry = ConfigRegistry::new(two_profiles());

        registry.select_profile(&mut board, &mut channels, "a").unwrap();
        assert_eq!(registry.active(), Some("a"));
        assert_eq!(
            channels.roles().collect::<Vec<_>>(),
            vec![Role::FrontLeft, Role::BackRight]
        );
        assert!(channels.is_idle());
        assert_eq!(board.pin(25).mode, PinMode::Pwm { freq_hz: PWM_FREQ_HZ });
        assert_eq!(board.pin(23).mode, PinMode::Output);
    }

    #[test]
    fn test_sweep_covers_union_of_profiles() {
        let mut board = SimBoard::new();
        let mut channels = ChannelSet::default();
        let mut registry = ConfigRegistry::new(two_profiles());

        // Left energized by a previous crash, on a pin only profile "a" uses
        board.poke(13, true, 900);
        board.poke(14, true, 0);
        registry.select_profile(&mut board, &mut channels, "b").unwrap();

        assert_eq!(board.duty(13), 0);
        assert!(!board.level(14));
        assert!(channels.get(Role::BackRight).is_none());
    }

    #[test]
    fn test_sweep_survives_faulty_pins() {
        let mut board = SimBoard::new();
        let mut channels = ChannelSet::default();
        let mut registry = ConfigRegistry::new(two_profiles());

        board.poke(18, false, 700);
        board.fail_pin(13);
        board.fail_pin(14);
        assert_eq!(registry.reset_all_pins(&mut board), 2);
        assert_eq!(board.duty(18), 0, "sweep must continue past failures");

        // Profile "b" does not use the faulty pins
        registry.select_profile(&mut board, &mut channels, "b").unwrap();
        assert_eq!(channels.len(), 2);
    }

    #[test]
    fn test_bind_failure_leaves_nothing_bound() {
        let mut board = SimBoard::new();
        let mut channels = ChannelSet::default();
        let mut registry = ConfigRegistry::new(two_profiles());

        registry.select_profile(&mut board, &mut channels, "b").unwrap();
        board.fail_pin(13);
        let err = registry.select_profile(&mut board, &mut channels, "a");
        assert!(matches!(
            err,
            Err(ConfigError::Bind { role: Role::BackRight, pin: 13, .. })
        ));
        assert!(channels.is_empty());
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn test_reselect_repeats_sweep() {
        let mut board = SimBoard::new();
        let mut channels = ChannelSet::default();
        let mut registry = ConfigRegistry::new(two_profiles());

        registry.reselect(&mut board, &mut channels).unwrap();
        assert!(board.trace().is_empty());

        registry.select_profile(&mut board, &mut channels, "a").unwrap();
        board.poke(18, true, 512);
        registry.reselect(&mut board, &mut channels).unwrap();
        assert_eq!(board.duty(18), 0);
        assert_eq!(registry.active(), Some("a"));
    }
}
