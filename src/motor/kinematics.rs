// Mecanum truth table: motion symbol -> per-role direction bit and duty
//
// Direction polarity is arbitrary but fixed per profile (0 = low, 1 = high).
// Whole-body motions drive the four wheel roles; diagonals drive one wheel
// pair and force the other pair to zero duty; single-role motion touches
// only the named role.

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::{DUTY_MAX, MIN_DUTY, Settings};
use crate::messages::{Direction, Motion, Role};

/// What one role should do for the current motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelCommand {
    /// `None` leaves the direction pin as it is.
    pub direction: Option<bool>,
    pub duty: u16,
}

impl WheelCommand {
    fn drive(bit: bool, duty: u16) -> Self {
        Self {
            direction: Some(bit),
            duty,
        }
    }

    fn idle() -> Self {
        Self {
            direction: None,
            duty: 0,
        }
    }
}

/// Per-role commands for one motion. Roles not present are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    wheels: BTreeMap<Role, WheelCommand>,
}

impl Assignment {
    pub fn get(&self, role: Role) -> Option<WheelCommand> {
        self.wheels.get(&role).copied()
    }

    pub fn direction(&self, role: Role) -> Option<bool> {
        self.get(role).and_then(|w| w.direction)
    }

    pub fn duty(&self, role: Role) -> Option<u16> {
        self.get(role).map(|w| w.duty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, WheelCommand)> + '_ {
        self.wheels.iter().map(|(&role, &cmd)| (role, cmd))
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.wheels.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.wheels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.wheels.len()
    }
}

/// Scale a 0-100 speed onto [0, DUTY_MAX].
pub fn scale_duty(speed: i32) -> u16 {
    let speed = speed.clamp(0, 100) as u32;
    (speed * u32::from(DUTY_MAX) / 100) as u16
}

/// Same as [`scale_duty`], but any nonzero result is raised to at least
/// `min_duty` so the wheel actually breaks away at low commanded speed.
pub fn scale_duty_with_floor(speed: i32, min_duty: u16) -> u16 {
    match scale_duty(speed) {
        0 => 0,
        duty => duty.max(min_duty.min(DUTY_MAX)),
    }
}

/// Direction bits for [front-left, front-right, back-left, back-right].
/// `None` marks a wheel that is held at zero duty for the motion.
fn truth_table(motion: Motion) -> [Option<bool>; 4] {
    const O: bool = false;
    const I: bool = true;
    match motion {
        Motion::Forward => [Some(O), Some(I), Some(O), Some(I)],
        Motion::Backward => [Some(I), Some(O), Some(I), Some(O)],
        Motion::StrafeLeft => [Some(I), Some(I), Some(O), Some(O)],
        Motion::StrafeRight => [Some(O), Some(O), Some(I), Some(I)],
        Motion::RotateCcw => [Some(I), Some(I), Some(I), Some(I)],
        Motion::RotateCw => [Some(O), Some(O), Some(O), Some(O)],
        Motion::DiagonalForwardLeft => [None, Some(I), Some(O), None],
        Motion::DiagonalForwardRight => [Some(O), None, None, Some(I)],
        Motion::DiagonalBackwardLeft => [None, Some(O), Some(I), None],
        Motion::DiagonalBackwardRight => [Some(I), None, None, Some(O)],
        Motion::Single(_) => [None; 4],
    }
}

/// Pure mapping from (motion, speed, direction) to an [`Assignment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KinematicsResolver {
    min_duty: u16,
}

impl Default for KinematicsResolver {
    fn default() -> Self {
        Self::new(MIN_DUTY)
    }
}

impl KinematicsResolver {
    pub fn new(min_duty: u16) -> Self {
        Self {
            min_duty: min_duty.min(DUTY_MAX),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.min_duty())
    }

    pub fn min_duty(&self) -> u16 {
        self.min_duty
    }

    /// Assignment for a timed motion; duty scales linearly with speed.
    pub fn resolve(&self, motion: Motion, speed: i32, direction: Direction) -> Assignment {
        Self::build(motion, scale_duty(speed), direction)
    }

    /// Assignment for continuous driving, with the deadband floor applied.
    pub fn resolve_continuous(
        &self,
        motion: Motion,
        speed: i32,
        direction: Direction,
    ) -> Assignment {
        Self::build(
            motion,
            scale_duty_with_floor(speed, self.min_duty),
            direction,
        )
    }

    /// Resolve a raw symbol. Unknown symbols log a warning and resolve to
    /// the empty (no-op) assignment.
    pub fn resolve_symbol(&self, symbol: &str, speed: i32, direction: Direction) -> Assignment {
        match symbol.parse::<Motion>() {
            Ok(motion) => self.resolve(motion, speed, direction),
            Err(e) => {
                warn!("{}, ignoring", e);
                Assignment::default()
            }
        }
    }

    fn build(motion: Motion, duty: u16, direction: Direction) -> Assignment {
        let wheels = match motion {
            Motion::Single(role) => BTreeMap::from([(role, WheelCommand::drive(direction.bit(), duty))]),
            _ => Role::DRIVE
                .into_iter()
                .zip(truth_table(motion))
                .map(|(role, bit)| {
                    let cmd = match bit {
                        Some(bit) => WheelCommand::drive(bit, duty),
                        None => WheelCommand::idle(),
                    };
                    (role, cmd)
                })
                .collect(),
        };
        Assignment { wheels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(assignment: &Assignment) -> [Option<bool>; 4] {
        Role::DRIVE.map(|role| assignment.direction(role))
    }

    #[test]
    fn test_duty_endpoints() {
        assert_eq!(scale_duty(0), 0);
        assert_eq!(scale_duty(100), DUTY_MAX);
        assert_eq!(scale_duty(50), 511);
    }

    #[test]
    fn test_duty_clamped_and_monotonic() {
        assert_eq!(scale_duty(-20), 0);
        assert_eq!(scale_duty(250), DUTY_MAX);

        let mut last = 0;
        for speed in 0..=100 {
            let duty = scale_duty(speed);
            assert!(duty >= last, "duty decreased at speed {speed}");
            assert!(duty <= DUTY_MAX);
            last = duty;
        }
    }

    #[test]
    fn test_deadband_floor() {
        for speed in 1..=100 {
            let duty = scale_duty_with_floor(speed, MIN_DUTY);
            assert!(
                duty >= MIN_DUTY,
                "speed {speed} gave duty {duty} below floor {MIN_DUTY}"
            );
            assert!(duty <= DUTY_MAX);
        }
        assert_eq!(scale_duty_with_floor(0, MIN_DUTY), 0);
        assert_eq!(scale_duty_with_floor(100, MIN_DUTY), DUTY_MAX);
        // Floor never exceeds the duty range
        assert_eq!(scale_duty_with_floor(1, u16::MAX), DUTY_MAX);
    }

    #[test]
    fn test_forward_table() {
        let a = KinematicsResolver::default().resolve(Motion::Forward, 100, Direction::Forward);
        assert_eq!(bits(&a), [Some(false), Some(true), Some(false), Some(true)]);
        for role in Role::DRIVE {
            assert_eq!(a.duty(role), Some(DUTY_MAX));
        }
        assert_eq!(a.get(Role::Auxiliary), None, "auxiliary is not a drive wheel");
    }

    #[test]
    fn test_forward_backward_complement() {
        let resolver = KinematicsResolver::default();
        let fwd = resolver.resolve(Motion::Forward, 70, Direction::Forward);
        let bwd = resolver.resolve(Motion::Backward, 70, Direction::Forward);
        for role in Role::DRIVE {
            let (f, b) = (fwd.direction(role).unwrap(), bwd.direction(role).unwrap());
            assert_eq!(f, !b, "{role} not complemented");
            assert_eq!(fwd.duty(role), bwd.duty(role));
        }
    }

    #[test]
    fn test_strafe_and_rotate_tables() {
        let r = KinematicsResolver::default();
        let t = |m| bits(&r.resolve(m, 100, Direction::Forward));
        assert_eq!(t(Motion::StrafeLeft), [Some(true), Some(true), Some(false), Some(false)]);
        assert_eq!(t(Motion::StrafeRight), [Some(false), Some(false), Some(true), Some(true)]);
        assert_eq!(t(Motion::RotateCcw), [Some(true); 4]);
        assert_eq!(t(Motion::RotateCw), [Some(false); 4]);
    }

    #[test]
    fn test_diagonals_drive_one_pair() {
        let r = KinematicsResolver::default();
        let cases = [
            (Motion::DiagonalForwardLeft, [None, Some(true), Some(false), None]),
            (Motion::DiagonalForwardRight, [Some(false), None, None, Some(true)]),
            (Motion::DiagonalBackwardLeft, [None, Some(false), Some(true), None]),
            (Motion::DiagonalBackwardRight, [Some(true), None, None, Some(false)]),
        ];
        for (motion, expected) in cases {
            let a = r.resolve(motion, 80, Direction::Forward);
            assert_eq!(bits(&a), expected, "{motion}");
            assert_eq!(a.len(), 4, "{motion} must cover all four wheels");
            for (role, bit) in Role::DRIVE.into_iter().zip(expected) {
                let duty = a.duty(role).unwrap();
                if bit.is_some() {
                    assert_eq!(duty, scale_duty(80), "{motion}: {role} should drive");
                } else {
                    assert_eq!(duty, 0, "{motion}: {role} should be held at zero");
                }
            }
        }
    }

    #[test]
    fn test_single_role() {
        let r = KinematicsResolver::default();
        let a = r.resolve(Motion::Single(Role::Auxiliary), 40, Direction::Reverse);
        assert_eq!(a.len(), 1);
        assert_eq!(a.direction(Role::Auxiliary), Some(false));
        assert_eq!(a.duty(Role::Auxiliary), Some(scale_duty(40)));

        let a = r.resolve(Motion::Single(Role::FrontLeft), 40, Direction::Forward);
        assert_eq!(a.direction(Role::FrontLeft), Some(true));
    }

    #[test]
    fn test_continuous_uses_floor() {
        let r = KinematicsResolver::new(400);
        let a = r.resolve_continuous(Motion::RotateCw, 5, Direction::Forward);
        for role in Role::DRIVE {
            assert_eq!(a.duty(role), Some(400));
        }
        let a = r.resolve_continuous(Motion::RotateCw, 0, Direction::Forward);
        for role in Role::DRIVE {
            assert_eq!(a.duty(role), Some(0));
        }
    }

    #[test]
    fn test_unknown_symbol_is_noop() {
        let r = KinematicsResolver::default();
        assert!(r.resolve_symbol("diagonal-up", 100, Direction::Forward).is_empty());
        assert_eq!(r.resolve_symbol("FW", 100, Direction::Forward).len(), 4);
    }
}
