// Command vocabulary for the mecanum base

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::UnknownMotion;

/// Logical wheel role. A profile maps each role to a physical pin pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
    #[serde(alias = "extra_motor")]
    Auxiliary,
}

impl Role {
    /// Roles driven by whole-body motions. The auxiliary actuator is only
    /// moved by an explicit single-role command.
    pub const DRIVE: [Role; 4] = [
        Role::FrontLeft,
        Role::FrontRight,
        Role::BackLeft,
        Role::BackRight,
    ];

    pub const ALL: [Role; 5] = [
        Role::FrontLeft,
        Role::FrontRight,
        Role::BackLeft,
        Role::BackRight,
        Role::Auxiliary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::FrontLeft => "front_left",
            Role::FrontRight => "front_right",
            Role::BackLeft => "back_left",
            Role::BackRight => "back_right",
            Role::Auxiliary => "auxiliary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = UnknownMotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "front_left" => Ok(Role::FrontLeft),
            "front_right" => Ok(Role::FrontRight),
            "back_left" => Ok(Role::BackLeft),
            "back_right" => Ok(Role::BackRight),
            "auxiliary" | "extra_motor" => Ok(Role::Auxiliary),
            _ => Err(UnknownMotion(s.to_string())),
        }
    }
}

/// Rotation sense requested for a single-role command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// Direction bit written to the channel (forward = 1).
    pub fn bit(self) -> bool {
        matches!(self, Direction::Forward)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" | "fwd" | "1" => Ok(Direction::Forward),
            "reverse" | "rev" | "0" => Ok(Direction::Reverse),
            other => Err(format!("expected forward or reverse, got {other:?}")),
        }
    }
}

/// Closed motion vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Motion {
    Forward,
    Backward,
    StrafeLeft,
    StrafeRight,
    RotateCcw,
    RotateCw,
    DiagonalForwardLeft,
    DiagonalForwardRight,
    DiagonalBackwardLeft,
    DiagonalBackwardRight,
    /// Drive exactly one role in the command's direction.
    Single(Role),
}

impl fmt::Display for Motion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Motion::Forward => "forward",
            Motion::Backward => "backward",
            Motion::StrafeLeft => "strafe-left",
            Motion::StrafeRight => "strafe-right",
            Motion::RotateCcw => "rotate-ccw",
            Motion::RotateCw => "rotate-cw",
            Motion::DiagonalForwardLeft => "diagonal-forward-left",
            Motion::DiagonalForwardRight => "diagonal-forward-right",
            Motion::DiagonalBackwardLeft => "diagonal-backward-left",
            Motion::DiagonalBackwardRight => "diagonal-backward-right",
            Motion::Single(role) => role.name(),
        };
        f.write_str(name)
    }
}

impl FromStr for Motion {
    type Err = UnknownMotion;

    /// Accepts the long names above as well as the short operator symbols
    /// (`FW`, `BW`, `L`, `R`, `CCW`, `CW`, `FL`, `FR`, `BL`, `BR`) and role
    /// names for single-wheel motion.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let motion = match s.trim() {
            "FW" => Motion::Forward,
            "BW" => Motion::Backward,
            "L" => Motion::StrafeLeft,
            "R" => Motion::StrafeRight,
            "CCW" => Motion::RotateCcw,
            "CW" => Motion::RotateCw,
            "FL" => Motion::DiagonalForwardLeft,
            "FR" => Motion::DiagonalForwardRight,
            "BL" => Motion::DiagonalBackwardLeft,
            "BR" => Motion::DiagonalBackwardRight,
            other => match other.to_ascii_lowercase().replace('_', "-").as_str() {
                "forward" => Motion::Forward,
                "backward" => Motion::Backward,
                "strafe-left" => Motion::StrafeLeft,
                "strafe-right" => Motion::StrafeRight,
                "rotate-ccw" => Motion::RotateCcw,
                "rotate-cw" => Motion::RotateCw,
                "diagonal-forward-left" => Motion::DiagonalForwardLeft,
                "diagonal-forward-right" => Motion::DiagonalForwardRight,
                "diagonal-backward-left" => Motion::DiagonalBackwardLeft,
                "diagonal-backward-right" => Motion::DiagonalBackwardRight,
                _ => Motion::Single(other.parse::<Role>().map_err(|_| UnknownMotion(s.to_string()))?),
            },
        };
        Ok(motion)
    }
}

impl TryFrom<String> for Motion {
    type Error = UnknownMotion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Motion> for String {
    fn from(motion: Motion) -> Self {
        motion.to_string()
    }
}

fn default_speed() -> i32 {
    100
}

fn default_duration_s() -> f32 {
    1.5
}

/// One timed motion request from the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub motion: Motion,
    /// Percent of full duty; clamped to [0, 100] before scaling.
    #[serde(default = "default_speed")]
    pub speed: i32,
    #[serde(default = "default_duration_s")]
    pub duration_s: f32,
    #[serde(default)]
    pub direction: Direction,
}

impl MotionCommand {
    pub fn new(motion: Motion, speed: i32, duration: Duration) -> Self {
        Self {
            motion,
            speed,
            duration_s: duration.as_secs_f32(),
            direction: Direction::Forward,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Requested duration. Negative and NaN values are zero; values too large
    /// for a `Duration` (infinity included) saturate to `Duration::MAX`.
    pub fn duration(&self) -> Duration {
        if self.duration_s.is_nan() || self.duration_s <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f32(self.duration_s).unwrap_or(Duration::MAX)
    }
}

/// Result of one runtime operation, published the way health is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Ran for the full duration (or, for continuous drive, was applied).
    Completed,
    /// Supervisor stopped the motion part-way.
    Interrupted { elapsed_ms: u64 },
    /// Supervisor was not RUNNING; outputs were zeroed and nothing moved.
    NotRunning,
    /// Unknown motion symbol; nothing was touched.
    Ignored,
    /// A pin write failed; every channel was halted.
    Faulted { pin: u8 },
}
