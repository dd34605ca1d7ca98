// Motor layer for the mecanum base
//
// Provides:
// - Pin abstraction over embedded-hal (board, channel)
// - Profile table and fail-safe profile selection
// - Mecanum truth table (motion -> per-wheel direction/duty)
// - Positional servos on 50 Hz outputs
// - An in-memory board for simulation and tests

mod board;
mod channel;
pub mod kinematics;
pub mod profile;
mod registry;
mod servo;
pub mod sim;

pub use board::{Board, Pull};
pub use channel::{ChannelSet, MotorChannel};
pub use kinematics::{Assignment, KinematicsResolver, WheelCommand, scale_duty, scale_duty_with_floor};
pub use profile::{PinPair, ProfileTable, RobotConfig};
pub use registry::ConfigRegistry;
pub use servo::{Servo, position_duty};
