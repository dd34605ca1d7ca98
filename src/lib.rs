pub mod config;
pub mod error;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod safety;

pub use config::Settings;
pub use error::{ConfigError, HardwareError, UnknownMotion};
pub use messages::{Direction, Motion, MotionCommand, Outcome, Role};
pub use runtime::{DriveContext, MotionExecutor, Runtime};
pub use safety::{SafetyState, SafetySupervisor, Transition};
