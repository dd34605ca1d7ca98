// Error types for profile selection, pin access and command parsing

use crate::messages::Role;

/// Errors raised while loading or selecting a robot profile.
///
/// Any of these aborts the selection; the caller must not keep driving
/// with a partially bound configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Failed to bind {role} to pin {pin}: {reason}")]
    Bind { role: Role, pin: u8, reason: String },

    #[error("Safety input unavailable: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single pin could not be acquired or driven.
///
/// Raised during the fail-safe sweep, where it is logged and skipped.
#[derive(Debug, thiserror::Error)]
#[error("Pin {pin}: {reason}")]
pub struct HardwareError {
    pub pin: u8,
    pub reason: String,
}

impl HardwareError {
    pub fn new(pin: u8, reason: impl Into<String>) -> Self {
        Self {
            pin,
            reason: reason.into(),
        }
    }
}

/// A motion symbol outside the command vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown motion: {0}")]
pub struct UnknownMotion(pub String);

pub type Result<T> = std::result::Result<T, ConfigError>;
