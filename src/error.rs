//! Engine error types

use crate::driver::Command;

/// Errors surfaced by the engine's public operations.
///
/// Domain closures (animation updates, responders, listeners) are never
/// wrapped: a panic inside one propagates and halts the run.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EngineError {
    /// A command name that maps to no lifecycle command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A lifecycle command was sent before the engine was mounted
    #[error("Not initialized: {0} ignored")]
    NotMounted(Command),

    /// Two animations registered under the same id
    #[error("Animation already registered: {0}")]
    DuplicateAnimation(String),

    /// A collider watches an id no animation was registered under
    #[error("Animation not found: {0}")]
    UnknownAnimation(String),

    /// A velocity function returned a non-finite interval or one below `MIN_VELOCITY_MS`
    #[error("Animation {id} has invalid velocity: {value}")]
    InvalidVelocity { id: String, value: f64 },

    /// A sound id with no registered sound
    #[error("Sound not found: {0}")]
    UnknownSound(String),

    /// Configuration could not be parsed or failed validation
    #[error("Invalid config: {0}")]
    Config(String),

    /// The driver was already borrowed (a host callback arrived mid-tick)
    #[error("Driver busy: nested tick refused")]
    Busy,
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
