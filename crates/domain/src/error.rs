//! Domain error types.

use thiserror::Error;

/// Errors raised by domain rules, independent of transport or storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Day must be between 0 (Mon) and 6 (Sun), got {0}")]
    InvalidDay(u8),

    #[error("Invalid time of day: {0}")]
    InvalidTime(String),

    #[error("Unknown container: {0}")]
    UnknownContainer(u32),

    #[error("Invalid device command: {0}")]
    InvalidCommand(String),
}
