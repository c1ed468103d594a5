//! Device command model.
//!
//! The device inbox holds a single string such as `DISPENSE:2`. Parsing
//! mirrors the firmware: surrounding whitespace is ignored and the verb is
//! case-insensitive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::container::validate_container_id;
use crate::error::DomainError;

lazy_static::lazy_static! {
    static ref DISPENSE_COMMAND_REGEX: regex::Regex =
        regex::Regex::new(r"^(?i)DISPENSE:(\d{1,3})$").unwrap();
}

/// One-shot instruction for the physical dispenser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Actuate the container with this id (1-based).
    Dispense { container: u32 },
}

impl DeviceCommand {
    pub fn dispense(container: u32) -> Result<Self, DomainError> {
        Ok(DeviceCommand::Dispense {
            container: validate_container_id(container)?,
        })
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Dispense { container } => write!(f, "DISPENSE:{}", container),
        }
    }
}

impl FromStr for DeviceCommand {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let captures = DISPENSE_COMMAND_REGEX
            .captures(trimmed)
            .ok_or_else(|| DomainError::InvalidCommand(trimmed.to_string()))?;
        let container: u32 = captures[1]
            .parse()
            .map_err(|_| DomainError::InvalidCommand(trimmed.to_string()))?;
        DeviceCommand::dispense(container)
    }
}

/// Request payload for a raw command dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchCommandRequest {
    pub command: String,
}

/// Result of a dispatch, returned once the store acknowledged the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceipt {
    pub device_id: String,
    pub command: String,
    pub clear_after_ms: u64,
}
