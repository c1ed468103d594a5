//! Traffic-light levels shown next to battery and pill counts.

use serde::{Deserialize, Serialize};

/// Battery percentage at or above which the level is high.
pub const BATTERY_HIGH: u8 = 70;
/// Battery percentage at or above which the level is medium.
pub const BATTERY_MEDIUM: u8 = 30;
/// Pill count at or above which the stock is high.
pub const PILLS_HIGH: u32 = 20;
/// Pill count at or above which the stock is medium.
pub const PILLS_MEDIUM: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    pub fn for_battery(percentage: u8) -> Self {
        if percentage >= BATTERY_HIGH {
            Level::High
        } else if percentage >= BATTERY_MEDIUM {
            Level::Medium
        } else {
            Level::Low
        }
    }

    pub fn for_pills(count: u32) -> Self {
        if count >= PILLS_HIGH {
            Level::High
        } else if count >= PILLS_MEDIUM {
            Level::Medium
        } else {
            Level::Low
        }
    }
}
