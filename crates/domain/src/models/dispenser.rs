//! Legacy single-record dispenser model stored at `dispensers/{userId}`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use super::container::{decrement_pills, dispensed_at_label, NEVER_DISPENSED};

/// Defaults applied by the upsert handler when neither the request nor the
/// stored record carries a field.
pub const DEFAULT_RECORD_STATUS: &str = "offline";
pub const DEFAULT_RECORD_BATTERY: i64 = 100;
pub const DEFAULT_RECORD_PILLS: i64 = 30;

/// Legacy dispenser record. Fields this service does not know about are kept
/// in `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pills_remaining: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_dispensed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DispenserRecord {
    /// Returns the record after dispensing `pills`, clamped at zero.
    pub fn dispensed(mut self, pills: i64, now: DateTime<Utc>) -> Self {
        let previous = self.pills_remaining.unwrap_or(0);
        self.pills_remaining = Some(decrement_pills(previous, pills));
        self.last_dispensed = Some(dispensed_at_label(now));
        self.last_updated = Some(timestamp(now));
        self
    }

    /// Merges an update into an optional stored record. Request fields win,
    /// then stored fields, then the defaults.
    pub fn upserted(current: Option<Self>, update: &UpdateDispenserRequest, now: DateTime<Utc>) -> Self {
        let mut record = current.unwrap_or_default();
        record.status = Some(
            update
                .status
                .clone()
                .filter(|s| !s.is_empty())
                .or(record.status.take())
                .unwrap_or_else(|| DEFAULT_RECORD_STATUS.to_string()),
        );
        record.battery = Some(
            update
                .battery
                .or(record.battery)
                .unwrap_or(DEFAULT_RECORD_BATTERY),
        );
        record.pills_remaining = Some(
            update
                .pills_remaining
                .or(record.pills_remaining)
                .unwrap_or(DEFAULT_RECORD_PILLS),
        );
        record.last_dispensed = Some(
            update
                .last_dispensed
                .clone()
                .filter(|s| !s.is_empty())
                .or(record.last_dispensed.take())
                .unwrap_or_else(|| NEVER_DISPENSED.to_string()),
        );
        record.last_updated = Some(timestamp(now));
        record
    }
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn default_pills() -> i64 {
    1
}

/// Request payload for `POST /api/dispense`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DispenseRequest {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default = "default_pills")]
    #[validate(range(min = 1, max = 100, message = "Pills must be between 1 and 100"))]
    pub pills: i64,
}

/// Request payload for `POST /api/dispenser`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDispenserRequest {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "Battery level must be between 0 and 100"))]
    pub battery: Option<i64>,

    #[serde(default)]
    #[validate(range(min = 0, message = "Pills remaining must be non-negative"))]
    pub pills_remaining: Option<i64>,

    #[serde(default)]
    pub last_dispensed: Option<String>,
}
