//! Dispense logs and reports written by the device.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Formats the firmware and older dashboards have been seen writing.
const NAIVE_TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y, %I:%M:%S %p",
    "%d/%m/%Y %H:%M:%S",
];

/// One dispense event logged by a device under `pill_logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillLog {
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(default)]
    pub pill_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_string")]
    pub uptime: Option<String>,
}

/// Summary report pushed by a device to `pilldispenser/reports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillReport {
    #[serde(default)]
    pub pill_count: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub datetime: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Which collections a log query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    #[default]
    All,
    Logs,
    Reports,
}

impl ActivityKind {
    pub fn includes_logs(self) -> bool {
        matches!(self, ActivityKind::All | ActivityKind::Logs)
    }

    pub fn includes_reports(self) -> bool {
        matches!(self, ActivityKind::All | ActivityKind::Reports)
    }
}

/// Parses the free-text timestamps devices write. Returns `None` when no
/// known format matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
