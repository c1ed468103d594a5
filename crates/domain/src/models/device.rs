//! Device status and telemetry domain models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use validator::Validate;

use super::level::Level;

/// Battery percentage of a freshly seeded device record.
pub const DEFAULT_BATTERY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Online,
    #[default]
    Offline,
}

impl ConnectionState {
    /// Interprets a free-text status written by the device.
    pub fn from_reported(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("online") {
            ConnectionState::Online
        } else {
            ConnectionState::Offline
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Online => write!(f, "online"),
            ConnectionState::Offline => write!(f, "offline"),
        }
    }
}

/// Simple status record stored at `dispensers/{userId}/device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub battery: u8,
    pub status: ConnectionState,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            battery: DEFAULT_BATTERY,
            status: ConnectionState::Offline,
        }
    }
}

/// Device status plus derived battery level, as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusSummary {
    pub battery: u8,
    pub status: ConnectionState,
    pub battery_level: Level,
}

impl From<DeviceStatus> for DeviceStatusSummary {
    fn from(status: DeviceStatus) -> Self {
        Self {
            battery: status.battery,
            status: status.status,
            battery_level: Level::for_battery(status.battery),
        }
    }
}

/// Request payload for overwriting the simple device status.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceStatusRequest {
    #[validate(custom(function = "shared::validation::validate_battery_level"))]
    pub battery: i64,
    pub status: ConnectionState,
}

impl From<UpdateDeviceStatusRequest> for DeviceStatus {
    fn from(request: UpdateDeviceStatusRequest) -> Self {
        Self {
            battery: request.battery.clamp(0, 100) as u8,
            status: request.status,
        }
    }
}

/// View of the telemetry a physical dispenser publishes under
/// `pilldispenser/device/{deviceId}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOverview {
    pub device_id: String,
    pub status: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_strength: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_command: Option<String>,
    pub sensors: BTreeMap<String, Value>,
}

impl DeviceOverview {
    /// Derives the overview from the raw device node. Firmware revisions write
    /// numbers either as JSON numbers or as strings, so both are accepted.
    pub fn from_telemetry(device_id: &str, node: Option<&Value>) -> Self {
        let heartbeat = node.and_then(|n| n.get("heartbeat"));
        let status_node = node.and_then(|n| n.get("status"));

        let reported = heartbeat
            .and_then(|h| h.get("device_status"))
            .or_else(|| status_node.and_then(|s| s.get("status")))
            .and_then(Value::as_str);
        let status = reported
            .map(ConnectionState::from_reported)
            .unwrap_or_default();

        let battery = heartbeat
            .and_then(|h| h.get("battery_percentage"))
            .and_then(as_number)
            .map(|pct| pct.round().clamp(0.0, 100.0) as u8);

        let battery_voltage = heartbeat
            .and_then(|h| h.get("battery_voltage"))
            .and_then(as_number);

        let ip_address = status_node
            .and_then(|s| s.get("ip_address"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let wifi_strength = heartbeat
            .and_then(|h| h.get("wifi_strength"))
            .or_else(|| status_node.and_then(|s| s.get("wifi_strength")))
            .and_then(as_number)
            .map(|v| v as i64);

        let last_heartbeat = heartbeat
            .and_then(|h| h.get("timestamp"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        let pending_command = node
            .and_then(|n| n.get("commands"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let sensors = node
            .and_then(|n| n.get("sensors"))
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(name, reading)| {
                        let value = reading.get("value").unwrap_or(reading).clone();
                        (name.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            device_id: device_id.to_string(),
            status,
            battery,
            battery_level: battery.map(Level::for_battery),
            battery_voltage,
            ip_address,
            wifi_strength,
            last_heartbeat,
            pending_command,
            sensors,
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
