//! Validated locations in the realtime tree.

use std::fmt;

use shared::validation::validate_path_key;

use crate::error::StoreError;

/// A slash-separated location in the tree, built from validated keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The tree root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses `a/b/c`. Leading, trailing and doubled slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        raw.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(Self::root(), |path, segment| path.child(segment))
    }

    /// Appends one key.
    pub fn child(&self, key: impl AsRef<str>) -> Result<Self, StoreError> {
        let key = key.as_ref();
        validate_path_key(key).map_err(|_| StoreError::InvalidPath(format!("{}/{}", self, key)))?;
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last key, or `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            segments: init.to_vec(),
        })
    }

    /// Whether `self` equals `other` or lies under it.
    pub fn starts_with(&self, other: &StorePath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Whether a write at one path can change the value at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Builders for every location this service reads or writes.
pub mod paths {
    use super::StorePath;
    use crate::error::StoreError;

    pub const DISPENSERS: &str = "dispensers";
    pub const DEVICE_ROOT: &str = "pilldispenser";
    pub const SCHEDULES: &str = "schedules";

    /// `dispensers/{userId}`: the legacy single record.
    pub fn dispenser_record(user_id: &str) -> Result<StorePath, StoreError> {
        StorePath::root().child(DISPENSERS)?.child(user_id)
    }

    /// `dispensers/{userId}/containers`
    pub fn containers(user_id: &str) -> Result<StorePath, StoreError> {
        dispenser_record(user_id)?.child("containers")
    }

    /// `dispensers/{userId}/device`
    pub fn device_status(user_id: &str) -> Result<StorePath, StoreError> {
        dispenser_record(user_id)?.child("device")
    }

    /// `pilldispenser/device`: telemetry of every device.
    pub fn devices() -> Result<StorePath, StoreError> {
        StorePath::root().child(DEVICE_ROOT)?.child("device")
    }

    /// `pilldispenser/device/{deviceId}`
    pub fn device(device_id: &str) -> Result<StorePath, StoreError> {
        devices()?.child(device_id)
    }

    /// `pilldispenser/device/{deviceId}/commands`: the single-slot inbox.
    pub fn device_commands(device_id: &str) -> Result<StorePath, StoreError> {
        device(device_id)?.child("commands")
    }

    /// `pilldispenser/reports`
    pub fn reports() -> Result<StorePath, StoreError> {
        StorePath::root().child(DEVICE_ROOT)?.child("reports")
    }

    /// `schedules/{userId}`
    pub fn user_schedules(user_id: &str) -> Result<StorePath, StoreError> {
        StorePath::root().child(SCHEDULES)?.child(user_id)
    }

    /// `pilldispenser/devices/{deviceId}/schedules`: the copy the firmware polls.
    pub fn device_schedules(device_id: &str) -> Result<StorePath, StoreError> {
        StorePath::root()
            .child(DEVICE_ROOT)?
            .child("devices")?
            .child(device_id)?
            .child(SCHEDULES)
    }
}
