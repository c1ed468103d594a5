//! Telemetry repository: what a physical device publishes about itself.

use domain::models::DeviceOverview;

use crate::error::StoreError;
use crate::path::paths;
use crate::subscription::Subscription;
use crate::sync::StateSyncClient;

/// Repository for device telemetry reads.
#[derive(Clone)]
pub struct TelemetryRepository {
    sync: StateSyncClient,
}

impl TelemetryRepository {
    pub fn new(sync: StateSyncClient) -> Self {
        Self { sync }
    }

    /// Overview derived from `pilldispenser/device/{deviceId}`. A device that
    /// never reported yields an offline overview, not an error.
    pub async fn overview(&self, device_id: &str) -> Result<DeviceOverview, StoreError> {
        let node = self.sync.read_raw(&paths::device(device_id)?).await?;
        Ok(DeviceOverview::from_telemetry(device_id, node.as_ref()))
    }

    /// Live telemetry node of one device.
    pub async fn watch(&self, device_id: &str) -> Result<Subscription, StoreError> {
        self.sync.subscribe(&paths::device(device_id)?).await
    }
}
