//! Dispenser repository: the legacy record, the container set and the
//! user-level device status, all under `dispensers/{userId}`.

use chrono::{DateTime, Utc};
use domain::models::container::dispense_from;
use domain::models::{DeviceStatus, DispenserContainer, DispenserRecord, UpdateDispenserRequest};
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::path::{paths, StorePath};
use crate::subscription::Subscription;
use crate::sync::StateSyncClient;

/// Decodes a container list stored either as an array or as an object keyed
/// by slot. Entries come back ordered by container id.
pub fn decode_containers(path: &StorePath, value: Value) -> Result<Vec<DispenserContainer>, StoreError> {
    let entries: Vec<Value> = match value {
        Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).collect(),
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => return Err(StoreError::malformed(path, format!("expected a list, got {}", other))),
    };
    let mut containers = entries
        .into_iter()
        .map(serde_json::from_value::<DispenserContainer>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::malformed(path, e))?;
    containers.sort_by_key(|c| c.id);
    Ok(containers)
}

fn encode<T: Serialize + ?Sized>(path: &StorePath, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::malformed(path, e))
}

/// Repository for dispenser state owned by one user.
///
/// Read-modify-write operations go through compare-and-set transactions so
/// concurrent requests never overwrite each other's changes.
#[derive(Clone)]
pub struct DispenserRepository {
    sync: StateSyncClient,
}

impl DispenserRepository {
    pub fn new(sync: StateSyncClient) -> Self {
        Self { sync }
    }

    /// Legacy record, `None` when the user has none.
    pub async fn find_record(&self, user_id: &str) -> Result<Option<DispenserRecord>, StoreError> {
        self.sync.read_value(&paths::dispenser_record(user_id)?).await
    }

    /// Dispenses `pills` from the legacy record. `None` when the user has no
    /// record, in which case nothing is written.
    pub async fn dispense_record(
        &self,
        user_id: &str,
        pills: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenserRecord>, StoreError> {
        let path = paths::dispenser_record(user_id)?;
        self.sync
            .transact(&path, |current| {
                let Some(value) = current else {
                    return Ok(None);
                };
                let record: DispenserRecord =
                    serde_json::from_value(value).map_err(|e| StoreError::malformed(&path, e))?;
                let updated = record.dispensed(pills, now);
                Ok(Some((encode(&path, &updated)?, updated)))
            })
            .await
    }

    /// Creates or merges the legacy record. Returns the stored record and
    /// whether it was created.
    pub async fn upsert_record(
        &self,
        user_id: &str,
        update: &UpdateDispenserRequest,
        now: DateTime<Utc>,
    ) -> Result<(DispenserRecord, bool), StoreError> {
        let path = paths::dispenser_record(user_id)?;
        let outcome = self
            .sync
            .transact(&path, |current| {
                let created = current.is_none();
                let current = current
                    .map(serde_json::from_value::<DispenserRecord>)
                    .transpose()
                    .map_err(|e| StoreError::malformed(&path, e))?;
                let record = DispenserRecord::upserted(current, update, now);
                Ok(Some((encode(&path, &record)?, (record, created))))
            })
            .await?;
        outcome.ok_or_else(|| StoreError::malformed(&path, "upsert produced no record"))
    }

    /// Container set, seeding the default five slots when empty.
    pub async fn load_containers(&self, user_id: &str) -> Result<Vec<DispenserContainer>, StoreError> {
        let path = paths::containers(user_id)?;
        let default = encode(&path, &DispenserContainer::default_set())?;
        let value = self.sync.load_or_seed_raw(&path, default, "containers").await?;
        decode_containers(&path, value)
    }

    /// Takes one pill out of container `container_id`, never going below
    /// zero. `None` when the user has no such container.
    pub async fn dispense_container(
        &self,
        user_id: &str,
        container_id: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<DispenserContainer>, StoreError> {
        let path = paths::containers(user_id)?;
        self.sync
            .transact(&path, |current| {
                let Some(value) = current else {
                    return Ok(None);
                };
                let mut containers = decode_containers(&path, value)?;
                let Ok(container) = dispense_from(&mut containers, container_id, now) else {
                    return Ok(None);
                };
                Ok(Some((encode(&path, &containers)?, container)))
            })
            .await
    }

    /// Live container set, seeded when empty.
    pub async fn watch_containers(&self, user_id: &str) -> Result<Subscription, StoreError> {
        self.sync
            .subscribe_or_seed(
                &paths::containers(user_id)?,
                &DispenserContainer::default_set(),
                "containers",
            )
            .await
    }

    /// Device status, seeding `{battery: 85, status: offline}` when empty.
    pub async fn load_device_status(&self, user_id: &str) -> Result<DeviceStatus, StoreError> {
        self.sync
            .load_or_seed(&paths::device_status(user_id)?, DeviceStatus::default(), "device")
            .await
    }

    pub async fn save_device_status(&self, user_id: &str, status: &DeviceStatus) -> Result<(), StoreError> {
        self.sync
            .write_value(&paths::device_status(user_id)?, status)
            .await
    }

    /// Live device status, seeded when empty.
    pub async fn watch_device_status(&self, user_id: &str) -> Result<Subscription, StoreError> {
        self.sync
            .subscribe_or_seed(&paths::device_status(user_id)?, &DeviceStatus::default(), "device")
            .await
    }
}
