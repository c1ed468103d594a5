//! Schedule repository.
//!
//! Schedules live under `schedules/{userId}/{scheduleId}`. Every write is
//! mirrored to `pilldispenser/devices/{deviceId}/schedules/{scheduleId}` in
//! the shape the firmware reads. The user copy records which device holds
//! the mirror.

use domain::models::{DeviceSchedule, Schedule, ScheduleEntry};
use serde_json::Value;

use crate::error::StoreError;
use crate::path::paths;
use crate::sync::StateSyncClient;

/// Repository for schedule operations.
#[derive(Clone)]
pub struct ScheduleRepository {
    sync: StateSyncClient,
}

impl ScheduleRepository {
    pub fn new(sync: StateSyncClient) -> Self {
        Self { sync }
    }

    /// All schedules of a user in key order, which for pushed keys is
    /// creation order. Entries that do not decode are skipped.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ScheduleEntry>, StoreError> {
        let Some(Value::Object(map)) = self.sync.read_raw(&paths::user_schedules(user_id)?).await?
        else {
            return Ok(Vec::new());
        };
        Ok(map
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value::<Schedule>(value) {
                Ok(schedule) => Some(ScheduleEntry { id, schedule }),
                Err(e) => {
                    tracing::warn!(user_id, schedule_id = %id, error = %e, "Skipping malformed schedule");
                    None
                }
            })
            .collect())
    }

    pub async fn find(&self, user_id: &str, schedule_id: &str) -> Result<Option<Schedule>, StoreError> {
        let path = paths::user_schedules(user_id)?.child(schedule_id)?;
        self.sync.read_value(&path).await
    }

    /// Stores a new schedule under a generated key and mirrors it to
    /// `device_id`, which is recorded on the stored schedule.
    pub async fn create(
        &self,
        user_id: &str,
        device_id: &str,
        schedule: &Schedule,
        device_copy: &DeviceSchedule,
    ) -> Result<String, StoreError> {
        let mirror_root = paths::device_schedules(device_id)?;
        let stored = Schedule {
            device_id: Some(device_id.to_string()),
            ..schedule.clone()
        };
        let id = self
            .sync
            .push_value(&paths::user_schedules(user_id)?, &stored)
            .await?;
        self.sync.write_value(&mirror_root.child(&id)?, device_copy).await?;
        Ok(id)
    }

    /// Overwrites a schedule and mirrors it to `device_id`. When the mirror
    /// previously lived on `moved_from`, that copy is removed.
    pub async fn save(
        &self,
        user_id: &str,
        device_id: &str,
        schedule_id: &str,
        schedule: &Schedule,
        device_copy: &DeviceSchedule,
        moved_from: Option<&str>,
    ) -> Result<(), StoreError> {
        let path = paths::user_schedules(user_id)?.child(schedule_id)?;
        let mirror = paths::device_schedules(device_id)?.child(schedule_id)?;
        let stale = match moved_from {
            Some(previous) if previous != device_id => {
                Some(paths::device_schedules(previous)?.child(schedule_id)?)
            }
            _ => None,
        };

        let stored = Schedule {
            device_id: Some(device_id.to_string()),
            ..schedule.clone()
        };
        self.sync.write_value(&path, &stored).await?;
        self.sync.write_value(&mirror, device_copy).await?;
        if let Some(stale) = stale {
            self.sync.remove(&stale).await?;
        }
        Ok(())
    }

    /// Removes a schedule and its device copy. The copy is looked up on the
    /// device recorded in the schedule, or on `fallback_device` for records
    /// that carry none. Returns false when the user has no schedule with
    /// that id.
    pub async fn delete(
        &self,
        user_id: &str,
        schedule_id: &str,
        fallback_device: &str,
    ) -> Result<bool, StoreError> {
        let path = paths::user_schedules(user_id)?.child(schedule_id)?;
        let Some(current) = self.sync.read_raw(&path).await? else {
            return Ok(false);
        };
        let device_id = current
            .get("device_id")
            .and_then(Value::as_str)
            .unwrap_or(fallback_device);
        let mirror = paths::device_schedules(device_id)?.child(schedule_id)?;
        self.sync.remove(&path).await?;
        self.sync.remove(&mirror).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use domain::models::PillSize;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MemoryStore, ScheduleRepository) {
        let store = MemoryStore::new();
        let repo = ScheduleRepository::new(StateSyncClient::new(Arc::new(store.clone())));
        (store, repo)
    }

    fn schedule() -> Schedule {
        Schedule {
            dispenser_id: 2,
            time: "07:30".into(),
            enabled: true,
            medication_name: "Aspirin".into(),
            patient_name: "Ann".into(),
            pill_size: PillSize::Small,
            days: vec![0, 2, 4],
            device_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_mirrors_to_device() {
        let (store, repo) = setup();
        let schedule = schedule();
        let device_copy = DeviceSchedule::try_from(&schedule).unwrap();
        let id = repo.create("u1", "PD_1", &schedule, &device_copy).await.unwrap();

        let tree = store.dump().await;
        assert_eq!(tree["schedules"]["u1"][&id]["time"], "07:30");
        let mirrored = &tree["pilldispenser"]["devices"]["PD_1"]["schedules"][&id];
        assert_eq!(mirrored["dispenser_id"], 1);
        assert_eq!(mirrored["hour"], 7);
        assert_eq!(mirrored["minute"], 30);
        assert_eq!(tree["schedules"]["u1"][&id]["device_id"], "PD_1");
    }

    #[tokio::test]
    async fn test_list_and_find() {
        let (_, repo) = setup();
        let schedule = schedule();
        let device_copy = DeviceSchedule::try_from(&schedule).unwrap();
        let first = repo.create("u1", "PD_1", &schedule, &device_copy).await.unwrap();
        let second = repo.create("u1", "PD_1", &schedule, &device_copy).await.unwrap();

        let entries = repo.list("u1").await.unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);
        let found = repo.find("u1", &first).await.unwrap().unwrap();
        assert_eq!(found.device_id.as_deref(), Some("PD_1"));
        assert_eq!(found.time, schedule.time);
        assert_eq!(repo.find("u1", "missing").await.unwrap(), None);
        assert!(repo.list("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_reads_missing_days_as_empty() {
        let store = MemoryStore::with_tree(json!({"schedules": {"u1": {
            "-Nabc": {"dispenser_id": 1, "time": "08:00", "enabled": true},
            "-Nbad": {"time": 5}
        }}}));
        let repo = ScheduleRepository::new(StateSyncClient::new(Arc::new(store)));
        let entries = repo.list("u1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].schedule.days.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_both_copies() {
        let (store, repo) = setup();
        let schedule = schedule();
        let device_copy = DeviceSchedule::try_from(&schedule).unwrap();
        let id = repo.create("u1", "PD_1", &schedule, &device_copy).await.unwrap();

        assert!(repo.delete("u1", &id, "PD_DEFAULT").await.unwrap());
        assert_eq!(store.dump().await, Value::Null);
        assert!(!repo.delete("u1", &id, "PD_DEFAULT").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_without_recorded_device_uses_fallback() {
        let store = MemoryStore::with_tree(json!({
            "schedules": {"u1": {"-Nold": {"dispenser_id": 1, "time": "08:00"}}},
            "pilldispenser": {"devices": {"PD_DEFAULT": {"schedules": {"-Nold": {"hour": 8}}}}}
        }));
        let repo = ScheduleRepository::new(StateSyncClient::new(Arc::new(store.clone())));

        assert!(repo.delete("u1", "-Nold", "PD_DEFAULT").await.unwrap());
        assert_eq!(store.dump().await, Value::Null);
    }

    #[tokio::test]
    async fn test_save_moves_device_copy() {
        let (store, repo) = setup();
        let schedule = schedule();
        let device_copy = DeviceSchedule::try_from(&schedule).unwrap();
        let id = repo.create("u1", "PD_1", &schedule, &device_copy).await.unwrap();

        repo.save("u1", "PD_2", &id, &schedule, &device_copy, Some("PD_1"))
            .await
            .unwrap();

        let tree = store.dump().await;
        assert!(tree["pilldispenser"]["devices"]["PD_1"].is_null());
        assert_eq!(tree["pilldispenser"]["devices"]["PD_2"]["schedules"][&id]["hour"], 7);
        assert_eq!(tree["schedules"]["u1"][&id]["device_id"], "PD_2");
    }
}
