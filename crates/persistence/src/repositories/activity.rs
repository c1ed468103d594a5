//! Activity repository: device pill logs and reports.

use domain::models::{PillLog, PillReport};
use domain::services::activity::{collect_logs, collect_reports};

use crate::error::StoreError;
use crate::path::paths;
use crate::sync::StateSyncClient;

/// Repository for activity reads.
#[derive(Clone)]
pub struct ActivityRepository {
    sync: StateSyncClient,
}

impl ActivityRepository {
    pub fn new(sync: StateSyncClient) -> Self {
        Self { sync }
    }

    /// Every pill log of every device, newest first.
    pub async fn logs(&self) -> Result<Vec<PillLog>, StoreError> {
        Ok(self
            .sync
            .read_raw(&paths::devices()?)
            .await?
            .map(|devices| collect_logs(&devices))
            .unwrap_or_default())
    }

    /// Every report, newest first.
    pub async fn reports(&self) -> Result<Vec<PillReport>, StoreError> {
        Ok(self
            .sync
            .read_raw(&paths::reports()?)
            .await?
            .map(|reports| collect_reports(&reports))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_empty_store() {
        let repo = ActivityRepository::new(StateSyncClient::new(Arc::new(MemoryStore::new())));
        assert!(repo.logs().await.unwrap().is_empty());
        assert!(repo.reports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_logs_and_reports() {
        let store = MemoryStore::with_tree(json!({"pilldispenser": {
            "device": {
                "PD_1": {"pill_logs": {
                    "1": {"timestamp": "2024-01-01 08:00:00", "pill_count": 1, "device_id": "PD_1"},
                    "2": {"timestamp": "2024-01-02 08:00:00", "pill_count": 1, "device_id": "PD_1"}
                }}
            },
            "reports": {
                "-Na": {"datetime": "2024-01-02 09:00:00", "description": "ok", "pill_count": 1, "status": 1}
            }
        }}));
        let repo = ActivityRepository::new(StateSyncClient::new(Arc::new(store)));
        let logs = repo.logs().await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].timestamp, "2024-01-02 08:00:00");
        assert_eq!(repo.reports().await.unwrap().len(), 1);
    }
}
