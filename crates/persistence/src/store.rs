//! The realtime tree store abstraction and backend selection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::firebase::FirebaseStore;
use crate::memory::MemoryStore;
use crate::path::StorePath;
use crate::subscription::Subscription;

/// A hosted tree database with push notifications.
///
/// Writes resolve once the store acknowledged them. Values handed to `set`
/// replace the whole node; `null` deletes it.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Value at `path`, `None` when nothing is stored.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    /// Overwrites the node at `path`.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Adds a child under a generated, chronologically ordered key.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError>;

    /// Deletes the node at `path`.
    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    /// Writes `value` (or deletes on `None`) only while the node still equals
    /// `expected`. Returns whether the write happened.
    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<&Value>,
        value: Option<Value>,
    ) -> Result<bool, StoreError>;

    /// Streams the value at `path`, starting with the current one.
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError>;

    /// Cheap reachability check used by the readiness check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Which store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Firebase,
}

/// Store connection settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
}

/// Creates the configured store.
pub fn create_store(settings: &StoreSettings) -> Result<Arc<dyn RealtimeStore>, StoreError> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Firebase => Ok(Arc::new(FirebaseStore::new(settings)?)),
    }
}
