//! State sync client: typed reads, whole-value writes and push subscriptions
//! on top of a [`RealtimeStore`], plus the seed-on-empty policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::metrics::{record_seed, OperationTimer};
use crate::path::StorePath;
use crate::store::RealtimeStore;
use crate::subscription::Subscription;

async fn timed<T>(
    operation: &'static str,
    future: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    let timer = OperationTimer::new(operation);
    let result = future.await;
    timer.finish(result.is_ok());
    result
}

/// Compare-and-set attempts before a transaction gives up.
pub const MAX_TRANSACTION_ATTEMPTS: usize = 64;

fn to_value<T: Serialize + ?Sized>(path: &StorePath, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::malformed(path, e))
}

fn from_value<T: DeserializeOwned>(path: &StorePath, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::malformed(path, e))
}

/// Client shared by every request handler.
#[derive(Clone)]
pub struct StateSyncClient {
    store: Arc<dyn RealtimeStore>,
}

impl StateSyncClient {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RealtimeStore> {
        &self.store
    }

    /// Streams the value at `path`, starting with the current one.
    pub async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        timed("subscribe", self.store.subscribe(path)).await
    }

    /// Stops delivery for a subscription.
    pub fn unsubscribe(&self, subscription: Subscription) {
        tracing::debug!(path = %subscription.path(), "Unsubscribing");
        subscription.unsubscribe();
    }

    pub async fn read_raw(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        timed("get", self.store.get(path)).await
    }

    pub async fn read_value<T: DeserializeOwned>(
        &self,
        path: &StorePath,
    ) -> Result<Option<T>, StoreError> {
        self.read_raw(path)
            .await?
            .map(|value| from_value(path, value))
            .transpose()
    }

    /// Overwrites the whole value at `path`. Fields not present in `value`
    /// are gone afterwards.
    pub async fn write_value<T: Serialize + ?Sized>(
        &self,
        path: &StorePath,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = to_value(path, value)?;
        timed("set", self.store.set(path, value)).await
    }

    /// Read-modify-write for partial updates: `update` receives the stored
    /// value and returns the full replacement. Runs again when another
    /// writer changed the value in between.
    pub async fn update_value<T, F>(&self, path: &StorePath, mut update: F) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> T,
    {
        let next = self
            .transact(path, |current| {
                let current = current.map(|value| from_value(path, value)).transpose()?;
                let next = update(current);
                Ok(Some((to_value(path, &next)?, next)))
            })
            .await?;
        next.ok_or_else(|| StoreError::malformed(path, "update produced no value"))
    }

    /// Compare-and-set loop over the raw value at `path`.
    ///
    /// `update` gets the current value and returns the replacement plus an
    /// output, or `None` to stop without writing. When another writer got in
    /// between, the value is re-read and `update` runs again.
    pub async fn transact<T, F>(&self, path: &StorePath, mut update: F) -> Result<Option<T>, StoreError>
    where
        F: FnMut(Option<Value>) -> Result<Option<(Value, T)>, StoreError>,
    {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let current = self.read_raw(path).await?;
            let Some((next, output)) = update(current.clone())? else {
                return Ok(None);
            };
            let written = timed(
                "compare_and_set",
                self.store.compare_and_set(path, current.as_ref(), Some(next)),
            )
            .await?;
            if written {
                return Ok(Some(output));
            }

            tracing::debug!(path = %path, attempt, "Concurrent write, retrying");
            let backoff = Duration::from_millis(rand::thread_rng().gen_range(1..=8));
            tokio::time::sleep(backoff).await;
        }
        tracing::warn!(path = %path, "Transaction abandoned under contention");
        Err(StoreError::Contention {
            path: path.to_string(),
            attempts: MAX_TRANSACTION_ATTEMPTS,
        })
    }

    pub async fn push_value<T: Serialize + ?Sized>(
        &self,
        path: &StorePath,
        value: &T,
    ) -> Result<String, StoreError> {
        let value = to_value(path, value)?;
        timed("push", self.store.push(path, value)).await
    }

    pub async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        timed("remove", self.store.remove(path)).await
    }

    /// Writes `default` if and only if nothing is stored. Returns whether
    /// this call performed the write.
    async fn seed(&self, path: &StorePath, default: Value, kind: &str) -> Result<bool, StoreError> {
        let seeded = timed(
            "compare_and_set",
            self.store.compare_and_set(path, None, Some(default)),
        )
        .await?;
        if seeded {
            tracing::info!(path = %path, kind, "Seeded empty path with defaults");
            record_seed(kind);
        }
        Ok(seeded)
    }

    /// Subscribes to `path`, writing `default` first when it is empty.
    ///
    /// The first snapshot delivered is always non-empty: either the stored
    /// value or the seeded one.
    pub async fn subscribe_or_seed<T: Serialize + ?Sized>(
        &self,
        path: &StorePath,
        default: &T,
        kind: &str,
    ) -> Result<Subscription, StoreError> {
        let mut subscription = self.subscribe(path).await?;
        match subscription.next_snapshot().await {
            Some(Ok(snapshot)) if snapshot.exists() => subscription.requeue(Ok(snapshot)),
            Some(Ok(_)) => {
                self.seed(path, to_value(path, default)?, kind).await?;
            }
            Some(Err(e)) => return Err(e),
            None => return Err(StoreError::StreamClosed),
        }
        Ok(subscription)
    }

    /// Raw value at `path`, seeding `default` when empty.
    pub async fn load_or_seed_raw(
        &self,
        path: &StorePath,
        default: Value,
        kind: &str,
    ) -> Result<Value, StoreError> {
        if let Some(value) = self.read_raw(path).await? {
            return Ok(value);
        }
        if self.seed(path, default.clone(), kind).await? {
            return Ok(default);
        }
        // Lost the race to another writer: use what it stored.
        self.read_raw(path)
            .await?
            .ok_or_else(|| StoreError::malformed(path, "value disappeared while seeding"))
    }

    /// Typed value at `path`, seeding `default` when empty.
    pub async fn load_or_seed<T: Serialize + DeserializeOwned>(
        &self,
        path: &StorePath,
        default: T,
        kind: &str,
    ) -> Result<T, StoreError> {
        let value = self
            .load_or_seed_raw(path, to_value(path, &default)?, kind)
            .await?;
        from_value(path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (MemoryStore, StateSyncClient) {
        let store = MemoryStore::new();
        let client = StateSyncClient::new(Arc::new(store.clone()));
        (store, client)
    }

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    async fn next_value(subscription: &mut Subscription) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .expect("snapshot not delivered")
            .expect("stream ended")
            .expect("store error")
            .value
    }

    #[tokio::test]
    async fn test_write_value_overwrites() {
        let (_, client) = setup();
        let target = path("dispensers/u1/device");
        client
            .write_value(&target, &json!({"battery": 50, "status": "online"}))
            .await
            .unwrap();
        client.write_value(&target, &json!({"battery": 40})).await.unwrap();
        assert_eq!(
            client.read_raw(&target).await.unwrap(),
            Some(json!({"battery": 40}))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let (store, client) = setup();
        let target = path("counters/dispensed");

        let tasks: Vec<_> = (0..40)
            .map(|_| {
                let client = client.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    client
                        .update_value(&target, |current: Option<i64>| current.unwrap_or(0) + 1)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.dump().await["counters"]["dispensed"], json!(40));
    }

    #[tokio::test]
    async fn test_transact_abort_writes_nothing() {
        let (store, client) = setup();
        let target = path("dispensers/u1");

        let outcome: Option<()> = client.transact(&target, |_| Ok(None)).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_value_spreads_previous() {
        let (_, client) = setup();
        let target = path("dispensers/u1/device");
        client
            .write_value(&target, &json!({"battery": 50, "status": "online"}))
            .await
            .unwrap();
        let updated: Value = client
            .update_value(&target, |current: Option<Value>| {
                let mut next = current.unwrap_or_else(|| json!({}));
                next["battery"] = json!(20);
                next
            })
            .await
            .unwrap();
        assert_eq!(updated, json!({"battery": 20, "status": "online"}));
    }

    #[tokio::test]
    async fn test_load_or_seed_is_idempotent() {
        let (store, client) = setup();
        let target = path("dispensers/u1/device");
        let first: Value = client
            .load_or_seed(&target, json!({"battery": 85}), "device")
            .await
            .unwrap();
        let second: Value = client
            .load_or_seed(&target, json!({"battery": 1}), "device")
            .await
            .unwrap();
        assert_eq!(first, json!({"battery": 85}));
        assert_eq!(second, json!({"battery": 85}));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_load_or_seed_keeps_existing() {
        let (store, client) = setup();
        let target = path("a");
        client.write_value(&target, &json!(7)).await.unwrap();
        let value: i64 = client.load_or_seed(&target, 1, "a").await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_or_seed_seeds_once() {
        let (store, client) = setup();
        let target = path("dispensers/u1/containers");

        let mut first = client
            .subscribe_or_seed(&target, &json!([{"id": 1}]), "containers")
            .await
            .unwrap();
        assert_eq!(next_value(&mut first).await, Some(json!([{"id": 1}])));

        let mut second = client
            .subscribe_or_seed(&target, &json!([{"id": 9}]), "containers")
            .await
            .unwrap();
        assert_eq!(next_value(&mut second).await, Some(json!([{"id": 1}])));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_subscription_follows_writes() {
        let (_, client) = setup();
        let target = path("dispensers/u1/device");
        let mut sub = client
            .subscribe_or_seed(&target, &json!({"battery": 85}), "device")
            .await
            .unwrap();
        assert_eq!(next_value(&mut sub).await, Some(json!({"battery": 85})));

        client.write_value(&target, &json!({"battery": 60})).await.unwrap();
        assert_eq!(next_value(&mut sub).await, Some(json!({"battery": 60})));
        client.unsubscribe(sub);
    }

    #[tokio::test]
    async fn test_errors_surface() {
        let (store, client) = setup();
        store.set_offline(true);
        assert!(client.read_raw(&path("a")).await.is_err());
        assert!(client
            .subscribe_or_seed(&path("a"), &json!(1), "a")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_read_value_reports_malformed() {
        let (_, client) = setup();
        client.write_value(&path("a"), &json!("text")).await.unwrap();
        let result: Result<Option<u32>, _> = client.read_value(&path("a")).await;
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }
}
