//! In-process store with the same tree and notification semantics as the
//! hosted database. Used for tests and local development.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

use crate::error::StoreError;
use crate::path::StorePath;
use crate::push_id::PushIdGenerator;
use crate::store::RealtimeStore;
use crate::subscription::{Snapshot, Subscription};
use crate::tree;

const CHANGE_BUFFER: usize = 256;

#[derive(Debug)]
struct Inner {
    tree: RwLock<Value>,
    changes: broadcast::Sender<StorePath>,
    push_ids: PushIdGenerator,
    reads: AtomicU64,
    writes: AtomicU64,
    offline: AtomicBool,
}

impl Inner {
    async fn read_at(&self, path: &StorePath) -> Option<Value> {
        let root = self.tree.read().await;
        tree::get_at(&root, path.segments())
            .cloned()
            .map(tree::denormalize)
    }

    async fn write_at(&self, path: &StorePath, value: Option<Value>) {
        {
            let mut root = self.tree.write().await;
            tree::set_at(&mut root, path.segments(), value);
        }
        // No receivers just means nobody is subscribed.
        let _ = self.changes.send(path.clone());
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("memory store is offline".into()));
        }
        Ok(())
    }
}

/// Tree kept in memory behind a lock, with a broadcast of changed paths.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_tree(Value::Null)
    }

    /// Starts from an existing tree.
    pub fn with_tree(initial: Value) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(tree::normalize(initial).unwrap_or(Value::Null)),
                changes,
                push_ids: PushIdGenerator::new(),
                reads: AtomicU64::new(0),
                writes: AtomicU64::new(0),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Number of read operations served, subscriptions included.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of write operations accepted.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Makes every later operation fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Copy of the whole tree, bypassing the counters.
    pub async fn dump(&self) -> Value {
        let root = self.inner.tree.read().await;
        if tree::is_empty(&root) {
            return Value::Null;
        }
        tree::denormalize(root.clone())
    }

    fn count_read(&self) -> Result<(), StoreError> {
        self.inner.check_online()?;
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn count_write(&self) -> Result<(), StoreError> {
        self.inner.check_online()?;
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.count_read()?;
        Ok(self.inner.read_at(path).await)
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.count_write()?;
        self.inner.write_at(path, tree::normalize(value)).await;
        Ok(())
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        self.count_write()?;
        let key = self.inner.push_ids.next_id();
        let child = path.child(&key)?;
        self.inner.write_at(&child, tree::normalize(value)).await;
        Ok(key)
    }

    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<&Value>,
        value: Option<Value>,
    ) -> Result<bool, StoreError> {
        self.count_write()?;
        let expected = expected.cloned().and_then(tree::normalize);
        {
            let mut root = self.inner.tree.write().await;
            let current = tree::get_at(&root, path.segments()).cloned();
            if current != expected {
                return Ok(false);
            }
            tree::set_at(&mut root, path.segments(), value.and_then(tree::normalize));
        }
        let _ = self.inner.changes.send(path.clone());
        Ok(true)
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        self.count_read()?;
        let (subscription, sender, cancel) = Subscription::channel(path.clone());
        // Listen before the first read so no change slips in between.
        let mut changes = self.inner.changes.subscribe();
        let inner = Arc::clone(&self.inner);
        let path = path.clone();

        tokio::spawn(async move {
            let mut last = inner.read_at(&path).await;
            if sender
                .send(Ok(Snapshot::new(path.clone(), last.clone())))
                .await
                .is_err()
            {
                return;
            }

            loop {
                let changed = tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = changes.recv() => changed,
                };
                match changed {
                    Ok(changed) if !changed.overlaps(&path) => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let current = inner.read_at(&path).await;
                if current == last {
                    continue;
                }
                last = current.clone();
                let delivered = tokio::select! {
                    _ = cancel.cancelled() => false,
                    sent = sender.send(Ok(Snapshot::new(path.clone(), current))) => sent.is_ok(),
                };
                if !delivered {
                    break;
                }
            }
            tracing::trace!(path = %path, "Memory subscription closed");
        });

        Ok(subscription)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.check_online()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
