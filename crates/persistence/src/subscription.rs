//! Push-stream handles over a store path.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::path::StorePath;

/// Capacity of the channel between a store's feeder task and its consumer.
pub const SUBSCRIPTION_BUFFER: usize = 16;

/// Full value at a path at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: StorePath,
    pub value: Option<Value>,
}

impl Snapshot {
    pub fn new(path: StorePath, value: Option<Value>) -> Self {
        Self { path, value }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Decodes the value, `None` when nothing is stored.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        self.value
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::malformed(&self.path, e))
    }
}

pub type SnapshotResult = Result<Snapshot, StoreError>;

/// Sending half handed to the task that feeds a subscription.
pub type SnapshotSender = mpsc::Sender<SnapshotResult>;

/// Live subscription to one path.
///
/// The first item is the value at subscription time; later items arrive on
/// every change that alters it. Dropping the handle cancels delivery.
#[derive(Debug)]
pub struct Subscription {
    path: StorePath,
    pending: Option<SnapshotResult>,
    receiver: mpsc::Receiver<SnapshotResult>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Creates the handle plus the sender and token its feeder task uses.
    pub fn channel(path: StorePath) -> (Self, SnapshotSender, CancellationToken) {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let subscription = Self {
            path,
            pending: None,
            receiver,
            cancel: cancel.clone(),
        };
        (subscription, sender, cancel)
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Next snapshot, or `None` once the feeder stopped.
    pub async fn next_snapshot(&mut self) -> Option<SnapshotResult> {
        if let Some(pending) = self.pending.take() {
            return Some(pending);
        }
        self.receiver.recv().await
    }

    /// Re-queues a snapshot so it is delivered before anything else.
    pub(crate) fn requeue(&mut self, snapshot: SnapshotResult) {
        self.pending = Some(snapshot);
    }

    /// Stops delivery. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = SnapshotResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(pending) = this.pending.take() {
            return Poll::Ready(Some(pending));
        }
        this.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_drop_cancels_feeder() {
        let (subscription, _sender, cancel) = Subscription::channel(StorePath::root());
        assert!(!cancel.is_cancelled());
        drop(subscription);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_requeued_snapshot_comes_first() {
        let path = StorePath::parse("a").unwrap();
        let (mut subscription, sender, _cancel) = Subscription::channel(path.clone());
        sender
            .send(Ok(Snapshot::new(path.clone(), Some(json!(2)))))
            .await
            .unwrap();
        subscription.requeue(Ok(Snapshot::new(path.clone(), Some(json!(1)))));

        let first = subscription.next().await.unwrap().unwrap();
        let second = subscription.next().await.unwrap().unwrap();
        assert_eq!(first.value, Some(json!(1)));
        assert_eq!(second.value, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_stream_ends_when_sender_dropped() {
        let (mut subscription, sender, _cancel) = Subscription::channel(StorePath::root());
        drop(sender);
        assert!(subscription.next_snapshot().await.is_none());
    }

    #[test]
    fn test_snapshot_decode() {
        let path = StorePath::parse("n").unwrap();
        let snapshot = Snapshot::new(path.clone(), Some(json!(7)));
        assert_eq!(snapshot.decode::<u32>().unwrap(), Some(7));
        assert_eq!(Snapshot::new(path.clone(), None).decode::<u32>().unwrap(), None);
        assert!(Snapshot::new(path, Some(json!("x"))).decode::<u32>().is_err());
    }
}
