//! Firebase Realtime Database backend.
//!
//! Uses the REST API: `{base}/{path}.json` for reads and writes, the
//! `text/event-stream` variant of the same URL for subscriptions, and ETag
//! conditional requests for compare-and-set.

mod sse;

pub use sse::{SseDecoder, SseEvent};

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ETAG, IF_MATCH};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::store::{RealtimeStore, StoreSettings};
use crate::subscription::{Snapshot, SnapshotSender, Subscription};
use crate::tree;

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";

/// Firebase REST error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Body of `POST`, naming the generated key.
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Payload of `put` and `patch` stream events.
#[derive(Debug, Deserialize)]
struct StreamData {
    path: String,
    data: Value,
}

/// Client for one database instance.
pub struct FirebaseStore {
    client: Client,
    /// Streams stay open indefinitely, so they use a client without a
    /// total request timeout.
    stream_client: Client,
    base: Url,
    auth_token: Option<String>,
}

impl FirebaseStore {
    /// Create a store client for the database at `settings.url`.
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        let base = Url::parse(&settings.url)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {}", settings.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidPath(settings.url.clone()));
        }
        let timeout = Duration::from_secs(settings.request_timeout_secs);

        let client = Client::builder().timeout(timeout).build()?;
        let stream_client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            stream_client,
            base,
            auth_token: settings.auth_token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn url_for(&self, path: &StorePath, query: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidPath(self.base.to_string()))?;
            segments.pop_if_empty();
            match path.segments().split_last() {
                Some((last, init)) => {
                    segments.extend(init);
                    segments.push(&format!("{}.json", last));
                }
                None => {
                    segments.push(".json");
                }
            }
        }
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some(token) = &self.auth_token {
                pairs.append_pair("auth", token);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    async fn send(request: RequestBuilder) -> Result<Response, StoreError> {
        check(request.send().await?).await
    }
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(StoreError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn split_event_path(raw: &str) -> Vec<String> {
    raw.split('/')
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect()
}

/// Local copy of the subscribed subtree, rebuilt from stream events.
#[derive(Debug, Default)]
struct StreamMirror {
    root: Value,
    last: Option<Option<Value>>,
}

impl StreamMirror {
    /// Applies one event. Returns the new value when it changed.
    fn apply(&mut self, path: &StorePath, event: &SseEvent) -> Result<Option<Option<Value>>, StoreError> {
        match event.name.as_str() {
            "put" => {
                let data: StreamData = serde_json::from_str(&event.data)
                    .map_err(|e| StoreError::malformed(path, e))?;
                tree::set_at(&mut self.root, &split_event_path(&data.path), tree::normalize(data.data));
            }
            "patch" => {
                let data: StreamData = serde_json::from_str(&event.data)
                    .map_err(|e| StoreError::malformed(path, e))?;
                let base = split_event_path(&data.path);
                let Value::Object(children) = data.data else {
                    return Err(StoreError::malformed(path, "patch data is not an object"));
                };
                for (key, value) in children {
                    let mut segments = base.clone();
                    segments.extend(split_event_path(&key));
                    tree::set_at(&mut self.root, &segments, tree::normalize(value));
                }
            }
            "keep-alive" => return Ok(None),
            "cancel" | "auth_revoked" => return Err(StoreError::Unauthorized),
            other => {
                tracing::trace!(event = other, "Ignoring unknown stream event");
                return Ok(None);
            }
        }

        let current = (!tree::is_empty(&self.root)).then(|| tree::denormalize(self.root.clone()));
        if self.last.as_ref() == Some(&current) {
            return Ok(None);
        }
        self.last = Some(current.clone());
        Ok(Some(current))
    }
}

/// Reads the event stream until it ends, the consumer goes away or an error
/// occurs. Returns `Ok` only when the consumer dropped the subscription.
async fn pump_events(
    request: RequestBuilder,
    path: &StorePath,
    sender: &SnapshotSender,
) -> Result<(), StoreError> {
    let response = FirebaseStore::send(request).await?;
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut mirror = StreamMirror::default();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for event in decoder.feed(&chunk) {
            if let Some(value) = mirror.apply(path, &event)? {
                if sender.send(Ok(Snapshot::new(path.clone(), value))).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    Err(StoreError::StreamClosed)
}

#[async_trait]
impl RealtimeStore for FirebaseStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let url = self.url_for(path, &[])?;
        let value: Value = Self::send(self.client.get(url)).await?.json().await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let url = self.url_for(path, &[("print", "silent")])?;
        let request = match tree::normalize(value) {
            Some(value) => self.client.put(url).json(&value),
            None => self.client.delete(url),
        };
        Self::send(request).await?;
        Ok(())
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let url = self.url_for(path, &[])?;
        let created: PushResponse = Self::send(self.client.post(url).json(&value))
            .await?
            .json()
            .await?;
        Ok(created.name)
    }

    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<&Value>,
        value: Option<Value>,
    ) -> Result<bool, StoreError> {
        let url = self.url_for(path, &[])?;
        let response =
            Self::send(self.client.get(url.clone()).header(ETAG_REQUEST_HEADER, "true")).await?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::malformed(path, "missing ETag header"))?;
        let current: Value = response.json().await?;

        if tree::normalize(current) != expected.cloned().and_then(tree::normalize) {
            return Ok(false);
        }

        let request = match value.and_then(tree::normalize) {
            Some(value) => self.client.put(url).json(&value),
            None => self.client.delete(url),
        };
        let response = request.header(IF_MATCH, etag).send().await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let url = self.url_for(path, &[])?;
        let request = self
            .stream_client
            .get(url)
            .header(ACCEPT, "text/event-stream");
        let (subscription, sender, cancel) = Subscription::channel(path.clone());
        let path = path.clone();

        tokio::spawn(async move {
            tracing::debug!(path = %path, "Opening store event stream");
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                outcome = pump_events(request, &path, &sender) => outcome,
            };
            if let Err(e) = outcome {
                tracing::warn!(path = %path, error = %e, "Store event stream ended");
                let _ = sender.send(Err(e)).await;
            }
        });

        Ok(subscription)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = self.url_for(&StorePath::root(), &[("shallow", "true")])?;
        Self::send(self.client.get(url)).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "firebase"
    }
}
