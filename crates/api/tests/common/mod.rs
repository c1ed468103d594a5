//! Common test utilities for integration tests.
//!
//! Every test runs the full router against an in-process `MemoryStore`, so
//! the store contents and access counters can be inspected directly.

// Helpers are shared by several test binaries; not all of them use each one.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use persistence::MemoryStore;
use pill_dispenser_api::{
    app::{create_app, AppState},
    config::Config,
};
use serde_json::Value;

/// Default device the test config falls back to.
pub const TEST_DEVICE: &str = "PILL_DISPENSER_DEFAULT";

/// Test configuration: memory backend, default delays.
pub fn test_config() -> Config {
    Config::load_for_test(&[]).expect("Failed to load test config")
}

/// Test configuration with a custom watchdog delay.
pub fn test_config_with_clear_delay(clear_delay_ms: u64) -> Config {
    let delay = clear_delay_ms.to_string();
    Config::load_for_test(&[("dispatcher.clear_delay_ms", delay.as_str())])
        .expect("Failed to load test config")
}

/// Create a test application router over `store`.
pub fn create_test_app(config: Config, store: &MemoryStore) -> Router {
    create_app(test_state(config, store))
}

/// Application state over `store`, for tests that trigger shutdown.
pub fn test_state(config: Config, store: &MemoryStore) -> AppState {
    AppState::new(config, Arc::new(store.clone()))
}

/// Empty store plus a router over it.
pub fn setup() -> (MemoryStore, Router) {
    let store = MemoryStore::new();
    let app = create_test_app(test_config(), &store);
    (store, app)
}

/// Store preloaded with `tree` plus a router over it.
pub fn setup_with(tree: Value) -> (MemoryStore, Router) {
    let store = MemoryStore::with_tree(tree);
    let app = create_test_app(test_config(), &store);
    (store, app)
}

/// Build a request with a JSON body.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request.
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Build a DELETE request.
pub fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Build a POST request without a body.
pub fn empty_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Helper to read a response body as text.
pub async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Value stored at a slash-separated path, `Null` when absent.
pub async fn stored(store: &MemoryStore, path: &str) -> Value {
    let mut node = store.dump().await;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        node = match &node {
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
            other => other.get(segment).cloned(),
        }
        .unwrap_or(Value::Null);
    }
    node
}
