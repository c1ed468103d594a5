//! Integration tests for the unversioned dispenser endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{get_request, json_request, parse_response_body, setup, setup_with, stored};
use serde_json::json;
use tower::ServiceExt;

// ============================================================================
// POST /api/dispense
// ============================================================================

#[tokio::test]
async fn test_dispense_decrements_pills() {
    let (store, app) = setup_with(json!({
        "dispensers": {"u1": {"pillsRemaining": 5, "status": "online", "battery": 70}}
    }));

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/dispense",
            json!({"userId": "u1", "pills": 2}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["pillsRemaining"], 3);
    assert!(!body["data"]["lastDispensed"].as_str().unwrap().is_empty());

    let record = stored(&store, "dispensers/u1").await;
    assert_eq!(record["pillsRemaining"], 3);
    assert_eq!(record["status"], "online");
    assert_eq!(record["battery"], 70);
    assert!(record["lastUpdated"].is_string());
}

#[tokio::test]
async fn test_dispense_defaults_to_one_pill_and_clamps() {
    let (store, app) = setup_with(json!({"dispensers": {"u1": {"pillsRemaining": 1}}}));

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/dispense", json!({"userId": "u1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stored(&store, "dispensers/u1/pillsRemaining").await, 0);

    let response = app
        .oneshot(json_request(Method::POST, "/api/dispense", json!({"userId": "u1", "pills": 3})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stored(&store, "dispensers/u1/pillsRemaining").await, 0);
}

#[tokio::test]
async fn test_dispense_unknown_user_is_not_found() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/dispense",
            json!({"userId": "ghost", "pills": 1}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_dispense_without_user_id_is_rejected() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(Method::POST, "/api/dispense", json!({"pills": 1})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.read_count(), 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_dispense_rejects_out_of_range_pills() {
    let (store, app) = setup_with(json!({"dispensers": {"u1": {"pillsRemaining": 5}}}));

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/dispense",
            json!({"userId": "u1", "pills": 0}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.read_count(), 0);
}

// ============================================================================
// POST /api/dispenser
// ============================================================================

#[tokio::test]
async fn test_upsert_creates_record_with_defaults() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(Method::POST, "/api/dispenser", json!({"userId": "u2"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["success"], true);

    let record = stored(&store, "dispensers/u2").await;
    assert_eq!(record["status"], "offline");
    assert_eq!(record["battery"], 100);
    assert_eq!(record["pillsRemaining"], 30);
    assert_eq!(record["lastDispensed"], "Never");
}

#[tokio::test]
async fn test_upsert_keeps_stored_fields_and_unknown_keys() {
    let (store, app) = setup_with(json!({
        "dispensers": {"u1": {"status": "online", "battery": 55, "pillsRemaining": 9, "owner": "alice"}}
    }));

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/dispenser",
            json!({"userId": "u1", "battery": 0}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let record = stored(&store, "dispensers/u1").await;
    assert_eq!(record["battery"], 0);
    assert_eq!(record["status"], "online");
    assert_eq!(record["pillsRemaining"], 9);
    assert_eq!(record["owner"], "alice");
}

#[tokio::test]
async fn test_upsert_rejects_invalid_battery() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/dispenser",
            json!({"userId": "u1", "battery": 101}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.write_count(), 0);
}

// ============================================================================
// GET /api/dispenser
// ============================================================================

#[tokio::test]
async fn test_get_dispenser_without_user_id_touches_nothing() {
    let (store, app) = setup();

    let response = app.oneshot(get_request("/api/dispenser")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(store.read_count(), 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_get_dispenser_returns_record_or_null() {
    let (_store, app) = setup_with(json!({"dispensers": {"u1": {"pillsRemaining": 4}}}));

    let response = app
        .clone()
        .oneshot(get_request("/api/dispenser?userId=u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["data"]["pillsRemaining"], 4);

    let response = app
        .oneshot(get_request("/api/dispenser?userId=nobody"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert!(body["data"].is_null());
}
