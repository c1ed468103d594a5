//! Integration tests for device status, telemetry and raw commands.

mod common;

use axum::http::{Method, StatusCode};
use common::{get_request, json_request, parse_response_body, setup, setup_with, stored};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_get_device_status_seeds_default() {
    let (store, app) = setup();

    let response = app
        .oneshot(get_request("/api/v1/users/u1/device"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["battery"], 85);
    assert_eq!(body["status"], "offline");
    assert_eq!(body["batteryLevel"], "high");

    assert_eq!(
        stored(&store, "dispensers/u1/device").await,
        json!({"battery": 85, "status": "offline"})
    );
}

#[tokio::test]
async fn test_update_device_status() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(
            Method::PUT,
            "/api/v1/users/u1/device",
            json!({"battery": 20, "status": "online"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["batteryLevel"], "low");
    assert_eq!(
        stored(&store, "dispensers/u1/device").await,
        json!({"battery": 20, "status": "online"})
    );
}

#[tokio::test]
async fn test_update_device_status_rejects_battery_out_of_range() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(
            Method::PUT,
            "/api/v1/users/u1/device",
            json!({"battery": 140, "status": "online"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_device_overview_from_telemetry() {
    let (_store, app) = setup_with(json!({
        "pilldispenser": {"device": {"PD_1": {
            "heartbeat": {"device_status": "online", "battery_percentage": 64.4, "timestamp": "2024-05-01 09:00:00"},
            "status": {"ip_address": "10.0.0.7"},
            "sensors": {"ir": {"value": 1}}
        }}}
    }));

    let response = app
        .oneshot(get_request("/api/v1/devices/PD_1/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["deviceId"], "PD_1");
    assert_eq!(body["status"], "online");
    assert_eq!(body["battery"], 64);
    assert_eq!(body["batteryLevel"], "medium");
    assert_eq!(body["ipAddress"], "10.0.0.7");
    assert_eq!(body["sensors"]["ir"], 1);
}

#[tokio::test]
async fn test_device_overview_for_silent_device_is_offline() {
    let (_store, app) = setup();

    let response = app
        .oneshot(get_request("/api/v1/devices/PD_NEW/status"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "offline");
    assert!(body.get("battery").is_none());
}

#[tokio::test]
async fn test_raw_command_is_normalized() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/devices/PD_1/commands",
            json!({"command": " dispense:4 "}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = parse_response_body(response).await;
    assert_eq!(body["command"], "DISPENSE:4");
    assert_eq!(body["clearAfterMs"], 5000);
    assert_eq!(stored(&store, "pilldispenser/device/PD_1/commands").await, "DISPENSE:4");
}

#[tokio::test]
async fn test_raw_command_rejects_unknown_verb() {
    let (store, app) = setup();

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/devices/PD_1/commands",
            json!({"command": "EJECT:1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.write_count(), 0);
}
