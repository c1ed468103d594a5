//! Device status and command endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use persistence::repositories::{DispenserRepository, TelemetryRepository};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::routes::events::snapshot_events;
use domain::models::device::UpdateDeviceStatusRequest;
use domain::models::{
    DeviceCommand, DeviceOverview, DeviceStatus, DeviceStatusSummary, DispatchCommandRequest,
    DispatchReceipt,
};

/// Get the dashboard's view of the user's device, seeding it on first access.
///
/// GET /api/v1/users/:user_id/device
pub async fn get_device_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DeviceStatusSummary>, ApiError> {
    let repo = DispenserRepository::new(state.sync.clone());
    let status = repo.load_device_status(&user_id).await?;
    Ok(Json(status.into()))
}

/// Overwrite the user's device status.
///
/// PUT /api/v1/users/:user_id/device
pub async fn update_device_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateDeviceStatusRequest>,
) -> Result<Json<DeviceStatusSummary>, ApiError> {
    request.validate()?;

    let status = DeviceStatus::from(request);
    let repo = DispenserRepository::new(state.sync.clone());
    repo.save_device_status(&user_id, &status).await?;

    info!(
        user_id = %user_id,
        battery = status.battery,
        status = %status.status,
        "Device status updated"
    );

    Ok(Json(status.into()))
}

/// Live device status as server-sent events.
///
/// GET /api/v1/users/:user_id/device/events
pub async fn device_status_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = DispenserRepository::new(state.sync.clone());
    let subscription = repo.watch_device_status(&user_id).await?;

    Ok(snapshot_events(subscription, state.shutdown.clone(), "device", |snapshot| {
        let status: DeviceStatus = snapshot.decode()?.unwrap_or_default();
        Ok(DeviceStatusSummary::from(status))
    }))
}

/// Status derived from the device's own telemetry.
///
/// GET /api/v1/devices/:device_id/status
pub async fn get_device_overview(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceOverview>, ApiError> {
    let repo = TelemetryRepository::new(state.sync.clone());
    let overview = repo.overview(&device_id).await?;
    Ok(Json(overview))
}

/// Write a raw command into the device inbox.
///
/// POST /api/v1/devices/:device_id/commands
pub async fn dispatch_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<DispatchCommandRequest>,
) -> Result<(StatusCode, Json<DispatchReceipt>), ApiError> {
    let command: DeviceCommand = request.command.parse()?;
    let receipt = state.dispatcher.dispatch(&device_id, command).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Live telemetry-derived status as server-sent events.
///
/// GET /api/v1/devices/:device_id/events
pub async fn device_overview_events(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = TelemetryRepository::new(state.sync.clone());
    let subscription = repo.watch(&device_id).await?;

    Ok(snapshot_events(subscription, state.shutdown.clone(), "telemetry", move |snapshot| {
        Ok(DeviceOverview::from_telemetry(&device_id, snapshot.value.as_ref()))
    }))
}
