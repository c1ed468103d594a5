//! Container endpoint handlers.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use persistence::repositories::dispenser::decode_containers;
use persistence::repositories::DispenserRepository;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_pills_dispensed;
use crate::routes::events::snapshot_events;
use domain::models::{ContainerSummary, DeviceCommand, DispatchReceipt};

/// Response for container listing.
#[derive(Debug, Serialize)]
pub struct ListContainersResponse {
    pub containers: Vec<ContainerSummary>,
}

/// Optional body for a manual dispense.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseContainerRequest {
    pub device_id: Option<String>,
}

/// Result of a manual dispense: the command receipt plus the container as
/// updated locally.
#[derive(Debug, Serialize)]
pub struct DispenseContainerResponse {
    pub receipt: DispatchReceipt,
    pub container: ContainerSummary,
}

/// List the user's containers, seeding the default set on first access.
///
/// GET /api/v1/users/:user_id/containers
pub async fn list_containers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ListContainersResponse>, ApiError> {
    let repo = DispenserRepository::new(state.sync.clone());
    let containers = repo.load_containers(&user_id).await?;

    Ok(Json(ListContainersResponse {
        containers: containers.into_iter().map(ContainerSummary::from).collect(),
    }))
}

/// Dispense one pill from a container.
///
/// Sends `DISPENSE:<id>` to the device, then decrements the stored count
/// without waiting for the device to confirm. The decrement only touches
/// the stored set through a compare-and-set, so concurrent dispenses all
/// count.
///
/// POST /api/v1/users/:user_id/containers/:container_id/dispense
pub async fn dispense_container(
    State(state): State<AppState>,
    Path((user_id, container_id)): Path<(String, u32)>,
    body: Option<Json<DispenseContainerRequest>>,
) -> Result<Json<DispenseContainerResponse>, ApiError> {
    let command = DeviceCommand::dispense(container_id)?;
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let device_id = state.device_or_default(request.device_id);

    let not_found = || ApiError::NotFound(format!("Container {} not found", container_id));

    let repo = DispenserRepository::new(state.sync.clone());
    let containers = repo.load_containers(&user_id).await?;
    if !containers.iter().any(|c| c.id == container_id) {
        return Err(not_found());
    }

    let receipt = state.dispatcher.dispatch(&device_id, command).await?;

    let container = repo
        .dispense_container(&user_id, container_id, Utc::now())
        .await?
        .ok_or_else(not_found)?;
    record_pills_dispensed("manual", 1);

    info!(
        user_id = %user_id,
        device_id = %device_id,
        container_id,
        remaining = container.pills_remaining,
        "Manual dispense"
    );

    Ok(Json(DispenseContainerResponse {
        receipt,
        container: container.into(),
    }))
}

/// Live container list as server-sent events.
///
/// GET /api/v1/users/:user_id/containers/events
pub async fn container_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = DispenserRepository::new(state.sync.clone());
    let subscription = repo.watch_containers(&user_id).await?;

    Ok(snapshot_events(subscription, state.shutdown.clone(), "containers", |snapshot| {
        let containers = match snapshot.value {
            Some(value) => decode_containers(&snapshot.path, value)?,
            None => Vec::new(),
        };
        Ok(containers
            .into_iter()
            .map(ContainerSummary::from)
            .collect::<Vec<_>>())
    }))
}
