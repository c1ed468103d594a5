//! Unversioned dispenser handlers used by existing dashboard builds.
//!
//! These operate on the single legacy record at `dispensers/{userId}` and
//! keep their original request and response shapes.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use persistence::repositories::DispenserRepository;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_pills_dispensed;
use domain::models::{DispenseRequest, DispenserRecord, UpdateDispenserRequest};

/// Query parameters for `GET /api/dispenser`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenserQuery {
    pub user_id: Option<String>,
}

/// Envelope returned by the write handlers.
#[derive(Debug, Serialize)]
pub struct DispenserResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: DispenserRecord,
}

/// Envelope returned by the read handler. `data` is `null` when the user has
/// no record yet.
#[derive(Debug, Serialize)]
pub struct DispenserLookupResponse {
    pub data: Option<DispenserRecord>,
}

fn require_user_id(user_id: Option<&str>) -> Result<&str, ApiError> {
    user_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("User ID required".to_string()))
}

/// Dispense pills from the legacy record.
///
/// POST /api/dispense
pub async fn dispense(
    State(state): State<AppState>,
    Json(request): Json<DispenseRequest>,
) -> Result<Json<DispenserResponse>, ApiError> {
    let user_id = require_user_id(request.user_id.as_deref())?;
    request.validate()?;

    let repo = DispenserRepository::new(state.sync.clone());
    let updated = repo
        .dispense_record(user_id, request.pills, Utc::now())
        .await?
        .ok_or_else(|| ApiError::NotFound("Dispenser not found".to_string()))?;
    record_pills_dispensed("legacy", request.pills as u64);

    info!(
        user_id = %user_id,
        pills = request.pills,
        remaining = ?updated.pills_remaining,
        "Pills dispensed"
    );

    Ok(Json(DispenserResponse {
        success: true,
        message: Some(format!("Dispensed {} pill(s)", request.pills)),
        data: updated,
    }))
}

/// Create or update the legacy record.
///
/// POST /api/dispenser
pub async fn upsert_dispenser(
    State(state): State<AppState>,
    Json(request): Json<UpdateDispenserRequest>,
) -> Result<Json<DispenserResponse>, ApiError> {
    let user_id = require_user_id(request.user_id.as_deref())?;
    request.validate()?;

    let repo = DispenserRepository::new(state.sync.clone());
    let (record, created) = repo.upsert_record(user_id, &request, Utc::now()).await?;

    info!(user_id = %user_id, created, "Dispenser record saved");

    Ok(Json(DispenserResponse {
        success: true,
        message: None,
        data: record,
    }))
}

/// Read the legacy record.
///
/// GET /api/dispenser?userId=<id>
pub async fn get_dispenser(
    State(state): State<AppState>,
    Query(query): Query<DispenserQuery>,
) -> Result<Json<DispenserLookupResponse>, ApiError> {
    let user_id = require_user_id(query.user_id.as_deref())?;

    let repo = DispenserRepository::new(state.sync.clone());
    let record = repo.find_record(user_id).await?;

    Ok(Json(DispenserLookupResponse { data: record }))
}
