//! Schedule endpoint handlers.
//!
//! Every write also updates the device-facing copy. A new schedule goes to
//! the `deviceId` query parameter, falling back to the configured default
//! device, and records it. Later writes follow the recorded device unless
//! `deviceId` names another one, which moves the copy.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use persistence::repositories::ScheduleRepository;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::schedule::enabled_counts;
use domain::models::{
    CreateScheduleRequest, DeviceSchedule, Schedule, ScheduleEntry, UpdateScheduleRequest,
};
use domain::DomainError;
use shared::validation::MAX_WEEKDAY;

/// Query parameters for schedule listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSchedulesQuery {
    pub container_id: Option<u32>,
}

/// Device selection for schedule writes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceQuery {
    pub device_id: Option<String>,
}

/// Enabled schedule count for one container.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerScheduleCount {
    pub container_id: u32,
    pub count: usize,
}

/// Response for schedule listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSchedulesResponse {
    pub schedules: Vec<ScheduleEntry>,
    pub total: usize,
    /// Counts over all of the user's schedules, regardless of the filter.
    pub enabled_counts: Vec<ContainerScheduleCount>,
}

fn device_copy(schedule: &Schedule) -> Result<DeviceSchedule, ApiError> {
    Ok(DeviceSchedule::try_from(schedule)?)
}

/// Device currently holding the copy of `schedule`.
fn recorded_device(state: &AppState, schedule: &Schedule) -> String {
    state.device_or_default(schedule.device_id.clone())
}

/// Device the copy should live on after this request.
fn target_device(state: &AppState, recorded: &str, requested: Option<String>) -> String {
    match requested.filter(|id| !id.trim().is_empty()) {
        Some(id) => state.device_or_default(Some(id)),
        None => recorded.to_string(),
    }
}

/// List the user's schedules.
///
/// GET /api/v1/users/:user_id/schedules?containerId=<id>
pub async fn list_schedules(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListSchedulesQuery>,
) -> Result<Json<ListSchedulesResponse>, ApiError> {
    let repo = ScheduleRepository::new(state.sync.clone());
    let entries = repo.list(&user_id).await?;

    let counts = enabled_counts(entries.iter().map(|e| &e.schedule))
        .into_iter()
        .map(|(container_id, count)| ContainerScheduleCount {
            container_id,
            count,
        })
        .collect();

    let schedules: Vec<ScheduleEntry> = match query.container_id {
        Some(container_id) => entries
            .into_iter()
            .filter(|e| e.schedule.dispenser_id == container_id)
            .collect(),
        None => entries,
    };
    let total = schedules.len();

    Ok(Json(ListSchedulesResponse {
        schedules,
        total,
        enabled_counts: counts,
    }))
}

/// Create a schedule.
///
/// POST /api/v1/users/:user_id/schedules?deviceId=<id>
pub async fn create_schedule(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<DeviceQuery>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleEntry>), ApiError> {
    request.validate()?;

    let mut schedule = Schedule::from(request);
    let copy = device_copy(&schedule)?;
    let device_id = state.device_or_default(query.device_id);
    schedule.device_id = Some(device_id.clone());

    let repo = ScheduleRepository::new(state.sync.clone());
    let id = repo.create(&user_id, &device_id, &schedule, &copy).await?;

    info!(
        user_id = %user_id,
        device_id = %device_id,
        schedule_id = %id,
        container_id = schedule.dispenser_id,
        "Schedule created"
    );

    Ok((StatusCode::CREATED, Json(ScheduleEntry { id, schedule })))
}

/// Update fields of a schedule.
///
/// PUT /api/v1/users/:user_id/schedules/:schedule_id?deviceId=<id>
pub async fn update_schedule(
    State(state): State<AppState>,
    Path((user_id, schedule_id)): Path<(String, String)>,
    Query(query): Query<DeviceQuery>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<ScheduleEntry>, ApiError> {
    request.validate()?;

    let repo = ScheduleRepository::new(state.sync.clone());
    let mut schedule = repo
        .find(&user_id, &schedule_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Schedule not found".to_string()))?;

    schedule.apply(request);
    let copy = device_copy(&schedule)?;
    let recorded = recorded_device(&state, &schedule);
    let device_id = target_device(&state, &recorded, query.device_id);
    schedule.device_id = Some(device_id.clone());
    repo.save(&user_id, &device_id, &schedule_id, &schedule, &copy, Some(&recorded))
        .await?;

    info!(
        user_id = %user_id,
        schedule_id = %schedule_id,
        device_id = %device_id,
        "Schedule updated"
    );

    Ok(Json(ScheduleEntry {
        id: schedule_id,
        schedule,
    }))
}

/// Delete a schedule and its device copy.
///
/// The copy is removed from the device recorded on the schedule. `deviceId`
/// only matters for schedules stored without one.
///
/// DELETE /api/v1/users/:user_id/schedules/:schedule_id?deviceId=<id>
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path((user_id, schedule_id)): Path<(String, String)>,
    Query(query): Query<DeviceQuery>,
) -> Result<StatusCode, ApiError> {
    let fallback = state.device_or_default(query.device_id);
    let repo = ScheduleRepository::new(state.sync.clone());

    if !repo.delete(&user_id, &schedule_id, &fallback).await? {
        return Err(ApiError::NotFound("Schedule not found".to_string()));
    }

    info!(user_id = %user_id, schedule_id = %schedule_id, "Schedule deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Flip one weekday (0 = Monday) in a schedule's day set.
///
/// POST /api/v1/users/:user_id/schedules/:schedule_id/days/:day?deviceId=<id>
pub async fn toggle_schedule_day(
    State(state): State<AppState>,
    Path((user_id, schedule_id, day)): Path<(String, String, u8)>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<ScheduleEntry>, ApiError> {
    if day > MAX_WEEKDAY {
        return Err(DomainError::InvalidDay(day).into());
    }

    let repo = ScheduleRepository::new(state.sync.clone());
    let mut schedule = repo
        .find(&user_id, &schedule_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Schedule not found".to_string()))?;

    schedule.toggle_day(day)?;
    let copy = device_copy(&schedule)?;
    let recorded = recorded_device(&state, &schedule);
    let device_id = target_device(&state, &recorded, query.device_id);
    schedule.device_id = Some(device_id.clone());
    repo.save(&user_id, &device_id, &schedule_id, &schedule, &copy, Some(&recorded))
        .await?;

    Ok(Json(ScheduleEntry {
        id: schedule_id,
        schedule,
    }))
}
