//! Activity log endpoint handlers.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use persistence::repositories::ActivityRepository;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::ActivityKind;
use domain::services::activity::filter_logs;
use domain::services::{export_logs_csv, ActivityFeed};

/// Query parameters for the activity listing.
#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub kind: ActivityKind,
}

/// Query parameters for the CSV export.
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub search: String,
}

/// Logs and reports of every device, newest first.
///
/// GET /api/v1/logs?search=<term>&kind=all|logs|reports
pub async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivityFeed>, ApiError> {
    let repo = ActivityRepository::new(state.sync.clone());
    // Both are read whatever `kind` is: the summary covers everything.
    let logs = repo.logs().await?;
    let reports = repo.reports().await?;

    Ok(Json(ActivityFeed::build(
        &logs,
        &reports,
        &query.search,
        query.kind,
        Utc::now().date_naive(),
    )))
}

/// Download the (filtered) logs as CSV.
///
/// GET /api/v1/logs/export?search=<term>
pub async fn export_logs(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = ActivityRepository::new(state.sync.clone());
    let logs = repo.logs().await?;
    let selected: Vec<_> = filter_logs(&logs, &query.search)
        .into_iter()
        .cloned()
        .collect();

    let body = export_logs_csv(&selected)
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e)))?;
    let disposition = format!(
        "attachment; filename=\"pill_logs_{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );

    tracing::info!(rows = selected.len(), "Logs exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
