//! Tracker API Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::tracker::{DuplicatePolicy, RegistrationReport, Stage, Tracker, TrackerRegistration};

use crate::core::ServerState;
use crate::tracking::storage::TrackerFilter;
use crate::utils::{ApiResponse, AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub courier: Option<String>,
    pub completed_stage: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub trackers: Vec<TrackerRegistration>,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    #[serde(default = "default_on_hold")]
    pub on_hold: bool,
}

fn default_on_hold() -> bool {
    true
}

/// GET /api/v1/trackers?courier=&completed_stage=
pub async fn list_trackers(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<Tracker>>> {
    let completed_stage = query
        .completed_stage
        .as_deref()
        .map(str::parse::<Stage>)
        .transpose()?;
    let filter = TrackerFilter {
        courier: query.courier.filter(|c| !c.trim().is_empty()),
        completed_stage,
    };
    let trackers = state.trackers.list_trackers(&filter).await?;
    Ok(ApiResponse::success(trackers))
}

/// POST /api/v1/trackers/upload
pub async fn upload_trackers(
    State(state): State<ServerState>,
    Json(req): Json<UploadRequest>,
) -> AppResult<ApiResponse<RegistrationReport>> {
    let report = state
        .trackers
        .register_trackers(req.trackers, req.on_duplicate)
        .await?;
    let message = format!(
        "{} created, {} updated, {} skipped",
        report.created.len(),
        report.updated.len(),
        report.skipped.len()
    );
    Ok(ApiResponse::success_with_message(message, report))
}

/// GET /api/v1/trackers/{code}
pub async fn get_tracker(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> AppResult<ApiResponse<Tracker>> {
    let tracker = state.trackers.get_tracker(&code).await?;
    Ok(ApiResponse::success(tracker))
}

/// POST /api/v1/trackers/{code}/cancel
pub async fn cancel_tracker(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> AppResult<ApiResponse<Tracker>> {
    let tracker = state.trackers.cancel(&code).await?;
    Ok(ApiResponse::success_with_message("Tracker cancelled", tracker))
}

/// POST /api/v1/trackers/{code}/hold
///
/// An empty body sets the hold.
pub async fn hold_tracker(
    State(state): State<ServerState>,
    Path(code): Path<String>,
    body: Bytes,
) -> AppResult<ApiResponse<Tracker>> {
    let on_hold = if body.iter().all(u8::is_ascii_whitespace) {
        default_on_hold()
    } else {
        serde_json::from_slice::<HoldRequest>(&body)
            .map_err(|e| AppError::invalid_request(format!("invalid hold body: {e}")))?
            .on_hold
    };
    let tracker = state.trackers.set_hold(&code, on_hold).await?;
    Ok(ApiResponse::success(tracker))
}
