//! Statistics API Handlers

use axum::extract::{Path, State};

use crate::core::ServerState;
use crate::tracking::aggregation::{DashboardStats, TrackingProgress, TrackingStats};
use crate::utils::{ApiResponse, AppResult};

/// GET /api/v1/tracking/stats
pub async fn tracking_stats(
    State(state): State<ServerState>,
) -> AppResult<ApiResponse<TrackingStats>> {
    Ok(ApiResponse::success(state.trackers.tracking_stats().await?))
}

/// GET /api/v1/tracking/progress/{code}
pub async fn tracking_progress(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> AppResult<ApiResponse<TrackingProgress>> {
    Ok(ApiResponse::success(
        state.trackers.tracking_progress(&code).await?,
    ))
}

/// GET /api/v1/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<ServerState>,
) -> AppResult<ApiResponse<DashboardStats>> {
    Ok(ApiResponse::success(state.trackers.dashboard_stats().await?))
}
