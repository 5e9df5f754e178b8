//! Scan API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::tracker::Stage;

use crate::core::ServerState;
use crate::tracking::ScanResult;
use crate::tracking::aggregation::{
    DailyScanStats, PlatformStatistics, RecentScan, RecentScans, ScanHistory,
};
use crate::utils::{ApiResponse, AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub tracker_code: String,
    #[serde(default)]
    pub sku_ref: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StageQuery {
    pub stage: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    /// `YYYY-MM-DD`, UTC
    pub date: Option<String>,
}

fn parse_stage(raw: &str) -> AppResult<Stage> {
    Ok(raw.parse::<Stage>()?)
}

/// POST /api/v1/scan/{stage}
///
/// Rejections and duplicates are data, returned with 200.
pub async fn record_scan(
    State(state): State<ServerState>,
    Path(stage): Path<String>,
    Json(req): Json<ScanRequest>,
) -> AppResult<ApiResponse<ScanResult>> {
    let stage = parse_stage(&stage)?;
    let result = state
        .trackers
        .record_scan(&req.tracker_code, stage, req.sku_ref.as_deref())
        .await?;
    Ok(ApiResponse::success_with_message(result.message(), result))
}

/// GET /api/v1/scan/recent?page=&limit=
pub async fn recent_scans(
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<RecentScans>> {
    let scans = state
        .trackers
        .recent_scans(query.page, query.limit, None)
        .await?;
    Ok(ApiResponse::success(scans))
}

/// GET /api/v1/scan/recent/{stage}?page=&limit=
pub async fn recent_scans_for_stage(
    State(state): State<ServerState>,
    Path(stage): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<RecentScans>> {
    let stage = parse_stage(&stage)?;
    let scans = state
        .trackers
        .recent_scans(query.page, query.limit, Some(stage))
        .await?;
    Ok(ApiResponse::success(scans))
}

/// GET /api/v1/scan/statistics/platform?stage=
///
/// Defaults to the label stage.
pub async fn platform_statistics(
    State(state): State<ServerState>,
    Query(query): Query<StageQuery>,
) -> AppResult<ApiResponse<PlatformStatistics>> {
    let stage = query.stage.as_deref().map(parse_stage).transpose()?;
    let stats = state.trackers.platform_statistics(stage).await?;
    Ok(ApiResponse::success(stats))
}

/// GET /api/v1/scan/history/{code}?page=&limit=
pub async fn scan_history(
    State(state): State<ServerState>,
    Path(code): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<ScanHistory>> {
    let history = state
        .trackers
        .scan_history(&code, query.page, query.limit)
        .await?;
    Ok(ApiResponse::success(history))
}

/// GET /api/v1/scan/errors/recent?limit=
pub async fn recent_errors(
    State(state): State<ServerState>,
    Query(query): Query<LimitQuery>,
) -> AppResult<ApiResponse<Vec<RecentScan>>> {
    let errors = state.trackers.recent_errors(query.limit).await?;
    Ok(ApiResponse::success(errors))
}

/// GET /api/v1/scan/stats/daily?date=
pub async fn daily_stats(
    State(state): State<ServerState>,
    Query(query): Query<DateQuery>,
) -> AppResult<ApiResponse<DailyScanStats>> {
    let date = query
        .date
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| AppError::validation("Invalid date format. Use YYYY-MM-DD"))
        })
        .transpose()?;
    let stats = state.trackers.daily_stats(date).await?;
    Ok(ApiResponse::success(stats))
}
