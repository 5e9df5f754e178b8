//! Sync API Handlers

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::core::ServerState;
use crate::sync::SyncStatus;
use crate::utils::{ApiResponse, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct TriggerQuery {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    /// Joined a cycle that was already running or queued
    pub coalesced: bool,
    pub status: SyncStatus,
}

/// GET /api/v1/sync/status
pub async fn get_sync_status(State(state): State<ServerState>) -> ApiResponse<SyncStatus> {
    ApiResponse::success(state.sync.status())
}

/// POST /api/v1/sync/trigger?wait=
pub async fn trigger_sync(
    State(state): State<ServerState>,
    Query(query): Query<TriggerQuery>,
) -> AppResult<ApiResponse<TriggerResponse>> {
    let manual = state.sync.trigger_manual_sync()?;
    let coalesced = manual.coalesced;
    if query.wait {
        manual.wait().await;
    }

    let message = if coalesced {
        "Sync already scheduled"
    } else {
        "Sync triggered"
    };
    Ok(ApiResponse::success_with_message(
        message,
        TriggerResponse {
            coalesced,
            status: state.sync.status(),
        },
    ))
}
