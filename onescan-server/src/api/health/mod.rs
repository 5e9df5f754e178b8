//! Health check routes
//!
//! # Routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /health | GET | liveness probe |
//! | /api/v1/health | GET | same payload under the versioned prefix |
//!
//! # Response
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "uptime_seconds": 42,
//!   "sync_enabled": true
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    sync_enabled: bool,
}

/// GET /health
pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_secs(),
        sync_enabled: state.sync.is_enabled(),
    })
}
