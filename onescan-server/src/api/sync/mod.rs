//! Sync API
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/v1/sync/status | GET | checkpoint and schedule |
//! | /api/v1/sync/trigger | POST | run a cycle now (`?wait=true` blocks until done) |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/v1/sync", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/status", get(handler::get_sync_status))
        .route("/trigger", post(handler::trigger_sync))
}
