//! Tracker API
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/v1/trackers | GET | list, filter by `courier` / `completed_stage` |
//! | /api/v1/trackers/upload | POST | bulk registration |
//! | /api/v1/trackers/{code} | GET | one tracker |
//! | /api/v1/trackers/{code}/cancel | POST | cancel (idempotent) |
//! | /api/v1/trackers/{code}/hold | POST | set or clear the hold flag |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/v1/trackers", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list_trackers))
        .route("/upload", post(handler::upload_trackers))
        .route("/{code}", get(handler::get_tracker))
        .route("/{code}/cancel", post(handler::cancel_tracker))
        .route("/{code}/hold", post(handler::hold_tracker))
}
