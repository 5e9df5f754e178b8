//! Statistics API

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/v1/tracking/stats", get(handler::tracking_stats))
        .route(
            "/api/v1/tracking/progress/{code}",
            get(handler::tracking_progress),
        )
        .route("/api/v1/dashboard/stats", get(handler::dashboard_stats))
}
