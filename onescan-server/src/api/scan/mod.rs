//! Scan API
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /api/v1/scan/{stage} | POST | record one scan |
//! | /api/v1/scan/recent | GET | paginated scan feed |
//! | /api/v1/scan/recent/{stage} | GET | scan feed for one stage |
//! | /api/v1/scan/statistics/platform | GET | per-courier progress |
//! | /api/v1/scan/history/{code} | GET | scan attempts for one tracker |
//! | /api/v1/scan/errors/recent | GET | latest rejected scans |
//! | /api/v1/scan/stats/daily | GET | scan counts for one day |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/v1/scan", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/recent", get(handler::recent_scans))
        .route("/recent/{stage}", get(handler::recent_scans_for_stage))
        .route("/statistics/platform", get(handler::platform_statistics))
        .route("/history/{code}", get(handler::scan_history))
        .route("/errors/recent", get(handler::recent_errors))
        .route("/stats/daily", get(handler::daily_stats))
        .route("/{stage}", post(handler::record_scan))
}
