//! HTTP API
//!
//! - [`health`] - liveness and uptime
//! - [`scan`] - stage scans, recent scan feed, platform statistics
//! - [`trackers`] - tracker upload, lookup, cancel and hold
//! - [`statistics`] - tracking stats, per-tracker progress, dashboard
//! - [`sync`] - spreadsheet sync status and manual trigger

pub mod health;
pub mod scan;
pub mod statistics;
pub mod sync;
pub mod trackers;

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::ServerState;

pub use crate::utils::{ApiResponse, AppError, AppResult};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Every route, without middleware
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(scan::router())
        .merge(trackers::router())
        .merge(statistics::router())
        .merge(sync::router())
}

/// Routes plus the tower-http middleware stack
///
/// Used by the HTTP server and by in-process tests.
pub fn build_app(state: &ServerState) -> Router<ServerState> {
    build_router()
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Set must wrap Propagate so the generated id reaches the response
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
}
