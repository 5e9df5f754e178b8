//! Shared helpers for the server
//!
//! - [`AppError`] / [`ApiResponse`] - unified errors and envelopes (from `shared`)
//! - [`logger`] - tracing subscriber setup

pub mod logger;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
