//! Shared types for OneScan
//!
//! Tracker domain types, the unified error system and response envelopes
//! used by the server and its clients.

pub mod error;
pub mod tracker;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use tracker::{
    RejectReason, ScanEvent, ScanOutcome, Stage, StageProgress, Tracker, TrackerMetadata,
};
