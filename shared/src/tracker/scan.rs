//! Scan events (append-only audit trail)

use super::stage::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of applying one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Success,
    Duplicate,
    Rejected,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Success => "success",
            ScanOutcome::Duplicate => "duplicate",
            ScanOutcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a scan was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadyCancelled,
    StageOutOfOrder,
    StageAlreadyComplete,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::AlreadyCancelled => "already_cancelled",
            RejectReason::StageOutOfOrder => "stage_out_of_order",
            RejectReason::StageAlreadyComplete => "stage_already_complete",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one scan attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub id: String,
    pub tracker_code: String,
    pub stage: Stage,
    pub timestamp: i64,
    pub outcome: ScanOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_ref: Option<String>,
}

impl ScanEvent {
    pub fn new(
        tracker_code: impl Into<String>,
        stage: Stage,
        outcome: ScanOutcome,
        reason: Option<RejectReason>,
        sku_ref: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracker_code: tracker_code.into(),
            stage,
            timestamp,
            outcome,
            reason,
            sku_ref,
        }
    }
}
