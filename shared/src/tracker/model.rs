//! Tracker aggregate and its metadata payload

use super::stage::{Stage, StageLedger, StageProgress};
use serde::{Deserialize, Serialize};

/// Order and channel metadata carried through unchanged
///
/// Well-known fields are typed; courier-specific keys go into `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerMetadata {
    pub tracking_id: String,
    pub channel_id: String,
    pub order_id: String,
    pub sub_order_id: String,
    pub courier: String,
    pub channel_name: String,
    pub g_code: String,
    pub ean_code: String,
    pub product_sku_code: String,
    pub channel_listing_id: String,
    pub quantity: u32,
    pub amount: f64,
    pub payment_mode: String,
    pub order_status: String,
    pub buyer_city: String,
    pub buyer_state: String,
    pub buyer_pincode: String,
    pub invoice_number: String,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrackerMetadata {
    /// Metadata for a tracker first seen at a scan station
    pub fn for_code(tracker_code: &str) -> Self {
        Self {
            tracking_id: tracker_code.to_string(),
            quantity: 1,
            ..Default::default()
        }
    }

    /// Courier name used for grouping (`"Unknown"` when blank)
    pub fn courier_or_unknown(&self) -> &str {
        match self.courier.trim() {
            "" => "Unknown",
            courier => courier,
        }
    }
}

/// Single SKU (`total == 1`) vs Multi SKU (`total > 1`) scan requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    Single,
    Multi,
}

impl Distribution {
    pub fn label(&self) -> &'static str {
        match self {
            Distribution::Single => "Single SKU",
            Distribution::Multi => "Multi SKU",
        }
    }
}

/// A unit of shipment progressing through the scan stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracker {
    pub tracker_code: String,
    pub metadata: TrackerMetadata,
    pub stages: StageLedger,
    /// Terminal once set
    pub cancelled: bool,
    #[serde(default)]
    pub on_hold: bool,
    pub created_at: i64,
    pub last_updated: i64,
}

impl Tracker {
    /// Create a tracker requiring `total` scans per stage (at least 1)
    pub fn new(
        tracker_code: impl Into<String>,
        metadata: TrackerMetadata,
        total: u32,
        now: i64,
    ) -> Self {
        Self {
            tracker_code: tracker_code.into(),
            metadata,
            stages: StageLedger::new(total.max(1)),
            cancelled: false,
            on_hold: false,
            created_at: now,
            last_updated: now,
        }
    }

    /// Units to scan per stage, fixed at creation
    pub fn total(&self) -> u32 {
        self.stages.label.progress.total
    }

    pub fn distribution(&self) -> Distribution {
        if self.total() > 1 {
            Distribution::Multi
        } else {
            Distribution::Single
        }
    }

    pub fn is_stage_complete(&self, stage: Stage) -> bool {
        self.stages.is_complete(stage)
    }

    pub fn progress(&self, stage: Stage) -> StageProgress {
        self.stages.get(stage).progress
    }

    /// Furthest completed stage
    pub fn current_stage(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .rev()
            .find(|stage| self.is_stage_complete(*stage))
    }

    /// Stage the tracker is waiting on, `None` once dispatched or cancelled
    pub fn next_step(&self) -> Option<Stage> {
        if self.cancelled {
            return None;
        }
        Stage::ALL
            .into_iter()
            .find(|stage| !self.is_stage_complete(*stage))
    }

    /// Dispatched and not cancelled
    pub fn is_completed(&self) -> bool {
        !self.cancelled && self.is_stage_complete(Stage::Dispatch)
    }
}

/// How bulk registration treats a tracker code that already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Leave the existing tracker untouched
    #[default]
    Skip,
    /// Replace metadata, keep stage state and SKU total
    Update,
}

/// One entry of a bulk tracker upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerRegistration {
    pub tracker_code: String,
    /// Units to scan per stage; 1 for Single SKU
    #[serde(default = "default_sku_count")]
    pub sku_count: u32,
    #[serde(default)]
    pub metadata: TrackerMetadata,
}

fn default_sku_count() -> u32 {
    1
}

/// Outcome of a bulk tracker upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
}
