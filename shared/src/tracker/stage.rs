//! Scan stages and per-stage progress

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Processing stage, in the order a tracker must pass through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Label,
    Packing,
    Dispatch,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Label, Stage::Packing, Stage::Dispatch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Label => "label",
            Stage::Packing => "packing",
            Stage::Dispatch => "dispatch",
        }
    }

    /// Stage that must be complete before this one can be scanned
    pub fn prerequisite(&self) -> Option<Stage> {
        match self {
            Stage::Label => None,
            Stage::Packing => Some(Stage::Label),
            Stage::Dispatch => Some(Stage::Packing),
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Label => Some(Stage::Packing),
            Stage::Packing => Some(Stage::Dispatch),
            Stage::Dispatch => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised stage name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

impl From<UnknownStage> for crate::error::AppError {
    fn from(err: UnknownStage) -> Self {
        crate::error::AppError::with_message(crate::error::ErrorCode::InvalidStage, err.to_string())
            .with_detail("allowed", "label, packing, dispatch")
    }
}

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "label" => Ok(Stage::Label),
            "packing" => Ok(Stage::Packing),
            "dispatch" => Ok(Stage::Dispatch),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// `scanned` of `total` units scanned for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub scanned: u32,
    pub total: u32,
}

impl StageProgress {
    pub fn new(total: u32) -> Self {
        Self { scanned: 0, total }
    }

    pub fn is_complete(&self) -> bool {
        self.scanned >= self.total
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.scanned)
    }

    /// Percentage scanned, rounded to one decimal
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let pct = f64::from(self.scanned) * 100.0 / f64::from(self.total);
        (pct * 10.0).round() / 10.0
    }
}

/// State of one stage on one tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub completed: bool,
    /// Successful scans applied to this stage
    pub scan_count: u32,
    pub progress: StageProgress,
    /// Sub-identifiers already scanned in this stage
    #[serde(default)]
    pub scanned_refs: BTreeSet<String>,
}

impl StageRecord {
    pub fn new(total: u32) -> Self {
        Self {
            completed: false,
            scan_count: 0,
            progress: StageProgress::new(total),
            scanned_refs: BTreeSet::new(),
        }
    }
}

/// Fixed-size stage state: one record per stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLedger {
    pub label: StageRecord,
    pub packing: StageRecord,
    pub dispatch: StageRecord,
}

impl StageLedger {
    pub fn new(total: u32) -> Self {
        Self {
            label: StageRecord::new(total),
            packing: StageRecord::new(total),
            dispatch: StageRecord::new(total),
        }
    }

    pub fn get(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::Label => &self.label,
            Stage::Packing => &self.packing,
            Stage::Dispatch => &self.dispatch,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut StageRecord {
        match stage {
            Stage::Label => &mut self.label,
            Stage::Packing => &mut self.packing,
            Stage::Dispatch => &mut self.dispatch,
        }
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.get(stage).completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::Label.prerequisite(), None);
        assert_eq!(Stage::Packing.prerequisite(), Some(Stage::Label));
        assert_eq!(Stage::Dispatch.prerequisite(), Some(Stage::Packing));
        assert_eq!(Stage::Label.next(), Some(Stage::Packing));
        assert_eq!(Stage::Dispatch.next(), None);
        assert!(Stage::Label < Stage::Packing && Stage::Packing < Stage::Dispatch);
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("label".parse::<Stage>(), Ok(Stage::Label));
        assert_eq!(" Packing ".parse::<Stage>(), Ok(Stage::Packing));
        assert_eq!("DISPATCH".parse::<Stage>(), Ok(Stage::Dispatch));
        assert_eq!(
            "shipping".parse::<Stage>(),
            Err(UnknownStage("shipping".to_string()))
        );
    }

    #[test]
    fn test_stage_serde() {
        assert_eq!(serde_json::to_string(&Stage::Packing).unwrap(), "\"packing\"");
        let stage: Stage = serde_json::from_str("\"dispatch\"").unwrap();
        assert_eq!(stage, Stage::Dispatch);
    }

    #[test]
    fn test_progress_percentage() {
        let p = StageProgress { scanned: 1, total: 3 };
        assert_eq!(p.percentage(), 33.3);
        assert_eq!(p.remaining(), 2);
        assert!(!p.is_complete());

        let done = StageProgress { scanned: 3, total: 3 };
        assert_eq!(done.percentage(), 100.0);
        assert!(done.is_complete());

        assert_eq!(StageProgress::new(0).percentage(), 0.0);
    }
}
