//! Tracker domain types
//!
//! A [`Tracker`] moves through [`Stage::Label`], [`Stage::Packing`] and
//! [`Stage::Dispatch`] in order; every scan attempt leaves a [`ScanEvent`].

mod code;
mod model;
mod scan;
mod stage;

pub use code::{InvalidTrackerCode, MAX_TRACKER_CODE_LEN, sanitize_tracker_code};
pub use model::{
    Distribution, DuplicatePolicy, RegistrationReport, Tracker, TrackerMetadata,
    TrackerRegistration,
};
pub use scan::{RejectReason, ScanEvent, ScanOutcome};
pub use stage::{Stage, StageLedger, StageProgress, StageRecord, UnknownStage};
