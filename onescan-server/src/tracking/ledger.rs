//! Stage ledger - pure tracker state transitions
//!
//! Every mutation of a tracker's stage state goes through a
//! [`TrackerTransition`]. Transitions are synchronous and never touch the
//! store; a rejected or duplicate transition leaves the tracker untouched.
//!
//! # Ordering rules
//!
//! - `packing` needs `label` complete, `dispatch` needs `packing` complete
//! - a stage is complete once `scanned == total`
//! - `cancelled` is terminal and freezes all stage transitions

use enum_dispatch::enum_dispatch;
use shared::tracker::{RejectReason, ScanOutcome, Stage, Tracker};

/// Result of applying a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed
    Applied,
    /// Sub-identifier already scanned for this stage, nothing changed
    Duplicate,
    /// Already in the requested state (idempotent no-op)
    Unchanged,
    /// Precondition failed, nothing changed
    Rejected(RejectReason),
}

impl Transition {
    pub fn outcome(&self) -> ScanOutcome {
        match self {
            Transition::Applied | Transition::Unchanged => ScanOutcome::Success,
            Transition::Duplicate => ScanOutcome::Duplicate,
            Transition::Rejected(_) => ScanOutcome::Rejected,
        }
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Transition::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Whether the tracker must be written back
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// A pure state transition on one tracker
#[enum_dispatch]
pub trait TrackerTransition {
    fn apply(&self, tracker: &mut Tracker, now: i64) -> Transition;
}

/// Scan one unit of `stage`, optionally identified by a SKU sub-identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageScan {
    pub stage: Stage,
    pub sku_ref: Option<String>,
}

impl TrackerTransition for StageScan {
    fn apply(&self, tracker: &mut Tracker, now: i64) -> Transition {
        if tracker.cancelled {
            return Transition::Rejected(RejectReason::AlreadyCancelled);
        }
        if let Some(prerequisite) = self.stage.prerequisite()
            && !tracker.is_stage_complete(prerequisite)
        {
            return Transition::Rejected(RejectReason::StageOutOfOrder);
        }

        let record = tracker.stages.get_mut(self.stage);
        if let Some(sku_ref) = &self.sku_ref
            && record.scanned_refs.contains(sku_ref)
        {
            return Transition::Duplicate;
        }
        if record.completed {
            return Transition::Rejected(RejectReason::StageAlreadyComplete);
        }

        record.scan_count += 1;
        record.progress.scanned = (record.progress.scanned + 1).min(record.progress.total);
        if let Some(sku_ref) = &self.sku_ref {
            record.scanned_refs.insert(sku_ref.clone());
        }
        if record.progress.is_complete() {
            record.completed = true;
        }
        tracker.last_updated = now;
        Transition::Applied
    }
}

/// Terminal cancellation, idempotent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancel;

impl TrackerTransition for Cancel {
    fn apply(&self, tracker: &mut Tracker, now: i64) -> Transition {
        if tracker.cancelled {
            return Transition::Unchanged;
        }
        tracker.cancelled = true;
        tracker.last_updated = now;
        Transition::Applied
    }
}

/// Put a tracker on hold or release it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHold {
    pub on_hold: bool,
}

impl TrackerTransition for SetHold {
    fn apply(&self, tracker: &mut Tracker, now: i64) -> Transition {
        if tracker.cancelled {
            return Transition::Rejected(RejectReason::AlreadyCancelled);
        }
        if tracker.on_hold == self.on_hold {
            return Transition::Unchanged;
        }
        tracker.on_hold = self.on_hold;
        tracker.last_updated = now;
        Transition::Applied
    }
}

/// TrackerAction enum - dispatches to concrete transitions
#[enum_dispatch(TrackerTransition)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAction {
    StageScan(StageScan),
    Cancel(Cancel),
    SetHold(SetHold),
}

/// Apply a stage scan, returning the updated tracker and its outcome
pub fn apply_stage_event(
    mut tracker: Tracker,
    stage: Stage,
    sku_ref: Option<String>,
    now: i64,
) -> (Tracker, Transition) {
    let transition = StageScan { stage, sku_ref }.apply(&mut tracker, now);
    (tracker, transition)
}

/// Cancel a tracker; cancelling twice is a no-op success
pub fn cancel(mut tracker: Tracker, now: i64) -> (Tracker, Transition) {
    let transition = Cancel.apply(&mut tracker, now);
    (tracker, transition)
}
