//! Sync checkpoint
//!
//! In-memory record of the last sync cycle, published through a
//! `tokio::sync::watch` channel so status readers and manual-trigger callers
//! observe every transition. Lost on restart.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Scheduler state: `Idle → Running → {Succeeded, Failed} → Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LastSyncStatus {
    #[default]
    Never,
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCheckpoint {
    pub state: SyncState,
    /// Finish time of the last cycle (epoch millis)
    pub last_sync_time: Option<i64>,
    pub last_sync_status: LastSyncStatus,
    /// Error of the last failed cycle, cleared on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Data rows written by the last successful cycle
    pub rows_synced: usize,
    /// Attempts used by the current or last cycle
    pub attempts: u32,
    pub cycles_completed: u64,
}

/// Shared handle to the checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointCell {
    tx: Arc<watch::Sender<SyncCheckpoint>>,
}

impl Default for CheckpointCell {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncCheckpoint::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SyncCheckpoint {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncCheckpoint> {
        self.tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.tx.borrow().state == SyncState::Running
    }

    pub(crate) fn begin_cycle(&self) {
        self.tx.send_modify(|cp| {
            cp.state = SyncState::Running;
            cp.attempts = 0;
        });
    }

    pub(crate) fn record_attempt(&self, attempt: u32) {
        self.tx.send_modify(|cp| cp.attempts = attempt);
    }

    pub(crate) fn succeed(&self, rows_synced: usize, now: i64) {
        self.tx.send_modify(|cp| {
            cp.state = SyncState::Succeeded;
            cp.last_sync_time = Some(now);
            cp.last_sync_status = LastSyncStatus::Success;
            cp.last_error = None;
            cp.rows_synced = rows_synced;
            cp.cycles_completed += 1;
        });
    }

    pub(crate) fn fail(&self, error: impl Into<String>, now: i64) {
        let error = error.into();
        self.tx.send_modify(|cp| {
            cp.state = SyncState::Failed;
            cp.last_sync_time = Some(now);
            cp.last_sync_status = LastSyncStatus::Failure;
            cp.last_error = Some(error);
            cp.cycles_completed += 1;
        });
    }

    pub(crate) fn settle(&self) {
        self.tx.send_if_modified(|cp| {
            if matches!(cp.state, SyncState::Succeeded | SyncState::Failed) {
                cp.state = SyncState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Cycle aborted by shutdown
    pub(crate) fn abort(&self) {
        self.tx.send_if_modified(|cp| {
            if cp.state == SyncState::Running {
                cp.state = SyncState::Idle;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_transitions() {
        let cell = CheckpointCell::new();
        assert_eq!(cell.snapshot().last_sync_status, LastSyncStatus::Never);

        cell.begin_cycle();
        assert!(cell.is_running());
        cell.record_attempt(2);
        cell.fail("quota", 10);
        let cp = cell.snapshot();
        assert_eq!(cp.state, SyncState::Failed);
        assert_eq!(cp.attempts, 2);
        assert_eq!(cp.last_error.as_deref(), Some("quota"));

        cell.settle();
        cell.begin_cycle();
        cell.record_attempt(1);
        cell.succeed(3, 20);
        cell.settle();
        let cp = cell.snapshot();
        assert_eq!(cp.state, SyncState::Idle);
        assert_eq!(cp.last_sync_status, LastSyncStatus::Success);
        assert_eq!(cp.last_error, None);
        assert_eq!(cp.rows_synced, 3);
        assert_eq!(cp.last_sync_time, Some(20));
        assert_eq!(cp.cycles_completed, 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_completion() {
        let cell = CheckpointCell::new();
        let mut rx = cell.subscribe();
        cell.begin_cycle();

        let waiter = tokio::spawn(async move {
            rx.wait_for(|cp| cp.cycles_completed >= 1).await.map(|cp| cp.clone())
        });
        cell.succeed(1, 5);
        cell.settle();

        let cp = waiter.await.unwrap().unwrap();
        assert_eq!(cp.last_sync_status, LastSyncStatus::Success);
    }

    #[test]
    fn test_abort_returns_to_idle() {
        let cell = CheckpointCell::new();
        cell.begin_cycle();
        cell.abort();
        assert_eq!(cell.snapshot().state, SyncState::Idle);
        assert_eq!(cell.snapshot().cycles_completed, 0);
    }
}
