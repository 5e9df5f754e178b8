//! Scan recorder - the single writer path for tracker state
//!
//! Each call takes a per-tracker async lock, so concurrent scans for the
//! same tracker code are applied one after another against fresh state.
//! Scans for different codes never contend.

use dashmap::DashMap;
use serde::Serialize;
use shared::AppError;
use shared::tracker::{
    Distribution, DuplicatePolicy, InvalidTrackerCode, RegistrationReport, RejectReason,
    ScanEvent, ScanOutcome, Stage, StageProgress, Tracker, TrackerMetadata, TrackerRegistration,
    sanitize_tracker_code,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::ledger::{self, Cancel, SetHold, TrackerAction, TrackerTransition, Transition};
use super::storage::{DocumentStore, StorageError};

/// Recorder errors
///
/// Ledger rejections are not errors; they come back inside [`ScanResult`].
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Invalid tracker code: {0}")]
    InvalidTrackerCode(#[from] InvalidTrackerCode),

    #[error("Tracker not found: {0}")]
    NotFound(String),

    #[error("Tracker {0} is cancelled")]
    Cancelled(String),

    /// Read/write failure against the store; retry the whole operation
    #[error("Store error: {0}")]
    Store(#[from] StorageError),
}

impl RecordError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RecordError::Store(_))
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::InvalidTrackerCode(e) => {
                AppError::new(shared::ErrorCode::InvalidTrackerCode).with_detail("reason", e.to_string())
            }
            RecordError::NotFound(code) => AppError::tracker_not_found(code),
            RecordError::Cancelled(code) => AppError::new(shared::ErrorCode::TrackerCancelled)
                .with_detail("tracker_code", code),
            RecordError::Store(e) => {
                tracing::warn!(error = %e, "Store failure surfaced to caller");
                AppError::storage_unavailable(e.to_string())
            }
        }
    }
}

pub type RecordResult<T> = Result<T, RecordError>;

/// Outcome of one recorded scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub tracker_code: String,
    pub stage: Stage,
    pub outcome: ScanOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Post-scan progress of the scanned stage
    pub progress: StageProgress,
    pub distribution: Distribution,
    pub next_step: Option<Stage>,
    pub event: ScanEvent,
}

impl ScanResult {
    pub fn message(&self) -> String {
        match (self.outcome, self.reason) {
            (ScanOutcome::Success, _) => format!(
                "{} of {} scanned for {}",
                self.progress.scanned, self.progress.total, self.stage
            ),
            (ScanOutcome::Duplicate, _) => format!("Duplicate {} scan ignored", self.stage),
            (ScanOutcome::Rejected, Some(reason)) => {
                format!("{} scan rejected: {}", self.stage, reason)
            }
            (ScanOutcome::Rejected, None) => format!("{} scan rejected", self.stage),
        }
    }
}

/// Validates scans, applies them through the ledger and persists the result
pub struct ScanRecorder {
    store: Arc<dyn DocumentStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ScanRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, code: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once nobody else holds or awaits it
    fn release(&self, code: &str) {
        self.locks
            .remove_if(code, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Record one scan: the tracker write and its event append commit together
    pub async fn record_scan(
        &self,
        tracker_code: &str,
        stage: Stage,
        sku_ref: Option<&str>,
    ) -> RecordResult<ScanResult> {
        let code = sanitize_tracker_code(tracker_code)?;
        let sku_ref = sku_ref
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let lock = self.lock_for(&code);
        let result = {
            let _guard = lock.lock().await;
            self.record_scan_locked(&code, stage, sku_ref).await
        };
        drop(lock);
        self.release(&code);
        result
    }

    async fn record_scan_locked(
        &self,
        code: &str,
        stage: Stage,
        sku_ref: Option<String>,
    ) -> RecordResult<ScanResult> {
        let now = shared::util::now_millis();
        let tracker = match self.store.get_tracker(code).await? {
            Some(tracker) => tracker,
            None => {
                tracing::debug!(tracker_code = %code, "Creating tracker on first scan");
                Tracker::new(code, TrackerMetadata::for_code(code), 1, now)
            }
        };

        let (tracker, transition) = ledger::apply_stage_event(tracker, stage, sku_ref.clone(), now);

        let event = ScanEvent::new(
            code,
            stage,
            transition.outcome(),
            transition.reason(),
            sku_ref,
            now,
        );
        self.store.commit_scan(&tracker, &event).await?;

        let progress = tracker.progress(stage);
        match transition {
            Transition::Rejected(reason) => tracing::info!(
                tracker_code = %code,
                stage = %stage,
                reason = %reason,
                "Scan rejected"
            ),
            _ => tracing::debug!(
                tracker_code = %code,
                stage = %stage,
                outcome = %transition.outcome(),
                scanned = progress.scanned,
                total = progress.total,
                "Scan recorded"
            ),
        }

        Ok(ScanResult {
            tracker_code: code.to_string(),
            stage,
            outcome: transition.outcome(),
            reason: transition.reason(),
            progress,
            distribution: tracker.distribution(),
            next_step: tracker.next_step(),
            event,
        })
    }

    /// Apply a non-scan transition to an existing tracker
    ///
    /// The tracker is written only when the transition changed it.
    async fn mutate(&self, tracker_code: &str, action: TrackerAction) -> RecordResult<(Tracker, Transition)> {
        let code = sanitize_tracker_code(tracker_code)?;
        let lock = self.lock_for(&code);
        let result = {
            let _guard = lock.lock().await;
            match self.store.get_tracker(&code).await? {
                None => Err(RecordError::NotFound(code.clone())),
                Some(mut tracker) => {
                    let transition = action.apply(&mut tracker, shared::util::now_millis());
                    if transition.is_applied() {
                        self.store.put_tracker(&tracker).await?;
                    }
                    Ok((tracker, transition))
                }
            }
        };
        drop(lock);
        self.release(&code);
        result
    }

    /// Cancel a tracker; cancelling an already-cancelled tracker succeeds
    pub async fn cancel(&self, tracker_code: &str) -> RecordResult<Tracker> {
        let (tracker, transition) = self.mutate(tracker_code, Cancel.into()).await?;
        if transition.is_applied() {
            tracing::info!(tracker_code = %tracker.tracker_code, "Tracker cancelled");
        }
        Ok(tracker)
    }

    pub async fn set_hold(&self, tracker_code: &str, on_hold: bool) -> RecordResult<Tracker> {
        let (tracker, transition) = self.mutate(tracker_code, SetHold { on_hold }.into()).await?;
        match transition {
            Transition::Rejected(_) => Err(RecordError::Cancelled(tracker.tracker_code)),
            _ => Ok(tracker),
        }
    }

    /// Bulk upload of tracker metadata
    ///
    /// Invalid codes are reported as skipped. A code repeated within the
    /// batch is treated as existing on its second occurrence.
    pub async fn register_trackers(
        &self,
        entries: Vec<TrackerRegistration>,
        policy: DuplicatePolicy,
    ) -> RecordResult<RegistrationReport> {
        let mut report = RegistrationReport::default();

        for entry in entries {
            let code = match sanitize_tracker_code(&entry.tracker_code) {
                Ok(code) => code,
                Err(e) => {
                    tracing::warn!(tracker_code = %entry.tracker_code, error = %e, "Skipping invalid tracker code");
                    report.skipped.push(entry.tracker_code);
                    continue;
                }
            };

            let lock = self.lock_for(&code);
            let outcome = {
                let _guard = lock.lock().await;
                self.register_one_locked(&code, entry, policy).await
            };
            drop(lock);
            self.release(&code);

            match outcome? {
                Registered::Created => report.created.push(code),
                Registered::Updated => report.updated.push(code),
                Registered::Skipped => report.skipped.push(code),
            }
        }

        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            policy = ?policy,
            "Tracker registration processed"
        );
        Ok(report)
    }

    async fn register_one_locked(
        &self,
        code: &str,
        entry: TrackerRegistration,
        policy: DuplicatePolicy,
    ) -> RecordResult<Registered> {
        let now = shared::util::now_millis();
        let mut metadata = entry.metadata;
        if metadata.tracking_id.trim().is_empty() {
            metadata.tracking_id = entry.tracker_code.trim().to_string();
        }

        match (self.store.get_tracker(code).await?, policy) {
            (None, _) => {
                let tracker = Tracker::new(code, metadata, entry.sku_count, now);
                self.store.put_tracker(&tracker).await?;
                Ok(Registered::Created)
            }
            (Some(_), DuplicatePolicy::Skip) => Ok(Registered::Skipped),
            (Some(mut tracker), DuplicatePolicy::Update) => {
                // SKU total is fixed at creation; only metadata changes
                tracker.metadata = metadata;
                tracker.last_updated = now;
                self.store.put_tracker(&tracker).await?;
                Ok(Registered::Updated)
            }
        }
    }
}

enum Registered {
    Created,
    Updated,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::storage::{
        RedbStore, ScanEventFilter, ScanEventPage, StorageResult, TrackerFilter,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_recorder() -> (ScanRecorder, Arc<RedbStore>) {
        let store = Arc::new(RedbStore::open_in_memory().unwrap());
        (ScanRecorder::new(store.clone()), store)
    }

    fn registration(code: &str, sku_count: u32, courier: &str) -> TrackerRegistration {
        let mut metadata = TrackerMetadata::default();
        metadata.courier = courier.to_string();
        TrackerRegistration {
            tracker_code: code.to_string(),
            sku_count,
            metadata,
        }
    }

    /// Counts writes and can be switched to fail every call
    struct CountingStore {
        inner: RedbStore,
        puts: AtomicUsize,
        commits: AtomicUsize,
        fail: bool,
        /// Scan commits left to reject before the store recovers
        failing_commits: AtomicUsize,
    }

    impl CountingStore {
        fn new(fail: bool) -> Self {
            Self {
                inner: RedbStore::open_in_memory().unwrap(),
                puts: AtomicUsize::new(0),
                commits: AtomicUsize::new(0),
                fail,
                failing_commits: AtomicUsize::new(0),
            }
        }

        fn failing_first_commits(count: usize) -> Self {
            let store = Self::new(false);
            store.failing_commits.store(count, Ordering::SeqCst);
            store
        }

        fn check(&self) -> StorageResult<()> {
            if self.fail {
                Err(StorageError::Unavailable("simulated outage".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn get_tracker(&self, code: &str) -> StorageResult<Option<Tracker>> {
            self.check()?;
            self.inner.get_tracker(code).await
        }

        async fn put_tracker(&self, tracker: &Tracker) -> StorageResult<()> {
            self.check()?;
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put_tracker(tracker).await
        }

        async fn append_scan_event(&self, event: &ScanEvent) -> StorageResult<()> {
            self.check()?;
            self.inner.append_scan_event(event).await
        }

        async fn commit_scan(&self, tracker: &Tracker, event: &ScanEvent) -> StorageResult<()> {
            self.check()?;
            let remaining = self.failing_commits.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_commits.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::Unavailable("commit aborted".to_string()));
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.commit_scan(tracker, event).await
        }

        async fn list_trackers(&self, filter: Option<&TrackerFilter>) -> StorageResult<Vec<Tracker>> {
            self.check()?;
            self.inner.list_trackers(filter).await
        }

        async fn list_scan_events(
            &self,
            filter: Option<&ScanEventFilter>,
            page: u32,
            limit: u32,
        ) -> StorageResult<ScanEventPage> {
            self.check()?;
            self.inner.list_scan_events(filter, page, limit).await
        }

        async fn count_scan_events(&self, filter: Option<&ScanEventFilter>) -> StorageResult<u64> {
            self.check()?;
            self.inner.count_scan_events(filter).await
        }
    }

    #[tokio::test]
    async fn test_first_scan_creates_tracker() {
        let (recorder, store) = create_test_recorder();

        let result = recorder.record_scan("trk-001", Stage::Label, None).await.unwrap();
        assert_eq!(result.tracker_code, "TRK-001");
        assert_eq!(result.outcome, ScanOutcome::Success);
        assert_eq!(result.progress, StageProgress { scanned: 1, total: 1 });
        assert_eq!(result.distribution, Distribution::Single);
        assert_eq!(result.next_step, Some(Stage::Packing));
        assert_eq!(result.message(), "1 of 1 scanned for label");

        let tracker = store.get_tracker_sync("TRK-001").unwrap().unwrap();
        assert!(tracker.is_stage_complete(Stage::Label));
        assert_eq!(store.count_scan_events_sync(None).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_typed_and_audited() {
        let (recorder, store) = create_test_recorder();

        let result = recorder.record_scan("TRK-2", Stage::Dispatch, None).await.unwrap();
        assert_eq!(result.outcome, ScanOutcome::Rejected);
        assert_eq!(result.reason, Some(RejectReason::StageOutOfOrder));
        assert_eq!(result.message(), "dispatch scan rejected: stage_out_of_order");

        let page = store.list_scan_events_sync(None, 1, 10).unwrap();
        assert_eq!(page.events[0].outcome, ScanOutcome::Rejected);
        assert_eq!(page.events[0].reason, Some(RejectReason::StageOutOfOrder));
    }

    #[tokio::test]
    async fn test_exactly_one_commit_per_scan() {
        let store = Arc::new(CountingStore::new(false));
        let recorder = ScanRecorder::new(store.clone());

        recorder.record_scan("A", Stage::Label, None).await.unwrap();
        recorder.record_scan("A", Stage::Label, None).await.unwrap();
        recorder.record_scan("A", Stage::Label, Some("x")).await.unwrap();

        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_tracker_untouched_and_retry_succeeds() {
        let store = Arc::new(CountingStore::failing_first_commits(1));
        let recorder = ScanRecorder::new(store.clone());

        let err = recorder.record_scan("A", Stage::Label, None).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.inner.get_tracker_sync("A").unwrap().is_none());
        assert_eq!(store.inner.count_scan_events_sync(None).unwrap(), 0);

        let retry = recorder.record_scan("A", Stage::Label, None).await.unwrap();
        assert_eq!(retry.outcome, ScanOutcome::Success);

        let tracker = store.inner.get_tracker_sync("A").unwrap().unwrap();
        assert_eq!(tracker.stages.label.scan_count, 1);
        let successes = ScanEventFilter {
            outcome: Some(ScanOutcome::Success),
            ..Default::default()
        };
        assert_eq!(store.inner.count_scan_events_sync(Some(&successes)).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_code_writes_nothing() {
        let store = Arc::new(CountingStore::new(false));
        let recorder = ScanRecorder::new(store.clone());

        let err = recorder.record_scan("  //  ", Stage::Label, None).await.unwrap_err();
        assert!(matches!(err, RecordError::InvalidTrackerCode(_)));
        assert!(!err.is_transient());
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_transient() {
        let recorder = ScanRecorder::new(Arc::new(CountingStore::new(true)));

        let err = recorder.record_scan("A", Stage::Label, None).await.unwrap_err();
        assert!(err.is_transient());

        let app_err: AppError = err.into();
        assert_eq!(app_err.code, shared::ErrorCode::StorageUnavailable);
    }

    #[tokio::test]
    async fn test_blank_sku_ref_is_ignored() {
        let (recorder, store) = create_test_recorder();
        recorder.record_scan("A", Stage::Label, Some("   ")).await.unwrap();

        let tracker = store.get_tracker_sync("A").unwrap().unwrap();
        assert!(tracker.stages.label.scanned_refs.is_empty());
        let page = store.list_scan_events_sync(None, 1, 1).unwrap();
        assert_eq!(page.events[0].sku_ref, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_scans_same_tracker_single_increment() {
        let (recorder, store) = create_test_recorder();
        let recorder = Arc::new(recorder);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let recorder = recorder.clone();
                tokio::spawn(async move { recorder.record_scan("HOT-1", Stage::Label, None).await })
            })
            .collect();

        let mut successes = 0;
        let mut rejected = 0;
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            match (result.outcome, result.reason) {
                (ScanOutcome::Success, _) => successes += 1,
                (ScanOutcome::Rejected, Some(RejectReason::StageAlreadyComplete))
                | (ScanOutcome::Duplicate, _) => rejected += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(rejected, 9);

        let tracker = store.get_tracker_sync("HOT-1").unwrap().unwrap();
        assert_eq!(tracker.stages.label.scan_count, 1);
        assert_eq!(tracker.stages.label.progress.scanned, 1);
        assert_eq!(store.count_scan_events_sync(None).unwrap(), 10);
        assert!(recorder.locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_idempotent_and_unknown() {
        let (recorder, _store) = create_test_recorder();
        recorder.record_scan("A", Stage::Label, None).await.unwrap();

        let first = recorder.cancel("a").await.unwrap();
        assert!(first.cancelled);
        let second = recorder.cancel("A").await.unwrap();
        assert_eq!(first, second);

        let result = recorder.record_scan("A", Stage::Packing, None).await.unwrap();
        assert_eq!(result.reason, Some(RejectReason::AlreadyCancelled));
        assert_eq!(result.next_step, None);

        assert!(matches!(
            recorder.cancel("missing").await,
            Err(RecordError::NotFound(code)) if code == "MISSING"
        ));
    }

    #[tokio::test]
    async fn test_hold_on_cancelled_tracker_fails() {
        let (recorder, _store) = create_test_recorder();
        recorder.record_scan("A", Stage::Label, None).await.unwrap();

        assert!(recorder.set_hold("A", true).await.unwrap().on_hold);
        recorder.cancel("A").await.unwrap();
        assert!(matches!(
            recorder.set_hold("A", false).await,
            Err(RecordError::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_register_trackers_policies() {
        let (recorder, store) = create_test_recorder();

        let report = recorder
            .register_trackers(
                vec![
                    registration("awb-1", 3, "Delhivery"),
                    registration("AWB-2", 1, "Ekart"),
                    registration("", 1, "Ekart"),
                ],
                DuplicatePolicy::Skip,
            )
            .await
            .unwrap();
        assert_eq!(report.created, vec!["AWB-1", "AWB-2"]);
        assert_eq!(report.skipped, vec![""]);

        let tracker = store.get_tracker_sync("AWB-1").unwrap().unwrap();
        assert_eq!(tracker.total(), 3);
        assert_eq!(tracker.metadata.tracking_id, "awb-1");

        recorder.record_scan("AWB-1", Stage::Label, Some("s1")).await.unwrap();

        let report = recorder
            .register_trackers(vec![registration("AWB-1", 5, "BlueDart")], DuplicatePolicy::Skip)
            .await
            .unwrap();
        assert_eq!(report.skipped, vec!["AWB-1"]);

        let report = recorder
            .register_trackers(vec![registration("AWB-1", 5, "BlueDart")], DuplicatePolicy::Update)
            .await
            .unwrap();
        assert_eq!(report.updated, vec!["AWB-1"]);

        let tracker = store.get_tracker_sync("AWB-1").unwrap().unwrap();
        assert_eq!(tracker.metadata.courier, "BlueDart");
        assert_eq!(tracker.total(), 3, "SKU total is fixed at creation");
        assert_eq!(tracker.progress(Stage::Label).scanned, 1);
    }
}
