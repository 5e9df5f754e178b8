//! TrackerService - entry point used by the HTTP layer and the sync job
//!
//! Owns the store and wires the recorder and the aggregation engine to it.
//! Methods here speak [`AppError`]; the components below keep their own
//! error types.

use chrono::NaiveDate;
use shared::tracker::{
    DuplicatePolicy, RegistrationReport, Stage, Tracker, TrackerRegistration, sanitize_tracker_code,
};
use shared::{AppError, AppResult};
use std::path::Path;
use std::sync::Arc;

use super::aggregation::{
    AggregationEngine, DailyScanStats, DashboardStats, PlatformStatistics, RecentScan,
    RecentScans, ScanHistory, TrackingProgress, TrackingStats,
};
use super::recorder::{RecordError, ScanRecorder, ScanResult};
use super::storage::{DocumentStore, RedbStore, StorageResult, TrackerFilter};

/// Database file name inside the work directory
pub const DATABASE_FILE: &str = "tracking.redb";

pub struct TrackerService {
    store: Arc<dyn DocumentStore>,
    recorder: ScanRecorder,
    aggregation: AggregationEngine,
}

impl std::fmt::Debug for TrackerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerService")
            .field("store", &"<DocumentStore>")
            .finish()
    }
}

impl TrackerService {
    /// Open (or create) the redb database under `work_dir`
    pub fn open(work_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let path = work_dir.as_ref().join(DATABASE_FILE);
        tracing::info!(path = %path.display(), "Opening tracking database");
        let store = RedbStore::open(&path)?;
        Ok(Self::with_store(Arc::new(store)))
    }

    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            recorder: ScanRecorder::new(store.clone()),
            aggregation: AggregationEngine::new(store.clone()),
            store,
        }
    }

    // ========== Commands ==========

    pub async fn record_scan(
        &self,
        tracker_code: &str,
        stage: Stage,
        sku_ref: Option<&str>,
    ) -> AppResult<ScanResult> {
        Ok(self.recorder.record_scan(tracker_code, stage, sku_ref).await?)
    }

    pub async fn register_trackers(
        &self,
        entries: Vec<TrackerRegistration>,
        policy: DuplicatePolicy,
    ) -> AppResult<RegistrationReport> {
        if entries.is_empty() {
            return Err(AppError::validation("no trackers supplied"));
        }
        Ok(self.recorder.register_trackers(entries, policy).await?)
    }

    pub async fn cancel(&self, tracker_code: &str) -> AppResult<Tracker> {
        Ok(self.recorder.cancel(tracker_code).await?)
    }

    pub async fn set_hold(&self, tracker_code: &str, on_hold: bool) -> AppResult<Tracker> {
        Ok(self.recorder.set_hold(tracker_code, on_hold).await?)
    }

    // ========== Queries ==========

    pub async fn get_tracker(&self, tracker_code: &str) -> AppResult<Tracker> {
        let code = sanitize_tracker_code(tracker_code).map_err(RecordError::from)?;
        self.store
            .get_tracker(&code)
            .await?
            .ok_or_else(|| AppError::tracker_not_found(code))
    }

    pub async fn list_trackers(&self, filter: &TrackerFilter) -> AppResult<Vec<Tracker>> {
        Ok(self.store.list_trackers(Some(filter)).await?)
    }

    /// Full tracker snapshot for export, ordered by tracker code
    pub async fn snapshot(&self) -> StorageResult<Vec<Tracker>> {
        self.store.list_trackers(None).await
    }

    pub async fn platform_statistics(&self, stage: Option<Stage>) -> AppResult<PlatformStatistics> {
        Ok(self.aggregation.get_platform_statistics(stage).await?)
    }

    pub async fn recent_scans(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
        stage: Option<Stage>,
    ) -> AppResult<RecentScans> {
        Ok(self.aggregation.get_recent_scans(page, limit, stage).await?)
    }

    pub async fn scan_history(
        &self,
        tracker_code: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> AppResult<ScanHistory> {
        let code = sanitize_tracker_code(tracker_code).map_err(RecordError::from)?;
        self.aggregation
            .get_scan_history(&code, page, limit)
            .await?
            .ok_or_else(|| AppError::tracker_not_found(code))
    }

    pub async fn recent_errors(&self, limit: Option<u32>) -> AppResult<Vec<RecentScan>> {
        Ok(self.aggregation.get_recent_errors(limit).await?)
    }

    /// Daily scan counts; `date` defaults to today (UTC)
    pub async fn daily_stats(&self, date: Option<NaiveDate>) -> AppResult<DailyScanStats> {
        let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
        Ok(self.aggregation.get_daily_stats(date).await?)
    }

    pub async fn tracking_stats(&self) -> AppResult<TrackingStats> {
        Ok(self.aggregation.get_tracking_stats().await?)
    }

    pub async fn tracking_progress(&self, tracker_code: &str) -> AppResult<TrackingProgress> {
        let code = sanitize_tracker_code(tracker_code).map_err(RecordError::from)?;
        self.aggregation
            .get_tracking_progress(&code)
            .await?
            .ok_or_else(|| AppError::tracker_not_found(code))
    }

    pub async fn dashboard_stats(&self) -> AppResult<DashboardStats> {
        Ok(self.aggregation.get_dashboard_stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ErrorCode;
    use shared::tracker::TrackerMetadata;

    fn service() -> TrackerService {
        TrackerService::with_store(Arc::new(RedbStore::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = TrackerService::open(dir.path()).unwrap();
        service.record_scan("a-1", Stage::Label, None).await.unwrap();
        assert!(dir.path().join(DATABASE_FILE).exists());
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let service = service();
        service.record_scan("awb 77", Stage::Label, None).await.unwrap();

        let tracker = service.get_tracker("AWB_77").await.unwrap();
        assert_eq!(tracker.tracker_code, "AWB_77");
        let progress = service.tracking_progress("awb 77").await.unwrap();
        assert_eq!(progress.stages[0].scanned, 1);
    }

    #[tokio::test]
    async fn test_error_codes() {
        let service = service();
        let err = service.get_tracker("nope").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TrackerNotFound);

        let err = service.record_scan("   ", Stage::Label, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTrackerCode);

        let err = service
            .register_trackers(Vec::new(), DuplicatePolicy::Skip)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_scan_history_and_errors() {
        let service = service();
        service.record_scan("h_1", Stage::Label, None).await.unwrap();
        service.record_scan("h_1", Stage::Dispatch, None).await.unwrap();
        service.record_scan("h_2", Stage::Label, None).await.unwrap();

        let history = service.scan_history("h 1", None, None).await.unwrap();
        assert_eq!(history.tracker_code, "H_1");
        assert_eq!(history.scans.count, 2);
        assert_eq!(history.scans.results[0].stage, Stage::Dispatch);

        let err = service.scan_history("nope", None, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TrackerNotFound);

        let errors = service.recent_errors(None).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].tracker_code, "H_1");
    }

    #[tokio::test]
    async fn test_snapshot_and_filtering() {
        let service = service();
        let mut metadata = TrackerMetadata::for_code("B");
        metadata.courier = "Ekart".to_string();
        service
            .register_trackers(
                vec![
                    TrackerRegistration {
                        tracker_code: "b".to_string(),
                        sku_count: 1,
                        metadata,
                    },
                    TrackerRegistration {
                        tracker_code: "a".to_string(),
                        sku_count: 2,
                        metadata: TrackerMetadata::default(),
                    },
                ],
                DuplicatePolicy::Skip,
            )
            .await
            .unwrap();

        let all = service.snapshot().await.unwrap();
        let codes: Vec<_> = all.iter().map(|t| t.tracker_code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B"]);

        let ekart = service
            .list_trackers(&TrackerFilter {
                courier: Some("ekart".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ekart.len(), 1);
    }
}
