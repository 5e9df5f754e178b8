//! Read-only views over trackers and scan history
//!
//! Every view is computed from a fresh store read; nothing is cached
//! between requests.

use chrono::NaiveDate;
use serde::Serialize;
use shared::tracker::{RejectReason, ScanEvent, ScanOutcome, Stage, Tracker};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::storage::{DocumentStore, ScanEventFilter, StorageResult};

pub const DEFAULT_RECENT_LIMIT: u32 = 20;
pub const MAX_RECENT_LIMIT: u32 = 100;
pub const DEFAULT_ERROR_LIMIT: u32 = 10;
pub const MAX_ERROR_LIMIT: u32 = 50;

const DAY_MILLIS: i64 = 86_400_000;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part as f64 * 100.0 / whole as f64)
    }
}

// ========== Platform Statistics ==========

/// Per-courier scan counts for one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourierStats {
    pub courier: String,
    pub total: u64,
    pub scanned: u64,
    pub pending: u64,
    pub multi_sku_scanned: u64,
    pub single_sku_scanned: u64,
    pub multi_sku_pending: u64,
    pub single_sku_pending: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStatistics {
    pub stage: Stage,
    /// Ordered by `total` descending, then courier ascending
    pub platforms: Vec<CourierStats>,
    pub total_trackers: u64,
    pub total_scanned: u64,
    pub total_pending: u64,
}

/// Group trackers by courier and count completion of `stage`
pub fn platform_statistics(trackers: &[Tracker], stage: Stage) -> PlatformStatistics {
    let mut groups: BTreeMap<&str, CourierStats> = BTreeMap::new();

    for tracker in trackers {
        let courier = tracker.metadata.courier_or_unknown();
        let stats = groups.entry(courier).or_insert_with(|| CourierStats {
            courier: courier.to_string(),
            ..Default::default()
        });
        let multi = tracker.total() > 1;
        stats.total += 1;
        match (tracker.is_stage_complete(stage), multi) {
            (true, true) => stats.multi_sku_scanned += 1,
            (true, false) => stats.single_sku_scanned += 1,
            (false, true) => stats.multi_sku_pending += 1,
            (false, false) => stats.single_sku_pending += 1,
        }
    }

    let mut platforms: Vec<CourierStats> = groups
        .into_values()
        .map(|mut stats| {
            stats.scanned = stats.multi_sku_scanned + stats.single_sku_scanned;
            stats.pending = stats.total - stats.scanned;
            stats
        })
        .collect();
    // BTreeMap already yields couriers ascending; stable sort keeps that for ties
    platforms.sort_by(|a, b| b.total.cmp(&a.total));

    let total_scanned = platforms.iter().map(|p| p.scanned).sum();
    PlatformStatistics {
        stage,
        total_trackers: trackers.len() as u64,
        total_scanned,
        total_pending: trackers.len() as u64 - total_scanned,
        platforms,
    }
}

// ========== Recent Scans ==========

/// A scan event joined with its tracker's metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentScan {
    pub id: String,
    pub tracker_code: String,
    pub tracking_id: String,
    pub platform: String,
    pub courier: String,
    pub buyer_city: String,
    pub amount: f64,
    pub stage: Stage,
    pub outcome: ScanOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku_ref: Option<String>,
    pub distribution: &'static str,
    pub scan_time: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentScans {
    pub results: Vec<RecentScan>,
    /// Total matching events across all pages
    pub count: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

/// Clamp paging input: page >= 1, limit in 1..=100 (default 20)
pub fn normalize_paging(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    (page, limit)
}

// ========== Tracking KPIs ==========

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingStats {
    pub total_uploaded: u64,
    pub label_scanned: u64,
    pub packing_scanned: u64,
    pub dispatch_scanned: u64,
    /// Dispatched and not cancelled
    pub completed: u64,
    pub cancelled: u64,
    pub on_hold: u64,
    pub label_percentage: f64,
    pub packing_percentage: f64,
    pub dispatch_percentage: f64,
    pub completion_percentage: f64,
}

pub fn tracking_stats(trackers: &[Tracker]) -> TrackingStats {
    let total = trackers.len() as u64;
    let count = |pred: &dyn Fn(&Tracker) -> bool| trackers.iter().filter(|t| pred(t)).count() as u64;

    let label_scanned = count(&|t| t.is_stage_complete(Stage::Label));
    let packing_scanned = count(&|t| t.is_stage_complete(Stage::Packing));
    let dispatch_scanned = count(&|t| t.is_stage_complete(Stage::Dispatch));
    let completed = count(&|t| t.is_completed());

    TrackingStats {
        total_uploaded: total,
        label_scanned,
        packing_scanned,
        dispatch_scanned,
        completed,
        cancelled: count(&|t| t.cancelled),
        on_hold: count(&|t| t.on_hold && !t.cancelled),
        label_percentage: percentage(label_scanned, total),
        packing_percentage: percentage(packing_scanned, total),
        dispatch_percentage: percentage(dispatch_scanned, total),
        completion_percentage: percentage(completed, total),
    }
}

// ========== Tracking Progress ==========

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageProgressView {
    pub stage: Stage,
    pub scanned: u32,
    pub total: u32,
    pub percentage: f64,
    pub completed: bool,
    pub scan_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingProgress {
    pub tracker_code: String,
    pub tracking_id: String,
    pub total_skus: u32,
    pub distribution: &'static str,
    pub stages: Vec<StageProgressView>,
    pub cancelled: bool,
    pub on_hold: bool,
    pub is_completed: bool,
    pub next_step: Option<Stage>,
}

pub fn tracking_progress(tracker: &Tracker) -> TrackingProgress {
    let stages = Stage::ALL
        .into_iter()
        .map(|stage| {
            let record = tracker.stages.get(stage);
            StageProgressView {
                stage,
                scanned: record.progress.scanned,
                total: record.progress.total,
                percentage: record.progress.percentage(),
                completed: record.completed,
                scan_count: record.scan_count,
            }
        })
        .collect();

    TrackingProgress {
        tracker_code: tracker.tracker_code.clone(),
        tracking_id: tracker.metadata.tracking_id.clone(),
        total_skus: tracker.total(),
        distribution: tracker.distribution().label(),
        stages,
        cancelled: tracker.cancelled,
        on_hold: tracker.on_hold,
        is_completed: tracker.is_completed(),
        next_step: tracker.next_step(),
    }
}

// ========== Scan History ==========

/// One tracker's scan attempts next to its current progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanHistory {
    pub tracker_code: String,
    pub progress: TrackingProgress,
    pub scans: RecentScans,
}

/// Scan attempts within one UTC day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyScanStats {
    /// `YYYY-MM-DD`
    pub date: String,
    pub total_scans: u64,
    pub successful_scans: u64,
    pub duplicate_scans: u64,
    pub failed_scans: u64,
    pub label_scans: u64,
    pub packing_scans: u64,
    pub dispatch_scans: u64,
    pub success_rate: f64,
}

pub fn daily_scan_stats(date: NaiveDate, events: &[ScanEvent]) -> DailyScanStats {
    let count = |pred: &dyn Fn(&ScanEvent) -> bool| events.iter().filter(|e| pred(e)).count() as u64;

    let total_scans = events.len() as u64;
    let successful_scans = count(&|e| e.outcome == ScanOutcome::Success);
    DailyScanStats {
        date: date.format("%Y-%m-%d").to_string(),
        total_scans,
        successful_scans,
        duplicate_scans: count(&|e| e.outcome == ScanOutcome::Duplicate),
        failed_scans: count(&|e| e.outcome == ScanOutcome::Rejected),
        label_scans: count(&|e| e.stage == Stage::Label),
        packing_scans: count(&|e| e.stage == Stage::Packing),
        dispatch_scans: count(&|e| e.stage == Stage::Dispatch),
        success_rate: percentage(successful_scans, total_scans),
    }
}

/// Epoch-millis window `[start, end)` covering `date` in UTC
fn day_window(date: NaiveDate) -> (i64, i64) {
    let start = date
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
        .timestamp_millis();
    (start, start + DAY_MILLIS)
}

// ========== Dashboard ==========

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_trackers: u64,
    pub completed: u64,
    /// Started but neither dispatched nor cancelled
    pub in_progress: u64,
    pub not_started: u64,
    pub cancelled: u64,
    pub on_hold: u64,
    pub multi_sku: u64,
    /// Successful scans per stage
    pub stage_scans: BTreeMap<Stage, u64>,
    /// Scan attempts per outcome
    pub outcomes: BTreeMap<ScanOutcome, u64>,
}

fn dashboard_from_trackers(trackers: &[Tracker]) -> DashboardStats {
    let mut stats = DashboardStats {
        total_trackers: trackers.len() as u64,
        ..Default::default()
    };
    for stage in Stage::ALL {
        stats.stage_scans.insert(stage, 0);
    }

    for tracker in trackers {
        if tracker.cancelled {
            stats.cancelled += 1;
        } else if tracker.is_completed() {
            stats.completed += 1;
        } else if tracker.current_stage().is_some() {
            stats.in_progress += 1;
        } else {
            stats.not_started += 1;
        }
        if tracker.on_hold && !tracker.cancelled {
            stats.on_hold += 1;
        }
        if tracker.total() > 1 {
            stats.multi_sku += 1;
        }
        for stage in Stage::ALL {
            *stats.stage_scans.entry(stage).or_default() +=
                u64::from(tracker.stages.get(stage).scan_count);
        }
    }
    stats
}

/// Read-only aggregation over the document store
pub struct AggregationEngine {
    store: Arc<dyn DocumentStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Courier breakdown for `stage` (label by convention)
    pub async fn get_platform_statistics(
        &self,
        stage: Option<Stage>,
    ) -> StorageResult<PlatformStatistics> {
        let trackers = self.store.list_trackers(None).await?;
        Ok(platform_statistics(&trackers, stage.unwrap_or(Stage::Label)))
    }

    /// Newest-first scan history joined with tracker metadata
    pub async fn get_recent_scans(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
        stage: Option<Stage>,
    ) -> StorageResult<RecentScans> {
        let (page, limit) = normalize_paging(page, limit);
        self.joined_page(&ScanEventFilter::for_stage(stage), page, limit)
            .await
    }

    /// Every scan attempt for one tracker, newest first
    ///
    /// `None` when the tracker does not exist.
    pub async fn get_scan_history(
        &self,
        code: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> StorageResult<Option<ScanHistory>> {
        let Some(tracker) = self.store.get_tracker(code).await? else {
            return Ok(None);
        };
        let (page, limit) = normalize_paging(page, limit);
        let filter = ScanEventFilter {
            tracker_code: Some(code.to_string()),
            ..Default::default()
        };
        let scans = self.joined_page(&filter, page, limit).await?;
        Ok(Some(ScanHistory {
            tracker_code: tracker.tracker_code.clone(),
            progress: tracking_progress(&tracker),
            scans,
        }))
    }

    /// Latest rejected scans; `limit` is clamped to 1..=50 (default 10)
    pub async fn get_recent_errors(&self, limit: Option<u32>) -> StorageResult<Vec<RecentScan>> {
        let limit = limit
            .unwrap_or(DEFAULT_ERROR_LIMIT)
            .clamp(1, MAX_ERROR_LIMIT);
        let filter = ScanEventFilter {
            outcome: Some(ScanOutcome::Rejected),
            ..Default::default()
        };
        Ok(self.joined_page(&filter, 1, limit).await?.results)
    }

    /// Scan attempts recorded on `date` (UTC)
    pub async fn get_daily_stats(&self, date: NaiveDate) -> StorageResult<DailyScanStats> {
        let (since, until) = day_window(date);
        let filter = ScanEventFilter {
            since: Some(since),
            until: Some(until),
            ..Default::default()
        };
        let page = self.store.list_scan_events(Some(&filter), 1, u32::MAX).await?;
        Ok(daily_scan_stats(date, &page.events))
    }

    async fn joined_page(
        &self,
        filter: &ScanEventFilter,
        page: u32,
        limit: u32,
    ) -> StorageResult<RecentScans> {
        let events = self.store.list_scan_events(Some(filter), page, limit).await?;

        let mut trackers: HashMap<String, Option<Tracker>> = HashMap::new();
        let mut results = Vec::with_capacity(events.events.len());
        for event in events.events {
            if !trackers.contains_key(&event.tracker_code) {
                let tracker = self.store.get_tracker(&event.tracker_code).await?;
                trackers.insert(event.tracker_code.clone(), tracker);
            }
            let tracker = trackers.get(&event.tracker_code).and_then(Option::as_ref);
            results.push(join_scan(event, tracker));
        }

        Ok(RecentScans {
            results,
            count: events.count,
            page,
            limit,
            total_pages: events.count.div_ceil(u64::from(limit)),
        })
    }

    pub async fn get_tracking_stats(&self) -> StorageResult<TrackingStats> {
        let trackers = self.store.list_trackers(None).await?;
        Ok(tracking_stats(&trackers))
    }

    pub async fn get_tracking_progress(&self, code: &str) -> StorageResult<Option<TrackingProgress>> {
        Ok(self
            .store
            .get_tracker(code)
            .await?
            .map(|tracker| tracking_progress(&tracker)))
    }

    pub async fn get_dashboard_stats(&self) -> StorageResult<DashboardStats> {
        let trackers = self.store.list_trackers(None).await?;
        let mut stats = dashboard_from_trackers(&trackers);
        for outcome in [ScanOutcome::Success, ScanOutcome::Duplicate, ScanOutcome::Rejected] {
            let filter = ScanEventFilter {
                outcome: Some(outcome),
                ..Default::default()
            };
            let count = self.store.count_scan_events(Some(&filter)).await?;
            stats.outcomes.insert(outcome, count);
        }
        Ok(stats)
    }
}

fn join_scan(event: ScanEvent, tracker: Option<&Tracker>) -> RecentScan {
    let (tracking_id, platform, courier, buyer_city, amount, distribution) = match tracker {
        Some(t) => (
            t.metadata.tracking_id.clone(),
            non_blank(&t.metadata.channel_name),
            t.metadata.courier_or_unknown().to_string(),
            non_blank(&t.metadata.buyer_city),
            t.metadata.amount,
            t.distribution().label(),
        ),
        None => (
            event.tracker_code.clone(),
            "Unknown".to_string(),
            "Unknown".to_string(),
            "Unknown".to_string(),
            0.0,
            "Single SKU",
        ),
    };

    RecentScan {
        scan_time: shared::util::format_millis(event.timestamp),
        timestamp: event.timestamp,
        id: event.id,
        tracker_code: event.tracker_code,
        tracking_id,
        platform,
        courier,
        buyer_city,
        amount,
        stage: event.stage,
        outcome: event.outcome,
        reason: event.reason,
        sku_ref: event.sku_ref,
        distribution,
    }
}

fn non_blank(value: &str) -> String {
    match value.trim() {
        "" => "Unknown".to_string(),
        v => v.to_string(),
    }
}
