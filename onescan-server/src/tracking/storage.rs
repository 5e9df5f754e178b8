//! Document store for trackers and scan events
//!
//! [`DocumentStore`] is the only persistence seam the tracking core sees.
//! [`RedbStore`] is the embedded implementation.
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `trackers` | `tracker_code` | `Tracker` | Current tracker state |
//! | `scan_events` | `(timestamp, sequence)` | `ScanEvent` | Scan history (append-only) |
//! | `sequence_counter` | `"seq"` | `u64` | Event sequence |
//!
//! Values are JSON; a record that no longer deserializes surfaces as
//! [`StorageError::Serialization`] instead of being skipped.

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::tracker::{ScanEvent, ScanOutcome, Stage, Tracker};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Table for trackers: key = tracker_code, value = JSON-serialized Tracker
const TRACKERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("trackers");

/// Table for scan events: key = (timestamp, sequence), value = JSON-serialized ScanEvent
const SCAN_EVENTS_TABLE: TableDefinition<(i64, u64), &[u8]> = TableDefinition::new("scan_events");

/// Table for sequence counter: key = "seq", value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const SEQUENCE_KEY: &str = "seq";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for shared::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Serialization(e) => shared::AppError::database(e.to_string()),
            other => shared::AppError::storage_unavailable(other.to_string()),
        }
    }
}

/// Filter for tracker listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerFilter {
    /// Case-insensitive courier match (`"Unknown"` matches blank couriers)
    pub courier: Option<String>,
    /// Only trackers whose stage is complete
    pub completed_stage: Option<Stage>,
}

impl TrackerFilter {
    pub fn matches(&self, tracker: &Tracker) -> bool {
        if let Some(courier) = &self.courier
            && !tracker
                .metadata
                .courier_or_unknown()
                .eq_ignore_ascii_case(courier.trim())
        {
            return false;
        }
        if let Some(stage) = self.completed_stage
            && !tracker.is_stage_complete(stage)
        {
            return false;
        }
        true
    }
}

/// Filter for scan event listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanEventFilter {
    pub stage: Option<Stage>,
    pub tracker_code: Option<String>,
    pub outcome: Option<ScanOutcome>,
    /// Inclusive lower bound on the event timestamp (epoch millis)
    pub since: Option<i64>,
    /// Exclusive upper bound on the event timestamp (epoch millis)
    pub until: Option<i64>,
}

impl ScanEventFilter {
    pub fn for_stage(stage: Option<Stage>) -> Self {
        Self {
            stage,
            ..Default::default()
        }
    }

    pub fn matches(&self, event: &ScanEvent) -> bool {
        self.stage.is_none_or(|stage| event.stage == stage)
            && self
                .tracker_code
                .as_deref()
                .is_none_or(|code| event.tracker_code == code)
            && self.outcome.is_none_or(|outcome| event.outcome == outcome)
            && self.since.is_none_or(|since| event.timestamp >= since)
            && self.until.is_none_or(|until| event.timestamp < until)
    }
}

/// One page of scan events, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanEventPage {
    pub events: Vec<ScanEvent>,
    /// Total events matching the filter (across all pages)
    pub count: u64,
}

/// Key-value/document collection used by the tracking core
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_tracker(&self, code: &str) -> StorageResult<Option<Tracker>>;

    async fn put_tracker(&self, tracker: &Tracker) -> StorageResult<()>;

    async fn append_scan_event(&self, event: &ScanEvent) -> StorageResult<()>;

    /// `put_tracker` plus `append_scan_event` as one unit
    ///
    /// Either both land or neither does.
    async fn commit_scan(&self, tracker: &Tracker, event: &ScanEvent) -> StorageResult<()>;

    async fn list_trackers(&self, filter: Option<&TrackerFilter>) -> StorageResult<Vec<Tracker>>;

    /// `page` is 1-based; a page past the end is empty
    async fn list_scan_events(
        &self,
        filter: Option<&ScanEventFilter>,
        page: u32,
        limit: u32,
    ) -> StorageResult<ScanEventPage>;

    async fn count_scan_events(&self, filter: Option<&ScanEventFilter>) -> StorageResult<u64>;
}

/// Tracker storage backed by redb
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create the database at the given path
    ///
    /// redb commits are durable once `commit()` returns, so a tracker write
    /// acknowledged to a scanner survives a power cut.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and throwaway runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TRACKERS_TABLE)?;
            let _ = write_txn.open_table(SCAN_EVENTS_TABLE)?;
            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(SEQUENCE_KEY)?.is_none() {
                seq_table.insert(SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Tracker Operations ==========

    pub fn get_tracker_sync(&self, code: &str) -> StorageResult<Option<Tracker>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKERS_TABLE)?;

        match table.get(code)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn put_tracker_sync(&self, tracker: &Tracker) -> StorageResult<()> {
        let value = serde_json::to_vec(tracker)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TRACKERS_TABLE)?;
            table.insert(tracker.tracker_code.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Snapshot of all trackers, ordered by tracker code
    pub fn list_trackers_sync(&self, filter: Option<&TrackerFilter>) -> StorageResult<Vec<Tracker>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKERS_TABLE)?;

        let mut trackers = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let tracker: Tracker = serde_json::from_slice(value.value())?;
            if filter.is_none_or(|f| f.matches(&tracker)) {
                trackers.push(tracker);
            }
        }
        Ok(trackers)
    }

    // ========== Scan Event Operations ==========

    /// Tracker write and event append in one write transaction
    pub fn commit_scan_sync(&self, tracker: &Tracker, event: &ScanEvent) -> StorageResult<u64> {
        let tracker_value = serde_json::to_vec(tracker)?;
        let event_value = serde_json::to_vec(event)?;
        let txn = self.db.begin_write()?;
        let sequence = {
            let mut trackers = txn.open_table(TRACKERS_TABLE)?;
            trackers.insert(tracker.tracker_code.as_str(), tracker_value.as_slice())?;
            Self::insert_scan_event(&txn, event.timestamp, &event_value)?
        };
        txn.commit()?;
        Ok(sequence)
    }

    fn insert_scan_event(
        txn: &redb::WriteTransaction,
        timestamp: i64,
        value: &[u8],
    ) -> StorageResult<u64> {
        let mut seq_table = txn.open_table(SEQUENCE_TABLE)?;
        let next = seq_table
            .get(SEQUENCE_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0)
            + 1;
        seq_table.insert(SEQUENCE_KEY, next)?;

        let mut table = txn.open_table(SCAN_EVENTS_TABLE)?;
        table.insert((timestamp, next), value)?;
        Ok(next)
    }

    /// Append an event without touching its tracker
    pub fn append_scan_event_sync(&self, event: &ScanEvent) -> StorageResult<u64> {
        let value = serde_json::to_vec(event)?;
        let txn = self.db.begin_write()?;
        let sequence = Self::insert_scan_event(&txn, event.timestamp, &value)?;
        txn.commit()?;
        Ok(sequence)
    }

    /// Walk events newest first, calling `visit` for each match until it returns false
    fn scan_events_desc(
        &self,
        filter: Option<&ScanEventFilter>,
        mut visit: impl FnMut(ScanEvent) -> bool,
    ) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SCAN_EVENTS_TABLE)?;

        for result in table.iter()?.rev() {
            let (_key, value) = result?;
            let event: ScanEvent = serde_json::from_slice(value.value())?;
            if filter.is_none_or(|f| f.matches(&event)) && !visit(event) {
                break;
            }
        }
        Ok(())
    }

    pub fn list_scan_events_sync(
        &self,
        filter: Option<&ScanEventFilter>,
        page: u32,
        limit: u32,
    ) -> StorageResult<ScanEventPage> {
        let page = page.max(1) as u64;
        let limit = limit as u64;
        let skip = (page - 1).saturating_mul(limit);

        let mut count = 0u64;
        let mut events = Vec::new();
        self.scan_events_desc(filter, |event| {
            if count >= skip && (events.len() as u64) < limit {
                events.push(event);
            }
            count += 1;
            true
        })?;

        Ok(ScanEventPage { events, count })
    }

    pub fn count_scan_events_sync(&self, filter: Option<&ScanEventFilter>) -> StorageResult<u64> {
        let mut count = 0u64;
        self.scan_events_desc(filter, |_| {
            count += 1;
            true
        })?;
        Ok(count)
    }
}

#[async_trait]
impl DocumentStore for RedbStore {
    async fn get_tracker(&self, code: &str) -> StorageResult<Option<Tracker>> {
        self.get_tracker_sync(code)
    }

    async fn put_tracker(&self, tracker: &Tracker) -> StorageResult<()> {
        self.put_tracker_sync(tracker)
    }

    async fn append_scan_event(&self, event: &ScanEvent) -> StorageResult<()> {
        self.append_scan_event_sync(event).map(|_| ())
    }

    async fn commit_scan(&self, tracker: &Tracker, event: &ScanEvent) -> StorageResult<()> {
        self.commit_scan_sync(tracker, event).map(|_| ())
    }

    async fn list_trackers(&self, filter: Option<&TrackerFilter>) -> StorageResult<Vec<Tracker>> {
        self.list_trackers_sync(filter)
    }

    async fn list_scan_events(
        &self,
        filter: Option<&ScanEventFilter>,
        page: u32,
        limit: u32,
    ) -> StorageResult<ScanEventPage> {
        self.list_scan_events_sync(filter, page, limit)
    }

    async fn count_scan_events(&self, filter: Option<&ScanEventFilter>) -> StorageResult<u64> {
        self.count_scan_events_sync(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::tracker::{RejectReason, TrackerMetadata};

    fn create_test_tracker(code: &str, courier: &str) -> Tracker {
        let mut metadata = TrackerMetadata::for_code(code);
        metadata.courier = courier.to_string();
        Tracker::new(code, metadata, 1, shared::util::now_millis())
    }

    fn create_test_event(code: &str, stage: Stage, timestamp: i64) -> ScanEvent {
        ScanEvent::new(code, stage, ScanOutcome::Success, None, None, timestamp)
    }

    #[test]
    fn test_tracker_put_and_get() {
        let storage = RedbStore::open_in_memory().unwrap();
        assert!(storage.get_tracker_sync("TRK-1").unwrap().is_none());

        let tracker = create_test_tracker("TRK-1", "Delhivery");
        storage.put_tracker_sync(&tracker).unwrap();

        let loaded = storage.get_tracker_sync("TRK-1").unwrap().unwrap();
        assert_eq!(loaded, tracker);
    }

    #[test]
    fn test_put_overwrites() {
        let storage = RedbStore::open_in_memory().unwrap();
        let mut tracker = create_test_tracker("TRK-1", "Delhivery");
        storage.put_tracker_sync(&tracker).unwrap();

        tracker.on_hold = true;
        storage.put_tracker_sync(&tracker).unwrap();

        let all = storage.list_trackers_sync(None).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].on_hold);
    }

    #[test]
    fn test_list_trackers_with_filter() {
        let storage = RedbStore::open_in_memory().unwrap();
        storage
            .put_tracker_sync(&create_test_tracker("B", "Delhivery"))
            .unwrap();
        storage
            .put_tracker_sync(&create_test_tracker("A", "BlueDart"))
            .unwrap();
        storage.put_tracker_sync(&create_test_tracker("C", "")).unwrap();

        let all = storage.list_trackers_sync(None).unwrap();
        let codes: Vec<_> = all.iter().map(|t| t.tracker_code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);

        let filter = TrackerFilter {
            courier: Some("delhivery".to_string()),
            ..Default::default()
        };
        assert_eq!(storage.list_trackers_sync(Some(&filter)).unwrap().len(), 1);

        let unknown = TrackerFilter {
            courier: Some("Unknown".to_string()),
            ..Default::default()
        };
        let found = storage.list_trackers_sync(Some(&unknown)).unwrap();
        assert_eq!(found[0].tracker_code, "C");

        let completed = TrackerFilter {
            completed_stage: Some(Stage::Label),
            ..Default::default()
        };
        assert!(storage.list_trackers_sync(Some(&completed)).unwrap().is_empty());
    }

    #[test]
    fn test_scan_events_newest_first_and_paginated() {
        let storage = RedbStore::open_in_memory().unwrap();
        for ts in 1..=5 {
            storage
                .append_scan_event_sync(&create_test_event("TRK-1", Stage::Label, ts * 1000))
                .unwrap();
        }

        let page1 = storage.list_scan_events_sync(None, 1, 2).unwrap();
        assert_eq!(page1.count, 5);
        let stamps: Vec<_> = page1.events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![5000, 4000]);

        let page3 = storage.list_scan_events_sync(None, 3, 2).unwrap();
        assert_eq!(page3.events.len(), 1);
        assert_eq!(page3.events[0].timestamp, 1000);

        let beyond = storage.list_scan_events_sync(None, 10, 2).unwrap();
        assert!(beyond.events.is_empty());
        assert_eq!(beyond.count, 5);
    }

    #[test]
    fn test_same_timestamp_keeps_append_order() {
        let storage = RedbStore::open_in_memory().unwrap();
        let first = create_test_event("A", Stage::Label, 1000);
        let second = create_test_event("B", Stage::Label, 1000);
        assert_eq!(storage.append_scan_event_sync(&first).unwrap(), 1);
        assert_eq!(storage.append_scan_event_sync(&second).unwrap(), 2);

        let page = storage.list_scan_events_sync(None, 1, 10).unwrap();
        assert_eq!(page.events[0].tracker_code, "B");
        assert_eq!(page.events[1].tracker_code, "A");
    }

    #[test]
    fn test_scan_event_filters() {
        let storage = RedbStore::open_in_memory().unwrap();
        storage
            .append_scan_event_sync(&create_test_event("A", Stage::Label, 1))
            .unwrap();
        storage
            .append_scan_event_sync(&create_test_event("A", Stage::Packing, 2))
            .unwrap();
        let rejected = ScanEvent::new(
            "B",
            Stage::Packing,
            ScanOutcome::Rejected,
            Some(RejectReason::StageOutOfOrder),
            None,
            3,
        );
        storage.append_scan_event_sync(&rejected).unwrap();

        let packing = ScanEventFilter::for_stage(Some(Stage::Packing));
        assert_eq!(storage.count_scan_events_sync(Some(&packing)).unwrap(), 2);

        let by_tracker = ScanEventFilter {
            tracker_code: Some("A".to_string()),
            ..Default::default()
        };
        assert_eq!(storage.count_scan_events_sync(Some(&by_tracker)).unwrap(), 2);

        let failures = ScanEventFilter {
            outcome: Some(ScanOutcome::Rejected),
            ..Default::default()
        };
        let page = storage.list_scan_events_sync(Some(&failures), 1, 20).unwrap();
        assert_eq!(page.events, vec![rejected]);
    }

    #[test]
    fn test_commit_scan_writes_tracker_and_event() {
        let storage = RedbStore::open_in_memory().unwrap();
        let tracker = create_test_tracker("TRK-5", "Ekart");
        let event = create_test_event("TRK-5", Stage::Label, 42);

        assert_eq!(storage.commit_scan_sync(&tracker, &event).unwrap(), 1);
        assert_eq!(storage.get_tracker_sync("TRK-5").unwrap(), Some(tracker));
        let page = storage.list_scan_events_sync(None, 1, 10).unwrap();
        assert_eq!(page.events, vec![event]);
    }

    #[test]
    fn test_scan_event_time_window() {
        let storage = RedbStore::open_in_memory().unwrap();
        for ts in [999, 1000, 1500, 2000] {
            storage
                .append_scan_event_sync(&create_test_event("A", Stage::Label, ts))
                .unwrap();
        }

        let window = ScanEventFilter {
            since: Some(1000),
            until: Some(2000),
            ..Default::default()
        };
        let page = storage.list_scan_events_sync(Some(&window), 1, 10).unwrap();
        let stamps: Vec<_> = page.events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1500, 1000]);
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onescan.redb");

        {
            let storage = RedbStore::open(&path).unwrap();
            storage
                .put_tracker_sync(&create_test_tracker("TRK-9", "Ekart"))
                .unwrap();
            storage
                .append_scan_event_sync(&create_test_event("TRK-9", Stage::Label, 7))
                .unwrap();
        }

        let storage = RedbStore::open(&path).unwrap();
        assert!(storage.get_tracker_sync("TRK-9").unwrap().is_some());
        assert_eq!(storage.count_scan_events_sync(None).unwrap(), 1);
        // Sequence continues after reopen
        let seq = storage
            .append_scan_event_sync(&create_test_event("TRK-9", Stage::Packing, 8))
            .unwrap();
        assert_eq!(seq, 2);
    }

    #[tokio::test]
    async fn test_document_store_trait_object() {
        let store: Arc<dyn DocumentStore> = Arc::new(RedbStore::open_in_memory().unwrap());
        store
            .put_tracker(&create_test_tracker("TRK-1", "Delhivery"))
            .await
            .unwrap();
        assert!(store.get_tracker("TRK-1").await.unwrap().is_some());
        assert_eq!(store.list_trackers(None).await.unwrap().len(), 1);
        assert_eq!(store.count_scan_events(None).await.unwrap(), 0);

        store
            .append_scan_event(&create_test_event("TRK-1", Stage::Label, 1))
            .await
            .unwrap();
        let page = store.list_scan_events(None, 1, 10).await.unwrap();
        assert_eq!(page.count, 1);
    }
}
