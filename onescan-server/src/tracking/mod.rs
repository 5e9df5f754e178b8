//! Tracker stage tracking
//!
//! ```text
//! HTTP scan ─► ScanRecorder ─► ledger (pure) ─► DocumentStore (redb)
//!                                                   │
//! HTTP stats ◄── AggregationEngine ◄────────────────┘
//! ```
//!
//! - `ledger`: stage ordering and multi-SKU progress, no I/O
//! - `storage`: trackers and the append-only scan log
//! - `recorder`: one atomic tracker write plus event append per scan
//! - `aggregation`: read-only statistics
//! - `service`: facade used by the API and the sync job

pub mod aggregation;
pub mod ledger;
pub mod recorder;
pub mod service;
pub mod storage;

pub use aggregation::AggregationEngine;
pub use recorder::{RecordError, ScanRecorder, ScanResult};
pub use service::TrackerService;
pub use storage::{DocumentStore, RedbStore, StorageError, StorageResult};
