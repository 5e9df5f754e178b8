//! Spreadsheet sync
//!
//! Periodically overrides a Google Sheets worksheet with the full tracker
//! table. The spreadsheet is a read-only mirror; nothing flows back.

pub mod checkpoint;
pub mod google;
pub mod rows;
pub mod scheduler;
pub mod sink;

pub use checkpoint::{CheckpointCell, LastSyncStatus, SyncCheckpoint, SyncState};
pub use google::GoogleSheetSink;
pub use rows::{HEADERS, ROW_SCHEMA_VERSION};
pub use scheduler::{ManualSync, SyncHandle, SyncScheduler, SyncSettings, SyncStatus};
pub use sink::{MemorySink, SheetSink, SinkError};
