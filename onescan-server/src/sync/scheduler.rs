//! SyncScheduler - periodic override of the worksheet
//!
//! 1. Wait for the interval timer or a manual trigger
//! 2. Snapshot every tracker and render the full grid
//! 3. Write it through the sink, retrying with exponential backoff
//! 4. Record the outcome in the checkpoint
//!
//! The whole cycle runs under a timeout. Only one cycle runs at a time;
//! shutdown aborts the cycle in flight.

use serde::Serialize;
use shared::{AppError, ErrorCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::checkpoint::{CheckpointCell, LastSyncStatus, SyncCheckpoint, SyncState};
use super::google::{GoogleSheetSink, ServiceAccountKey};
use super::rows::{ROW_SCHEMA_VERSION, render_rows};
use super::sink::{SheetSink, SinkError};
use crate::core::config::{Config, ConfigError};
use crate::tracking::{StorageError, TrackerService};

/// Backoff ceiling between write attempts
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Timing knobs for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub interval: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub cycle_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            cycle_timeout: Duration::from_secs(120),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.sync_interval_secs.max(1)),
            max_attempts: config.sync_max_attempts.max(1),
            retry_delay: Duration::from_secs(config.sync_retry_delay_secs),
            cycle_timeout: Duration::from_secs(config.sync_cycle_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Snapshot failed: {0}")]
    Snapshot(#[from] StorageError),

    #[error("Sheet write failed after {attempts} attempt(s): {source}")]
    Sink {
        attempts: u32,
        #[source]
        source: SinkError,
    },

    #[error("Sync cycle timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

pub struct SyncScheduler {
    service: Arc<TrackerService>,
    sink: Arc<dyn SheetSink>,
    settings: SyncSettings,
    checkpoint: CheckpointCell,
    trigger: Arc<Notify>,
    /// A manual cycle has been requested but not started yet
    pending: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl SyncScheduler {
    pub fn new(service: Arc<TrackerService>, sink: Arc<dyn SheetSink>, settings: SyncSettings) -> Self {
        Self {
            service,
            sink,
            settings,
            checkpoint: CheckpointCell::new(),
            trigger: Arc::new(Notify::new()),
            pending: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build the Google Sheets scheduler, or `None` when sync is not configured
    pub fn from_config(
        config: &Config,
        service: Arc<TrackerService>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(sheet) = &config.sheet else {
            tracing::info!("GOOGLE_SHEETS_SPREADSHEET_ID not set, spreadsheet sync disabled");
            return Ok(None);
        };

        let key = ServiceAccountKey::from_file(&sheet.credentials_path)?;
        let sink = GoogleSheetSink::new(
            key,
            &sheet.spreadsheet_id,
            &sheet.worksheet_name,
            config.request_timeout(),
        )?;
        Ok(Some(Self::new(
            service,
            Arc::new(sink),
            SyncSettings::from_config(config),
        )))
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            enabled: true,
            destination: Some(self.sink.describe()),
            interval: self.settings.interval,
            checkpoint: self.checkpoint.clone(),
            trigger: self.trigger.clone(),
            pending: self.pending.clone(),
            alive: self.alive.clone(),
        }
    }

    /// Main loop, runs until `shutdown` is cancelled
    ///
    /// The first timer tick fires immediately, so a cycle runs at startup.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            destination = %self.sink.describe(),
            "SyncScheduler started"
        );
        let _alive = AliveGuard::arm(&self.alive, &self.checkpoint);

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {
                    tracing::debug!("Manual sync cycle requested");
                }
            }

            self.pending.store(false, Ordering::Release);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.checkpoint.abort();
                    tracing::warn!("Sync cycle aborted by shutdown");
                    break;
                }
                _ = self.run_cycle() => {}
            }
            interval.reset();
        }

        tracing::info!("SyncScheduler stopped");
    }

    /// Run one complete cycle and return the resulting checkpoint
    pub async fn run_cycle(&self) -> SyncCheckpoint {
        self.checkpoint.begin_cycle();
        let started = std::time::Instant::now();

        let result = match tokio::time::timeout(self.settings.cycle_timeout, self.sync_once()).await {
            Ok(result) => result,
            Err(_) => Err(CycleError::Timeout(self.settings.cycle_timeout)),
        };

        let now = shared::util::now_millis();
        match result {
            Ok(rows) => {
                self.checkpoint.succeed(rows, now);
                tracing::info!(
                    rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Sync cycle succeeded"
                );
            }
            Err(e) => {
                self.checkpoint.fail(e.to_string(), now);
                tracing::error!(error = %e, "Sync cycle failed");
            }
        }

        let finished = self.checkpoint.snapshot();
        self.checkpoint.settle();
        finished
    }

    /// Snapshot, render and write with retries; returns data rows written
    async fn sync_once(&self) -> Result<usize, CycleError> {
        let trackers = self.service.snapshot().await?;
        let rows = render_rows(&trackers, shared::util::now_millis());
        let data_rows = rows.len() - 1;

        let mut delay = self.settings.retry_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.checkpoint.record_attempt(attempt);

            match self.sink.clear_and_write_rows(&rows).await {
                Ok(()) => return Ok(data_rows),
                Err(e) if attempt < self.settings.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.settings.max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "Sheet write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
                Err(source) => {
                    return Err(CycleError::Sink {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

/// Marks the scheduler alive until dropped, including on panic
struct AliveGuard {
    alive: Arc<AtomicBool>,
    checkpoint: CheckpointCell,
}

impl AliveGuard {
    fn arm(alive: &Arc<AtomicBool>, checkpoint: &CheckpointCell) -> Self {
        alive.store(true, Ordering::Release);
        Self {
            alive: alive.clone(),
            checkpoint: checkpoint.clone(),
        }
    }
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        self.checkpoint.abort();
    }
}

/// Status view returned by `GET /sync/status`
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub interval_secs: u64,
    pub state: SyncState,
    pub last_sync_time: Option<i64>,
    pub last_sync_time_formatted: Option<String>,
    pub last_sync_status: LastSyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub rows_synced: usize,
    pub attempts: u32,
    pub cycles_completed: u64,
    pub row_schema_version: u32,
}

/// Result of a manual trigger
#[derive(Debug)]
pub struct ManualSync {
    /// A cycle was already running; the caller shares its result
    pub coalesced: bool,
    target_cycle: u64,
    receiver: watch::Receiver<SyncCheckpoint>,
}

impl ManualSync {
    /// Wait for the cycle serving this trigger to finish
    pub async fn wait(mut self) -> Option<SyncCheckpoint> {
        let target = self.target_cycle;
        self.receiver
            .wait_for(|cp| cp.cycles_completed >= target)
            .await
            .ok()
            .map(|cp| cp.clone())
    }
}

/// Cloneable handle used by the HTTP layer
#[derive(Debug, Clone)]
pub struct SyncHandle {
    enabled: bool,
    destination: Option<String>,
    interval: Duration,
    checkpoint: CheckpointCell,
    trigger: Arc<Notify>,
    pending: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl SyncHandle {
    /// Handle for a deployment without a spreadsheet
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            destination: None,
            interval: Duration::ZERO,
            checkpoint: CheckpointCell::new(),
            trigger: Arc::new(Notify::new()),
            pending: Arc::new(AtomicBool::new(false)),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn checkpoint(&self) -> SyncCheckpoint {
        self.checkpoint.snapshot()
    }

    /// Watch every checkpoint change
    pub fn subscribe(&self) -> watch::Receiver<SyncCheckpoint> {
        self.checkpoint.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        let cp = self.checkpoint.snapshot();
        SyncStatus {
            enabled: self.enabled,
            running: self.alive.load(Ordering::Acquire),
            destination: self.destination.clone(),
            interval_secs: self.interval.as_secs(),
            state: cp.state,
            last_sync_time: cp.last_sync_time,
            last_sync_time_formatted: cp.last_sync_time.map(shared::util::format_millis),
            last_sync_status: cp.last_sync_status,
            last_error: cp.last_error,
            rows_synced: cp.rows_synced,
            attempts: cp.attempts,
            cycles_completed: cp.cycles_completed,
            row_schema_version: ROW_SCHEMA_VERSION,
        }
    }

    /// Request a cycle now
    ///
    /// While a cycle is running the request is coalesced into it. Repeated
    /// requests while idle collapse into a single pending cycle.
    pub fn trigger_manual_sync(&self) -> Result<ManualSync, AppError> {
        if !self.enabled {
            return Err(AppError::new(ErrorCode::SyncDisabled));
        }
        if !self.alive.load(Ordering::Acquire) {
            return Err(AppError::new(ErrorCode::SyncUnavailable));
        }

        let receiver = self.checkpoint.subscribe();
        let current = receiver.borrow().clone();
        let coalesced = if current.state == SyncState::Running {
            tracing::debug!("Manual sync coalesced into running cycle");
            true
        } else if self.pending.swap(true, Ordering::AcqRel) {
            tracing::debug!("Manual sync coalesced into pending cycle");
            true
        } else {
            self.trigger.notify_one();
            tracing::info!("Manual sync triggered");
            false
        };

        Ok(ManualSync {
            coalesced,
            target_cycle: current.cycles_completed + 1,
            receiver,
        })
    }
}
