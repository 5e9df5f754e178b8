use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result};
use crate::sync::{SyncHandle, SyncScheduler};
use crate::tracking::TrackerService;

/// Shared services handed to every request handler
///
/// Cheap to clone; everything heavy sits behind an `Arc`.
///
/// | Field | Description |
/// |-------|-------------|
/// | config | immutable configuration |
/// | trackers | tracker ledger, scans and statistics |
/// | sync | status and manual trigger of the spreadsheet sync |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub trackers: Arc<TrackerService>,
    pub sync: SyncHandle,
    /// Taken once by [`ServerState::start_background_tasks`]
    scheduler: Arc<Mutex<Option<SyncScheduler>>>,
    started_at: Instant,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("sync_enabled", &self.sync.is_enabled())
            .finish()
    }
}

impl ServerState {
    /// Assemble state from already-built services
    pub fn new(config: Config, trackers: Arc<TrackerService>, scheduler: Option<SyncScheduler>) -> Self {
        let sync = scheduler
            .as_ref()
            .map(SyncScheduler::handle)
            .unwrap_or_else(SyncHandle::disabled);
        Self {
            config,
            trackers,
            sync,
            scheduler: Arc::new(Mutex::new(scheduler)),
            started_at: Instant::now(),
        }
    }

    /// Open the database under `work_dir` and build the sync scheduler
    ///
    /// Fails on a bad work directory, an unreadable database, or sync
    /// credentials that are configured but missing or malformed.
    pub async fn initialize(config: &Config) -> Result<Self> {
        let work_dir = Path::new(&config.work_dir);
        std::fs::create_dir_all(work_dir)?;

        let trackers = Arc::new(TrackerService::open(work_dir)?);
        let scheduler = SyncScheduler::from_config(config, trackers.clone())?;

        tracing::info!(
            work_dir = %work_dir.display(),
            sync_enabled = scheduler.is_some(),
            "Server state initialized"
        );
        Ok(Self::new(config.clone(), trackers, scheduler))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Spawn the background tasks; the scheduler is started at most once
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let trackers = self.trackers.clone();
        tasks.spawn("store_warmup", TaskKind::Warmup, async move {
            match trackers.dashboard_stats().await {
                Ok(stats) => tracing::info!(
                    trackers = stats.total_trackers,
                    completed = stats.completed,
                    cancelled = stats.cancelled,
                    "Tracking store ready"
                ),
                Err(e) => tracing::warn!(error = %e, "Tracking store warmup failed"),
            }
        });

        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            let shutdown = tasks.shutdown_token();
            tasks.spawn("sync_scheduler", TaskKind::Periodic, scheduler.run(shutdown));
        }

        tasks.log_summary();
        tasks
    }
}
