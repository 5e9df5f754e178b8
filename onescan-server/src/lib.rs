//! OneScan Server - warehouse scan tracking
//!
//! # Overview
//!
//! Every parcel carries a tracker code that is scanned through three stages:
//! label, packing and dispatch. The server records each scan against a
//! per-tracker stage ledger, answers statistics queries and mirrors the
//! tracker table into a Google Sheets worksheet on a timer.
//!
//! # Module layout
//!
//! ```text
//! onescan-server/src/
//! ├── core/          # config, state, server lifecycle, background tasks
//! ├── tracking/      # stage ledger, scan recorder, redb store, aggregation
//! ├── sync/          # spreadsheet rows, sheet sink, scheduler, checkpoint
//! ├── api/           # axum routes and handlers
//! └── utils/         # logger, error re-exports
//! ```

pub mod api;
pub mod core;
pub mod sync;
pub mod tracking;
pub mod utils;

pub use core::{Config, Server, ServerState};
pub use sync::{SyncHandle, SyncScheduler};
pub use tracking::TrackerService;
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

pub use utils::logger::init_logger_with_file;

/// Load `.env`, read the configuration and install the logger
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    init_logger_with_file(
        &config.log_level,
        config.log_json,
        config.log_dir.as_deref(),
    )?;
    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
   ____             ____
  / __ \____  ___  / ___/_________ _____
 / / / / __ \/ _ \ \__ \/ ___/ __ `/ __ \
/ /_/ / / / /  __/___/ / /__/ /_/ / / / /
\____/_/ /_/\___//____/\___/\__,_/_/ /_/
    "#
    );
}
