//! Logging Infrastructure
//!
//! Console output (plain or JSON) plus an optional daily rotating file under
//! `LOG_DIR`. `RUST_LOG` overrides the configured level.

use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const LOG_FILE_PREFIX: &str = "onescan-server";

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Default filter (e.g. "info", "onescan_server=debug")
/// * `json_format` - JSON lines instead of human-readable output
/// * `log_dir` - Optional directory for `onescan-server.YYYY-MM-DD` files
///
/// Fails if a global subscriber is already installed.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console: BoxedLayer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };
    layers.push(console);

    if let Some(dir) = log_dir {
        let dir = Path::new(dir);
        fs::create_dir_all(dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
        let file: BoxedLayer = if json_format {
            fmt::layer().json().with_writer(appender).boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_writer(appender)
                .boxed()
        };
        layers.push(file);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}
