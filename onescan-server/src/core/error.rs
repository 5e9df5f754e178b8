use thiserror::Error;

use super::config::ConfigError;
use crate::tracking::StorageError;

/// Startup and serve errors
///
/// Request-level failures use [`shared::AppError`] instead.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
