//! Core: configuration, shared state, HTTP server and background tasks
//!
//! - [`Config`] - environment-driven configuration
//! - [`ServerState`] - services shared by handlers
//! - [`Server`] - HTTP server lifecycle
//! - [`BackgroundTasks`] - background task registry

pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{Config, ConfigError};
pub use error::{Result, ServerError};
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
