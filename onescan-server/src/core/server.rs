//! HTTP server lifecycle

use std::net::SocketAddr;

use crate::api::build_app;
use crate::core::{Config, Result, ServerState};

pub struct Server {
    config: Config,
    state: ServerState,
}

impl Server {
    /// Create a server around an already initialized state
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self { config, state }
    }

    /// Serve until Ctrl-C, then stop the background tasks
    pub async fn run(&self) -> Result<()> {
        let state = self.state.clone();
        let tasks = state.start_background_tasks();
        let app = build_app(&state).with_state(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "OneScan server listening");

        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        };

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        tasks.shutdown().await;
        served?;
        Ok(())
    }
}
