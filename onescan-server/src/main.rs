use onescan_server::{Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. dotenv, config, logger
    let config = setup_environment()?;

    print_banner();

    tracing::info!(
        port = config.http_port,
        environment = %config.environment,
        "OneScan server starting..."
    );

    // 2. Open the store and build the sync scheduler
    let state = ServerState::initialize(&config).await?;

    // 3. Serve; background tasks are started by Server::run
    let server = Server::with_state(config, state);

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }

    Ok(())
}
