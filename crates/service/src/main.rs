use anyhow::Result;

use fieldline_core::config::{AppConfig, LoadOptions};
use fieldline_service::{bootstrap_with_config, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap_with_config(config).await?;

    tracing::info!(
        event_name = "system.service.started",
        database_url = %app.config.database.url,
        "fieldline service started"
    );

    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.service.stopping", "fieldline service stopping");

    // Dropping the engine closes the notification queue; the dispatcher
    // drains what is left and exits.
    drop(app.engine);
    app.dispatcher.await?;
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
