use anyhow::{Context, Result};
use connector_runner::registry::build_connectors;
use connector_runner::{HttpSink, RunnerConfig, SyncManager};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connector_runner=info,graphline=info".into()),
        )
        .init();

    info!("Connector runner starting...");

    let config_path =
        std::env::var("GRAPHLINE_CONFIG").unwrap_or_else(|_| "graphline.toml".to_string());
    let config = RunnerConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    info!(
        config = %config_path,
        destination = %config.destination.url,
        checkpoint = %config.sync.checkpoint.path.display(),
        mode = ?config.sync.reader.mode,
        "Configuration loaded"
    );

    let sink = HttpSink::new(
        config.destination.url.clone(),
        config.destination.api_key.clone(),
        Duration::from_secs(config.destination.timeout_secs),
    )?;

    let connectors = build_connectors(&config);
    let mut manager = SyncManager::new(connectors, config.sync.clone(), Arc::new(sink));
    let started = manager.start().await?;
    info!(schedulers_started = started, "Sync manager started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    manager.shutdown().await;
    info!("Connector runner stopped");

    Ok(())
}
