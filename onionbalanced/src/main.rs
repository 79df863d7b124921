use std::sync::Arc;
use anyhow::{Context, Result};
use onionbalanced::config::Config;
use onionbalanced::registry::ServiceRegistry;
use onionbalanced::status::StatusSocket;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("onionbalanced=info"))
        )
        .init();

    tracing::info!("Starting onionbalanced");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/onionbalance/onionbalanced.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Services are updated by the balancing logic; the status socket only reads them
    let registry = ServiceRegistry::from_config(&config.services);
    tracing::info!("Managing {} services", registry.service_count());

    let mut status_socket = StatusSocket::start(&config.status, Arc::new(registry))
        .context("Failed to start status socket")?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    status_socket.close().await;
    tracing::info!("Status socket at {} released", status_socket.socket_path().display());

    tracing::info!("Shutdown complete");
    Ok(())
}
