//! Standalone Ping Receiver Service
//!
//! Listens for telemetry pings over HTTP, exports converted metrics and event
//! logs, and relays raw pings downstream when a forward URL is configured.
//! Configuration comes from the YAML file named by `PING_RECEIVER_CONFIG`,
//! or from `PING_RECEIVER_*` environment variables and defaults.

use anyhow::Context;
use ping_otlp_receiver::{ConfigLoader, PingReceiverService};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = ConfigLoader::discover().context("Failed to load configuration")?;

    let service = PingReceiverService::new(config)
        .await
        .context("Failed to create ping receiver service")?;
    service
        .start()
        .await
        .context("Failed to start ping receiver")?;

    if let Some(addr) = service.local_addr() {
        info!(
            address = %addr,
            path = %service.receiver().path(),
            "Ping receiver service started"
        );
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down...");
    if let Err(e) = service.shutdown().await {
        error!(error = %e, "Shutdown completed with errors");
        return Err(e.into());
    }

    Ok(())
}
