//! Public API for running the receiver as a service
//!
//! Builds the configured sinks, registers one pipeline per enabled signal
//! with a [`ReceiverRegistry`] and drives the shared receiver's lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ConfigBuilder};
use crate::error::{PingReceiverError, ServerError};
use crate::otlp::exporter::{Sinks, build_sinks};
use crate::receiver::{PingReceiver, ReceiverRegistry};

/// Ping receiver service
///
/// Owns the registry and the receiver created for the configured identity.
/// Cloning shares the same receiver.
///
/// # Example
///
/// ```no_run
/// use ping_otlp_receiver::{Config, PingReceiverService};
///
/// # async fn example() -> Result<(), ping_otlp_receiver::PingReceiverError> {
/// let service = PingReceiverService::new(Config::default()).await?;
/// service.start().await?;
///
/// // ... serve until shutdown is requested
///
/// service.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PingReceiverService {
    config: Config,
    registry: Arc<ReceiverRegistry>,
    receiver: Arc<PingReceiver>,
}

impl PingReceiverService {
    /// Create a service with sinks built from the exporter configuration
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn new(config: Config) -> Result<Self, PingReceiverError> {
        config.validate()?;
        let sinks = build_sinks(&config)?;
        Self::with_sinks(config, sinks)
    }

    /// Create a service with caller-supplied sinks
    ///
    /// Each present sink registers its own pipeline; both resolve to the same
    /// receiver because they share the configured identity.
    pub fn with_sinks(config: Config, sinks: Sinks) -> Result<Self, PingReceiverError> {
        config.validate()?;
        let registry = Arc::new(ReceiverRegistry::new());

        let mut receiver = None;
        if let Some(metrics) = sinks.metrics {
            receiver = Some(registry.get_or_create(
                &config.id,
                &config.receiver,
                Some(metrics),
                None,
            )?);
        }
        if let Some(logs) = sinks.logs {
            receiver = Some(registry.get_or_create(
                &config.id,
                &config.receiver,
                None,
                Some(logs),
            )?);
        }

        let receiver = receiver.ok_or_else(|| {
            ServerError::CreateError("no metrics or logs sink configured".to_string())
        })?;

        info!(
            id = %config.id,
            endpoint = %config.receiver.endpoint,
            path = %receiver.path(),
            "Ping receiver service created"
        );

        Ok(Self {
            config,
            registry,
            receiver,
        })
    }

    /// Create a configuration builder
    pub fn with_config_builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Start listening
    pub async fn start(&self) -> Result<(), PingReceiverError> {
        self.receiver.start().await?;
        Ok(())
    }

    /// Shut down every receiver owned by the service
    pub async fn shutdown(&self) -> Result<(), PingReceiverError> {
        info!("Shutting down ping receiver service");
        self.registry.shutdown_all().await.map_err(|e| {
            warn!(error = %e, "Receiver shutdown failed");
            PingReceiverError::from(e)
        })
    }

    /// Bound listener address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.local_addr()
    }

    /// The shared receiver
    pub fn receiver(&self) -> &Arc<PingReceiver> {
        &self.receiver
    }

    /// The registry owning the receiver
    pub fn registry(&self) -> &Arc<ReceiverRegistry> {
        &self.registry
    }

    /// Service configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
