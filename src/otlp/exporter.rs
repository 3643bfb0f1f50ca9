//! Metric and log sinks
//!
//! The receiver hands converted batches to a [`MetricsSink`] and a
//! [`LogsSink`]. This module ships three implementations: OTLP over
//! HTTP/protobuf, OTLP over gRPC, and a sink that only logs what it receives.

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::logs::v1::logs_service_client::LogsServiceClient;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use prost::Message;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use crate::config::{Config, ExporterConfig, ExporterProtocol};
use crate::error::{ConfigError, ConsumeError};
use crate::otlp::logs_data::EventLogBatch;
use crate::otlp::metrics_data::MetricsBatch;

/// Receives metric batches converted from pings
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Consume one batch; an error fails the originating request
    async fn consume_metrics(&self, batch: MetricsBatch) -> Result<(), ConsumeError>;
}

/// Receives event log batches converted from pings
#[async_trait]
pub trait LogsSink: Send + Sync {
    /// Consume one batch; an error fails the originating request
    async fn consume_logs(&self, batch: EventLogBatch) -> Result<(), ConsumeError>;
}

/// Sinks built from configuration, one per enabled pipeline
#[derive(Clone, Default)]
pub struct Sinks {
    /// Metrics pipeline sink
    pub metrics: Option<Arc<dyn MetricsSink>>,
    /// Logs pipeline sink
    pub logs: Option<Arc<dyn LogsSink>>,
}

impl std::fmt::Debug for Sinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("metrics", &self.metrics.is_some())
            .field("logs", &self.logs.is_some())
            .finish()
    }
}

/// Build the configured exporter and attach it to each enabled pipeline
///
/// The gRPC exporter creates a lazy channel and must be built inside a Tokio
/// runtime.
pub fn build_sinks(config: &Config) -> Result<Sinks, ConfigError> {
    fn attach<T>(exporter: Arc<T>, config: &Config) -> Sinks
    where
        T: MetricsSink + LogsSink + 'static,
    {
        Sinks {
            metrics: config
                .pipelines
                .metrics
                .then(|| Arc::clone(&exporter) as Arc<dyn MetricsSink>),
            logs: config
                .pipelines
                .logs
                .then(|| exporter as Arc<dyn LogsSink>),
        }
    }

    info!(
        protocol = ?config.exporter.protocol,
        endpoint = config.exporter.endpoint.as_deref().unwrap_or("none"),
        metrics = config.pipelines.metrics,
        logs = config.pipelines.logs,
        "Building sinks"
    );

    let sinks = match config.exporter.protocol {
        ExporterProtocol::Logging => attach(Arc::new(LoggingSink::new()), config),
        ExporterProtocol::HttpProtobuf => {
            attach(Arc::new(OtlpHttpExporter::new(&config.exporter)?), config)
        }
        ExporterProtocol::Grpc => attach(Arc::new(OtlpGrpcExporter::new(&config.exporter)?), config),
    };
    Ok(sinks)
}

/// Sink that logs batch summaries instead of exporting them
#[derive(Debug, Clone, Default)]
pub struct LoggingSink;

impl LoggingSink {
    /// Create a new logging sink
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsSink for LoggingSink {
    async fn consume_metrics(&self, batch: MetricsBatch) -> Result<(), ConsumeError> {
        info!(
            metric_count = batch.len(),
            resource_attributes = batch.resource.len(),
            "Received metrics batch"
        );
        for metric in &batch.metrics {
            debug!(name = %metric.name, kind = ?metric.kind, "Metric");
        }
        Ok(())
    }
}

#[async_trait]
impl LogsSink for LoggingSink {
    async fn consume_logs(&self, batch: EventLogBatch) -> Result<(), ConsumeError> {
        info!(
            event_count = batch.len(),
            resource_attributes = batch.resource.len(),
            "Received event log batch"
        );
        for record in &batch.records {
            debug!(event = %record.body, time_unix_nano = record.time_unix_nano, "Event");
        }
        Ok(())
    }
}

/// OTLP exporter over HTTP with protobuf bodies
#[derive(Debug, Clone)]
pub struct OtlpHttpExporter {
    client: reqwest::Client,
    endpoint: String,
}

impl OtlpHttpExporter {
    /// Create an exporter posting to `{endpoint}/v1/metrics` and `{endpoint}/v1/logs`
    pub fn new(config: &ExporterConfig) -> Result<Self, ConfigError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequiredField("exporter.endpoint".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                ConfigError::ValidationFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        info!(endpoint = %endpoint, "Created OTLP/HTTP exporter");

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn send_protobuf<M: Message>(&self, path: &str, request: M) -> Result<(), ConsumeError> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-protobuf")
            .body(request.encode_to_vec())
            .send()
            .await
            .map_err(|e| ConsumeError::Export(format!("Failed to send to {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConsumeError::Export(format!(
                "Remote endpoint {} returned error: {}",
                url, status
            )));
        }

        debug!(url = %url, status = status.as_u16(), "Exported batch via OTLP/HTTP");
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for OtlpHttpExporter {
    async fn consume_metrics(&self, batch: MetricsBatch) -> Result<(), ConsumeError> {
        self.send_protobuf("/v1/metrics", batch.to_protobuf()).await
    }
}

#[async_trait]
impl LogsSink for OtlpHttpExporter {
    async fn consume_logs(&self, batch: EventLogBatch) -> Result<(), ConsumeError> {
        self.send_protobuf("/v1/logs", batch.to_protobuf()).await
    }
}

/// OTLP exporter over gRPC
#[derive(Debug, Clone)]
pub struct OtlpGrpcExporter {
    metrics: MetricsServiceClient<Channel>,
    logs: LogsServiceClient<Channel>,
}

impl OtlpGrpcExporter {
    /// Create an exporter with a lazily connected channel
    pub fn new(config: &ExporterConfig) -> Result<Self, ConfigError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ConfigError::MissingRequiredField("exporter.endpoint".to_string()))?;

        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", endpoint, e)))?
            .timeout(config.timeout())
            .connect_lazy();

        info!(endpoint = %endpoint, "Created OTLP/gRPC exporter");

        Ok(Self {
            metrics: MetricsServiceClient::new(channel.clone()),
            logs: LogsServiceClient::new(channel),
        })
    }
}

#[async_trait]
impl MetricsSink for OtlpGrpcExporter {
    async fn consume_metrics(&self, batch: MetricsBatch) -> Result<(), ConsumeError> {
        let response = self
            .metrics
            .clone()
            .export(batch.to_protobuf())
            .await
            .map_err(|status| ConsumeError::Export(status.to_string()))?;

        if let Some(partial) = response
            .into_inner()
            .partial_success
            .filter(|p| p.rejected_data_points > 0)
        {
            warn!(
                rejected = partial.rejected_data_points,
                message = %partial.error_message,
                "Collector rejected some data points"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl LogsSink for OtlpGrpcExporter {
    async fn consume_logs(&self, batch: EventLogBatch) -> Result<(), ConsumeError> {
        let response = self
            .logs
            .clone()
            .export(batch.to_protobuf())
            .await
            .map_err(|status| ConsumeError::Export(status.to_string()))?;

        if let Some(partial) = response
            .into_inner()
            .partial_success
            .filter(|p| p.rejected_log_records > 0)
        {
            warn!(
                rejected = partial.rejected_log_records,
                message = %partial.error_message,
                "Collector rejected some log records"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    #[test]
    fn test_logging_sinks_follow_pipelines() {
        let config = ConfigBuilder::new().pipelines(true, false).build().unwrap();
        let sinks = build_sinks(&config).unwrap();
        assert!(sinks.metrics.is_some());
        assert!(sinks.logs.is_none());
    }

    #[test]
    fn test_http_exporter_requires_endpoint() {
        let config = ExporterConfig {
            protocol: ExporterProtocol::HttpProtobuf,
            endpoint: None,
            ..Default::default()
        };
        assert!(matches!(
            OtlpHttpExporter::new(&config),
            Err(ConfigError::MissingRequiredField(_))
        ));
    }
}
