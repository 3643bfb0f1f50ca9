//! Mock OTLP collector for testing
//!
//! Runs a gRPC server implementing the OTLP metrics and logs services and
//! records every export request it receives.

use opentelemetry_proto::tonic::collector::logs::v1::{
    ExportLogsServiceRequest, ExportLogsServiceResponse,
    logs_service_server::{LogsService, LogsServiceServer},
};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
    metrics_service_server::{MetricsService, MetricsServiceServer},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{error, info};

/// Mock collector state
#[derive(Debug, Default)]
struct MockCollectorState {
    /// Metrics export requests received
    received_metrics: Vec<ExportMetricsServiceRequest>,
    /// Logs export requests received
    received_logs: Vec<ExportLogsServiceRequest>,
    /// Count of gRPC calls received
    grpc_calls: u64,
}

/// Mock OTLP collector for testing
#[derive(Debug, Clone, Default)]
pub struct MockOtlpCollector {
    state: Arc<RwLock<MockCollectorState>>,
    shutdown: CancellationToken,
}

impl MockOtlpCollector {
    /// Create a new mock collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the gRPC server on an ephemeral local port
    ///
    /// Returns the endpoint URL to configure an exporter with.
    pub async fn start(&self) -> Result<String, String> {
        let addr = "127.0.0.1:0"
            .parse::<SocketAddr>()
            .map_err(|e| format!("Failed to parse collector address: {}", e))?;
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind collector listener: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| format!("Failed to get collector local address: {}", e))?;

        let metrics_service = MockMetricsServiceImpl {
            state: Arc::clone(&self.state),
        };
        let logs_service = MockLogsServiceImpl {
            state: Arc::clone(&self.state),
        };
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let server = tonic::transport::Server::builder()
                .add_service(MetricsServiceServer::new(metrics_service))
                .add_service(LogsServiceServer::new(logs_service))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    shutdown.cancelled().await
                })
                .await;

            if let Err(e) = server {
                error!(error = %e, "Mock collector server error");
            }
        });

        info!(address = %addr, "Mock OTLP collector started");
        Ok(format!("http://{}", addr))
    }

    /// Stop the gRPC server
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Metrics export requests received so far
    pub async fn received_metrics(&self) -> Vec<ExportMetricsServiceRequest> {
        self.state.read().await.received_metrics.clone()
    }

    /// Logs export requests received so far
    pub async fn received_logs(&self) -> Vec<ExportLogsServiceRequest> {
        self.state.read().await.received_logs.clone()
    }

    /// Assert that the expected number of metrics requests were received
    pub async fn assert_metrics_received(&self, expected_count: usize) -> Result<(), String> {
        let state = self.state.read().await;
        if state.received_metrics.len() != expected_count {
            Err(format!(
                "Expected {} metrics requests, but received {}",
                expected_count,
                state.received_metrics.len()
            ))
        } else {
            Ok(())
        }
    }

    /// Assert that the expected number of logs requests were received
    pub async fn assert_logs_received(&self, expected_count: usize) -> Result<(), String> {
        let state = self.state.read().await;
        if state.received_logs.len() != expected_count {
            Err(format!(
                "Expected {} logs requests, but received {}",
                expected_count,
                state.received_logs.len()
            ))
        } else {
            Ok(())
        }
    }

    /// Get the number of gRPC calls received
    pub async fn grpc_calls_count(&self) -> u64 {
        self.state.read().await.grpc_calls
    }

    /// Reset the collector state
    pub async fn reset(&self) {
        *self.state.write().await = MockCollectorState::default();
    }
}

#[derive(Debug, Clone)]
struct MockMetricsServiceImpl {
    state: Arc<RwLock<MockCollectorState>>,
}

#[tonic::async_trait]
impl MetricsService for MockMetricsServiceImpl {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        let mut state = self.state.write().await;
        state.received_metrics.push(request.into_inner());
        state.grpc_calls += 1;

        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

#[derive(Debug, Clone)]
struct MockLogsServiceImpl {
    state: Arc<RwLock<MockCollectorState>>,
}

#[tonic::async_trait]
impl LogsService for MockLogsServiceImpl {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let mut state = self.state.write().await;
        state.received_logs.push(request.into_inner());
        state.grpc_calls += 1;

        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}
