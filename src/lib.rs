//! Telemetry Ping Receiver
//!
//! Receives telemetry pings over HTTP, converts their metrics and events to
//! OTLP metrics and event logs, and optionally relays the raw payload to a
//! secondary HTTP endpoint.
//!
//! # Features
//!
//! - Typed ping model with metric values classified once at decode time
//! - Deterministic conversion to gauges, counters, histograms and rate gauges
//! - Shared HTTP listener for the metrics and logs pipelines
//! - Best-effort forwarding with a bounded queue and concurrency limit
//! - OTLP export over HTTP/protobuf or gRPC
//! - Configurable via YAML, environment variables, or programmatic API
//! - Mock sink and collector for testing
//!
//! # Example
//!
//! ```no_run
//! use ping_otlp_receiver::{ConfigBuilder, PingReceiverService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigBuilder::new()
//!     .endpoint("0.0.0.0:9888")
//!     .forward_url("https://ingestion.example.com/submit")
//!     .build()?;
//! let service = PingReceiverService::new(config).await?;
//! service.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod mock;
pub mod otlp;
pub mod ping;
pub mod receiver;

// Re-export public API
pub use api::public::PingReceiverService;
pub use config::{
    Config, ConfigBuilder, ConfigLoader, ExporterConfig, ExporterProtocol, PipelinesConfig,
    ReceiverConfig,
};
pub use error::{
    ConfigError, ConsumeError, ConversionError, ForwardError, ParseError, PingReceiverError,
    ServerError,
};
pub use mock::{MockOtlpCollector, MockSink};
pub use otlp::{EventLogBatch, LogsSink, MetricsBatch, MetricsSink, PingConverter};
pub use ping::{MetricValue, Ping};
pub use receiver::{PingReceiver, ReceiverRegistry, ReceiverState};

// Initialize tracing subscriber for structured logging
use tracing_subscriber::EnvFilter;

/// Initialize structured logging
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
