//! OpenTelemetry Protocol (OTLP) module
//!
//! Converts pings into metric and event log batches, encodes them as OTLP
//! protobuf requests, and exports them through pluggable sinks.

pub mod converter;
pub mod exporter;
pub mod logs_data;
pub mod metrics_converter;
pub mod metrics_data;

pub use converter::PingConverter;
pub use exporter::{
    LoggingSink, LogsSink, MetricsSink, OtlpGrpcExporter, OtlpHttpExporter, Sinks, build_sinks,
};
pub use logs_data::{EventLogBatch, EventRecord};
pub use metrics_data::{MetricKind, MetricRecord, MetricsBatch};
