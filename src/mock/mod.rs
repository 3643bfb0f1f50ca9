//! Mock sinks and collector for testing
//!
//! `MockSink` captures converted batches in memory; `MockOtlpCollector` is a
//! gRPC OTLP endpoint for exercising the gRPC exporter end to end.

pub mod service;
pub mod sink;

pub use service::MockOtlpCollector;
pub use sink::MockSink;
