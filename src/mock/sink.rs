//! In-memory sink for testing
//!
//! Captures every batch handed to it and can be switched to reject metrics or
//! logs to exercise failure paths.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ConsumeError;
use crate::otlp::exporter::{LogsSink, MetricsSink};
use crate::otlp::logs_data::EventLogBatch;
use crate::otlp::metrics_data::MetricsBatch;

/// Mock sink state
#[derive(Debug, Default)]
struct MockSinkState {
    /// Metric batches received
    metrics: Vec<MetricsBatch>,
    /// Event log batches received
    logs: Vec<EventLogBatch>,
    /// Reject metric batches
    reject_metrics: bool,
    /// Reject event log batches
    reject_logs: bool,
    /// Count of consume calls, accepted or not
    calls: u64,
}

/// Mock sink implementing both sink traits
///
/// Clones share state, so a test can keep one handle and give another to a
/// receiver.
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    state: Arc<Mutex<MockSinkState>>,
}

impl MockSink {
    /// Create a new mock sink that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject metric batches from now on
    pub fn reject_metrics(&self, reject: bool) {
        self.lock().reject_metrics = reject;
    }

    /// Reject event log batches from now on
    pub fn reject_logs(&self, reject: bool) {
        self.lock().reject_logs = reject;
    }

    /// Metric batches received so far
    pub fn metrics_batches(&self) -> Vec<MetricsBatch> {
        self.lock().metrics.clone()
    }

    /// Event log batches received so far
    pub fn log_batches(&self) -> Vec<EventLogBatch> {
        self.lock().logs.clone()
    }

    /// Number of consume calls, including rejected ones
    pub fn calls(&self) -> u64 {
        self.lock().calls
    }

    /// Assert the number of metric batches received
    pub fn assert_metrics_received(&self, expected: usize) -> Result<(), String> {
        let count = self.lock().metrics.len();
        if count == expected {
            Ok(())
        } else {
            Err(format!(
                "Expected {} metric batches, but received {}",
                expected, count
            ))
        }
    }

    /// Assert the number of event log batches received
    pub fn assert_logs_received(&self, expected: usize) -> Result<(), String> {
        let count = self.lock().logs.len();
        if count == expected {
            Ok(())
        } else {
            Err(format!(
                "Expected {} event log batches, but received {}",
                expected, count
            ))
        }
    }

    /// Clear captured batches and reject flags
    pub fn reset(&self) {
        *self.lock() = MockSinkState::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockSinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetricsSink for MockSink {
    async fn consume_metrics(&self, batch: MetricsBatch) -> Result<(), ConsumeError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.reject_metrics {
            return Err(ConsumeError::Rejected("mock sink rejects metrics".to_string()));
        }
        state.metrics.push(batch);
        Ok(())
    }
}

#[async_trait]
impl LogsSink for MockSink {
    async fn consume_logs(&self, batch: EventLogBatch) -> Result<(), ConsumeError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.reject_logs {
            return Err(ConsumeError::Rejected("mock sink rejects logs".to_string()));
        }
        state.logs.push(batch);
        Ok(())
    }
}
