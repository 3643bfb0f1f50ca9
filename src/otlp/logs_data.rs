//! Event log records produced from a ping

use opentelemetry::KeyValue;

use crate::otlp::metrics_data::InstrumentationScope;

/// Event records derived from one ping, in submission order
#[derive(Debug, Clone, Default)]
pub struct EventLogBatch {
    /// Resource attributes projected from client and ping info
    pub resource: Vec<KeyValue>,
    /// Instrumentation scope
    pub scope: InstrumentationScope,
    /// Records in event order
    pub records: Vec<EventRecord>,
}

impl EventLogBatch {
    /// Whether the batch carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// One event as a log record
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Event time, nanoseconds since Unix epoch
    pub time_unix_nano: u64,
    /// Body, the event name
    pub body: String,
    /// `event.name`, `event.domain`, then the event extras
    pub attributes: Vec<KeyValue>,
}

impl EventRecord {
    /// Look up a string attribute
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.as_str().into_owned())
    }
}
