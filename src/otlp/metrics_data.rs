//! Metric record structures produced from a ping
//!
//! A [`MetricsBatch`] holds the resource attributes projected from the ping,
//! the instrumentation scope and one [`MetricRecord`] per metric full name.
//! Batches convert to OTLP protobuf requests in `metrics_converter`.

use opentelemetry::KeyValue;

/// Instrumentation scope name for every record derived from a ping
pub const SCOPE_NAME: &str = "glean";

/// Unit carried by every metric record
pub const METRIC_UNIT: &str = "1";

/// Metric records derived from one ping
#[derive(Debug, Clone, Default)]
pub struct MetricsBatch {
    /// Resource attributes projected from client and ping info
    pub resource: Vec<KeyValue>,
    /// Instrumentation scope
    pub scope: InstrumentationScope,
    /// Records in deterministic category/name order
    pub metrics: Vec<MetricRecord>,
}

impl MetricsBatch {
    /// Find a record by full name
    pub fn get(&self, name: &str) -> Option<&MetricRecord> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Whether the batch carries no records
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Look up a resource attribute
    pub fn resource_attribute(&self, key: &str) -> Option<&opentelemetry::Value> {
        self.resource
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }
}

/// Instrumentation scope of a batch
#[derive(Debug, Clone)]
pub struct InstrumentationScope {
    /// Scope name
    pub name: String,
    /// Scope version
    pub version: Option<String>,
}

impl Default for InstrumentationScope {
    fn default() -> Self {
        Self {
            name: SCOPE_NAME.to_string(),
            version: None,
        }
    }
}

/// Kind of a metric record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Plain gauge
    Gauge,
    /// Monotonic cumulative sum
    Counter,
    /// Explicit-bucket histogram
    Histogram,
    /// Gauge whose points are distinguished by attributes
    GaugeTagged,
}

/// One metric derived from a ping
#[derive(Debug, Clone)]
pub struct MetricRecord {
    /// Dotted full name, `category.name`
    pub name: String,
    /// Record kind
    pub kind: MetricKind,
    /// Unit
    pub unit: String,
    /// Data points
    pub data: MetricData,
}

impl MetricRecord {
    /// Number data points of a gauge or counter record
    pub fn number_points(&self) -> &[NumberDataPoint] {
        match &self.data {
            MetricData::Gauge(points) | MetricData::Sum(points) => points,
            MetricData::Histogram(_) => &[],
        }
    }

    /// The single histogram point of a histogram record
    pub fn histogram_point(&self) -> Option<&HistogramDataPoint> {
        match &self.data {
            MetricData::Histogram(point) => Some(point),
            _ => None,
        }
    }
}

/// Data carried by a record
#[derive(Debug, Clone)]
pub enum MetricData {
    /// Gauge points
    Gauge(Vec<NumberDataPoint>),
    /// Monotonic cumulative sum points
    Sum(Vec<NumberDataPoint>),
    /// Cumulative histogram
    Histogram(HistogramDataPoint),
}

/// A gauge or sum data point
#[derive(Debug, Clone)]
pub struct NumberDataPoint {
    /// Point attributes
    pub attributes: Vec<KeyValue>,
    /// Start of the cumulative window, nanoseconds since Unix epoch
    pub start_time_unix_nano: Option<u64>,
    /// Observation time, nanoseconds since Unix epoch
    pub time_unix_nano: u64,
    /// Value
    pub value: NumberValue,
}

impl NumberDataPoint {
    /// Look up a point attribute
    pub fn attribute(&self, key: &str) -> Option<&opentelemetry::Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }
}

/// Integer or double point value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    /// Integer value
    AsInt(i64),
    /// Double value
    AsDouble(f64),
}

impl NumberValue {
    /// Value widened to f64
    pub fn as_f64(&self) -> f64 {
        match *self {
            NumberValue::AsInt(i) => i as f64,
            NumberValue::AsDouble(d) => d,
        }
    }
}

/// A histogram data point
///
/// `explicit_bounds` is strictly ascending and `count` equals the sum of
/// `bucket_counts`, saturating at `u64::MAX`.
///
/// There is one count per boundary and no trailing overflow bucket, so
/// `bucket_counts.len() == explicit_bounds.len()` rather than the usual OTLP
/// `explicit_bounds.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramDataPoint {
    /// Start of the cumulative window, nanoseconds since Unix epoch
    pub start_time_unix_nano: Option<u64>,
    /// Observation time, nanoseconds since Unix epoch
    pub time_unix_nano: u64,
    /// Total samples
    pub count: u64,
    /// Sum of samples as reported
    pub sum: f64,
    /// Samples per bucket, aligned with `explicit_bounds`
    pub bucket_counts: Vec<u64>,
    /// Bucket boundaries
    pub explicit_bounds: Vec<f64>,
}
