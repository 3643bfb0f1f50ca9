//! Ping conversion engine
//!
//! Maps a decoded [`Ping`] into metric records and event log records. The
//! conversion is pure: no I/O and no shared state, so it can run on any
//! request task.
//!
//! # Metric mapping
//!
//! | value | record |
//! |---|---|
//! | boolean | gauge, 1.0 or 0.0 |
//! | number | gauge, double |
//! | integral number in the `counter` category | monotonic cumulative sum, integer |
//! | string | tagged gauge, 1 with `value` attribute |
//! | list of strings | tagged gauge, one point per element with `value` and `index` |
//! | distribution | cumulative histogram |
//! | rate | gauge `<name>.rate` with `numerator` and `denominator` attributes |
//!
//! Any other shape produces no record. A distribution whose `values` is not
//! an object fails the whole conversion.

use chrono::{DateTime, TimeDelta, Utc};
use opentelemetry::KeyValue;
use std::collections::HashMap;
use tracing::debug;

use crate::error::ConversionError;
use crate::otlp::logs_data::{EventLogBatch, EventRecord};
use crate::otlp::metrics_data::{
    HistogramDataPoint, InstrumentationScope, METRIC_UNIT, MetricData, MetricKind, MetricRecord,
    MetricsBatch, NumberDataPoint, NumberValue,
};
use crate::ping::{Bucket, ClientInfo, DistributionValues, MetricValue, Ping, PingInfo, Rate};

/// Category whose integral numbers are reported as counters
pub const COUNTER_CATEGORY: &str = "counter";

/// Converts pings into metric and event log batches
#[derive(Debug, Clone, Default)]
pub struct PingConverter;

impl PingConverter {
    /// Create a new converter
    pub fn new() -> Self {
        Self
    }

    /// Convert the ping's metrics, observed now
    pub fn convert_metrics(&self, ping: &Ping) -> Result<MetricsBatch, ConversionError> {
        self.convert_metrics_at(ping, Utc::now())
    }

    /// Convert the ping's metrics with an explicit observation time
    ///
    /// Every data point in the batch carries `observed` as its timestamp.
    pub fn convert_metrics_at(
        &self,
        ping: &Ping,
        observed: DateTime<Utc>,
    ) -> Result<MetricsBatch, ConversionError> {
        let observed = unix_nanos(observed);
        let start = unix_nanos(ping.ping_info.start_time_utc());

        let mut metrics: Vec<MetricRecord> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (category, entries) in ping.metrics.iter().flatten() {
            for (name, value) in entries {
                let full_name = format!("{category}.{name}");
                let Some(record) = convert_value(category, full_name, value, start, observed)?
                else {
                    continue;
                };

                match positions.get(&record.name) {
                    Some(&position) => metrics[position] = record,
                    None => {
                        positions.insert(record.name.clone(), metrics.len());
                        metrics.push(record);
                    }
                }
            }
        }

        Ok(MetricsBatch {
            resource: resource_attributes(&ping.client_info, &ping.ping_info),
            scope: InstrumentationScope::default(),
            metrics,
        })
    }

    /// Convert the ping's events, preserving their order
    pub fn convert_events(&self, ping: &Ping) -> EventLogBatch {
        let start = ping.ping_info.start_time_utc();

        let records = ping
            .events()
            .iter()
            .map(|event| {
                let timestamp = TimeDelta::try_milliseconds(event.timestamp)
                    .and_then(|offset| start.checked_add_signed(offset))
                    .unwrap_or(start);

                let mut attributes = vec![
                    KeyValue::new("event.name", event.name.clone()),
                    KeyValue::new("event.domain", event.category.clone()),
                ];
                attributes.extend(
                    event
                        .extra
                        .iter()
                        .flatten()
                        .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
                );

                EventRecord {
                    time_unix_nano: unix_nanos(timestamp),
                    body: event.name.clone(),
                    attributes,
                }
            })
            .collect();

        EventLogBatch {
            resource: resource_attributes(&ping.client_info, &ping.ping_info),
            scope: InstrumentationScope::default(),
            records,
        }
    }
}

/// Project client and ping info into resource attributes
///
/// Empty strings and a zero session count are omitted. `ping.seq` and
/// `ping.type` are always present.
pub fn resource_attributes(client: &ClientInfo, ping: &PingInfo) -> Vec<KeyValue> {
    let mut attributes = Vec::new();

    let strings = [
        ("client.id", &client.client_id),
        ("session.id", &client.session_id),
    ];
    push_non_empty(&mut attributes, &strings);

    if client.session_count > 0 {
        attributes.push(KeyValue::new("session.count", client.session_count));
    }

    let strings = [
        ("service.version", &client.app_build),
        ("app.version", &client.app_display_version),
        ("app.channel", &client.app_channel),
        ("telemetry.sdk.version", &client.telemetry_sdk_build),
        ("host.arch", &client.architecture),
        ("device.manufacturer", &client.device_manufacturer),
        ("device.model.name", &client.device_model),
        ("os.type", &client.os),
        ("os.version", &client.os_version),
        ("host.locale", &client.locale),
    ];
    push_non_empty(&mut attributes, &strings);

    attributes.push(KeyValue::new("ping.seq", ping.seq));
    attributes.push(KeyValue::new("ping.type", ping.ping_type.clone()));
    if !ping.reason.is_empty() {
        attributes.push(KeyValue::new("ping.reason", ping.reason.clone()));
    }

    attributes
}

fn push_non_empty(attributes: &mut Vec<KeyValue>, pairs: &[(&'static str, &String)]) {
    for (key, value) in pairs {
        if !value.is_empty() {
            attributes.push(KeyValue::new(*key, (*value).clone()));
        }
    }
}

fn convert_value(
    category: &str,
    full_name: String,
    value: &MetricValue,
    start: u64,
    observed: u64,
) -> Result<Option<MetricRecord>, ConversionError> {
    let gauge_point = |attributes: Vec<KeyValue>, value: NumberValue| NumberDataPoint {
        attributes,
        start_time_unix_nano: None,
        time_unix_nano: observed,
        value,
    };

    let converted = match value {
        MetricValue::Bool(flag) => record(
            full_name,
            MetricKind::Gauge,
            MetricData::Gauge(vec![gauge_point(
                Vec::new(),
                NumberValue::AsDouble(if *flag { 1.0 } else { 0.0 }),
            )]),
        ),
        MetricValue::Number(number) => match as_count(category, *number) {
            Some(count) => record(
                full_name,
                MetricKind::Counter,
                MetricData::Sum(vec![NumberDataPoint {
                    attributes: Vec::new(),
                    start_time_unix_nano: Some(start),
                    time_unix_nano: observed,
                    value: NumberValue::AsInt(count),
                }]),
            ),
            None => record(
                full_name,
                MetricKind::Gauge,
                MetricData::Gauge(vec![gauge_point(
                    Vec::new(),
                    NumberValue::AsDouble(*number),
                )]),
            ),
        },
        MetricValue::Str(text) => record(
            full_name,
            MetricKind::GaugeTagged,
            MetricData::Gauge(vec![gauge_point(
                vec![KeyValue::new("value", text.clone())],
                NumberValue::AsInt(1),
            )]),
        ),
        MetricValue::StrList(items) if items.is_empty() => {
            debug!(metric = %full_name, "Skipping empty string list");
            return Ok(None);
        }
        MetricValue::StrList(items) => record(
            full_name,
            MetricKind::GaugeTagged,
            MetricData::Gauge(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        gauge_point(
                            vec![
                                KeyValue::new("value", item.clone()),
                                KeyValue::new("index", index as i64),
                            ],
                            NumberValue::AsInt(1),
                        )
                    })
                    .collect(),
            ),
        ),
        MetricValue::Distribution(distribution) => {
            let buckets = match &distribution.values {
                DistributionValues::Buckets(buckets) => buckets,
                DistributionValues::Malformed(found) => {
                    return Err(ConversionError::InvalidDistributionValues {
                        metric: full_name,
                        found: *found,
                    });
                }
            };
            let (explicit_bounds, bucket_counts) = sorted_buckets(buckets);
            record(
                full_name,
                MetricKind::Histogram,
                MetricData::Histogram(HistogramDataPoint {
                    start_time_unix_nano: Some(start),
                    time_unix_nano: observed,
                    count: bucket_counts.iter().copied().fold(0, u64::saturating_add),
                    sum: distribution.sum,
                    bucket_counts,
                    explicit_bounds,
                }),
            )
        }
        MetricValue::Rate(rate) => record(
            format!("{full_name}.rate"),
            MetricKind::Gauge,
            MetricData::Gauge(vec![gauge_point(
                vec![
                    KeyValue::new("numerator", rate.numerator as i64),
                    KeyValue::new("denominator", rate.denominator as i64),
                ],
                NumberValue::AsDouble(ratio(rate)),
            )]),
        ),
        MetricValue::Unrecognized => {
            debug!(metric = %full_name, "Skipping metric with unrecognized shape");
            return Ok(None);
        }
    };

    Ok(Some(converted))
}

fn record(name: String, kind: MetricKind, data: MetricData) -> MetricRecord {
    MetricRecord {
        name,
        kind,
        unit: METRIC_UNIT.to_string(),
        data,
    }
}

fn as_count(category: &str, number: f64) -> Option<i64> {
    let integral = number.is_finite()
        && number.fract() == 0.0
        && number >= i64::MIN as f64
        && number < i64::MAX as f64;
    (category == COUNTER_CATEGORY && integral).then_some(number as i64)
}

fn ratio(rate: &Rate) -> f64 {
    if rate.denominator == 0.0 {
        0.0
    } else {
        rate.numerator / rate.denominator
    }
}

/// Sort buckets by boundary, merging buckets that share one
fn sorted_buckets(buckets: &[Bucket]) -> (Vec<f64>, Vec<u64>) {
    let mut sorted = buckets.to_vec();
    sorted.sort_by(|a, b| a.boundary.total_cmp(&b.boundary));

    let mut bounds: Vec<f64> = Vec::with_capacity(sorted.len());
    let mut counts: Vec<u64> = Vec::with_capacity(sorted.len());
    for bucket in sorted {
        match (bounds.last(), counts.last_mut()) {
            (Some(&last), Some(count)) if last == bucket.boundary => {
                *count = count.saturating_add(bucket.count);
            }
            _ => {
                bounds.push(bucket.boundary);
                counts.push(bucket.count);
            }
        }
    }
    (bounds, counts)
}

fn unix_nanos(time: DateTime<Utc>) -> u64 {
    time.timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or(0)
}
