//! Typed representation of an inbound telemetry ping
//!
//! Metric values arrive weakly typed. They are classified once, at decode
//! time, into the closed [`MetricValue`] sum type so conversion can match on
//! it exhaustively.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ParseError;

/// Metric categories keyed by category name, then metric name
pub type MetricCategories = BTreeMap<String, BTreeMap<String, MetricValue>>;

/// One telemetry submission
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ping {
    /// Client device and application metadata
    #[serde(default, deserialize_with = "null_as_default")]
    pub client_info: ClientInfo,

    /// Submission metadata
    #[serde(default, deserialize_with = "null_as_default")]
    pub ping_info: PingInfo,

    /// Metric values by category and name
    #[serde(default, deserialize_with = "deserialize_metrics")]
    pub metrics: Option<MetricCategories>,

    /// Discrete events in submission order
    #[serde(default)]
    pub events: Option<Vec<Event>>,
}

impl Ping {
    /// Decode a ping from a raw JSON body
    pub fn from_slice(body: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Whether the ping carries at least one metric category
    pub fn has_metrics(&self) -> bool {
        self.metrics.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Events carried by the ping, empty when absent
    pub fn events(&self) -> &[Event] {
        self.events.as_deref().unwrap_or_default()
    }
}

/// Information about the client device and application
///
/// Missing and `null` fields decode as empty or zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct ClientInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub client_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub session_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub app_build: String,
    #[serde(deserialize_with = "null_as_default")]
    pub app_display_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub app_channel: String,
    #[serde(deserialize_with = "null_as_default")]
    pub telemetry_sdk_build: String,
    #[serde(deserialize_with = "null_as_default")]
    pub architecture: String,
    #[serde(deserialize_with = "null_as_default")]
    pub device_manufacturer: String,
    #[serde(deserialize_with = "null_as_default")]
    pub device_model: String,
    #[serde(deserialize_with = "null_as_default")]
    pub os: String,
    #[serde(deserialize_with = "null_as_default")]
    pub os_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub android_sdk_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub windows_build_number: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(deserialize_with = "null_as_default")]
    pub build_date: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_run_date: String,
}

/// Metadata about the ping itself
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PingInfo {
    /// Per-ping-type sequence number
    #[serde(deserialize_with = "null_as_default")]
    pub seq: i64,

    /// Start of the measurement window
    #[serde(deserialize_with = "deserialize_ping_time")]
    pub start_time: Option<DateTime<FixedOffset>>,

    /// End of the measurement window
    #[serde(deserialize_with = "deserialize_ping_time")]
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Ping name, e.g. `metrics` or `events`
    #[serde(deserialize_with = "null_as_default")]
    pub ping_type: String,

    /// Why the ping was submitted
    #[serde(deserialize_with = "null_as_default")]
    pub reason: String,
}

impl PingInfo {
    /// Start time in UTC, the Unix epoch when the ping did not carry one
    pub fn start_time_utc(&self) -> DateTime<Utc> {
        self.start_time
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// A discrete event recorded by the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Event {
    /// Milliseconds since `ping_info.start_time`
    pub timestamp: i64,

    /// Event category, used as the event domain
    pub category: String,

    /// Event name
    pub name: String,

    /// Extra string key/value pairs
    pub extra: Option<BTreeMap<String, String>>,
}

/// A single metric value, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// JSON boolean
    Bool(bool),
    /// JSON number
    Number(f64),
    /// JSON string
    Str(String),
    /// JSON array whose elements are all strings
    StrList(Vec<String>),
    /// Object with `sum` and `values`
    Distribution(Distribution),
    /// Object with `numerator` and `denominator`
    Rate(Rate),
    /// Any other shape; produces no record
    Unrecognized,
}

/// Bucketed distribution
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    /// Sum of all samples
    pub sum: f64,
    /// Bucket counts, or the shape that was found instead of a mapping
    pub values: DistributionValues,
}

/// Contents of a distribution's `values` field
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionValues {
    /// Boundary/count pairs in input order
    Buckets(Vec<Bucket>),
    /// `values` was not an object; carries the JSON type that was found
    Malformed(&'static str),
}

/// One distribution bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Bucket boundary
    pub boundary: f64,
    /// Samples in the bucket
    pub count: u64,
}

/// Ratio of two counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    /// Numerator
    pub numerator: f64,
    /// Denominator
    pub denominator: f64,
}

impl MetricValue {
    /// Classify a raw JSON value
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(b) => MetricValue::Bool(b),
            Value::Number(n) => n.as_f64().map_or(MetricValue::Unrecognized, MetricValue::Number),
            Value::String(s) => MetricValue::Str(s),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map_or(MetricValue::Unrecognized, MetricValue::StrList),
            Value::Object(mut object) => {
                if object.contains_key("sum") && object.contains_key("values") {
                    let sum = object.get("sum").and_then(as_f64).unwrap_or(0.0);
                    let values = match object.remove("values") {
                        Some(Value::Object(buckets)) => DistributionValues::Buckets(
                            buckets
                                .iter()
                                .filter_map(|(key, count)| parse_bucket(key, count))
                                .collect(),
                        ),
                        Some(other) => DistributionValues::Malformed(json_type_name(&other)),
                        None => DistributionValues::Malformed("null"),
                    };
                    return MetricValue::Distribution(Distribution { sum, values });
                }

                if object.contains_key("numerator") && object.contains_key("denominator") {
                    return MetricValue::Rate(Rate {
                        numerator: object.get("numerator").and_then(as_f64).unwrap_or(0.0),
                        denominator: object.get("denominator").and_then(as_f64).unwrap_or(0.0),
                    });
                }

                MetricValue::Unrecognized
            }
            Value::Null => MetricValue::Unrecognized,
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(MetricValue::from_json)
    }
}

/// Parse a ping timestamp
///
/// Accepts RFC 3339 and the minute-precision `YYYY-MM-DDTHH:MM+HH:MM` form.
pub fn parse_ping_time(raw: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M%:z"))
}

fn deserialize_ping_time<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.is_empty() => parse_ping_time(&raw)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}"))),
        _ => Ok(None),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn deserialize_metrics<'de, D>(deserializer: D) -> Result<Option<MetricCategories>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    Ok(raw.map(|categories| {
        categories
            .into_iter()
            .filter_map(|(category, entries)| match entries {
                Value::Object(entries) => Some((
                    category,
                    entries
                        .into_iter()
                        .map(|(name, value)| (name, MetricValue::from_json(value)))
                        .collect(),
                )),
                other => {
                    debug!(
                        category = %category,
                        found = json_type_name(&other),
                        "Skipping metric category that is not an object"
                    );
                    None
                }
            })
            .collect()
    }))
}

fn parse_bucket(key: &str, count: &Value) -> Option<Bucket> {
    let Ok(boundary) = key.trim().parse::<f64>() else {
        debug!(bucket = %key, "Skipping distribution bucket with non-numeric boundary");
        return None;
    };
    if !boundary.is_finite() {
        return None;
    }
    let count = as_f64(count)
        .filter(|c| c.is_finite() && *c > 0.0)
        .map_or(0, |c| c as u64);
    Some(Bucket { boundary, count })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_scalars() {
        assert_eq!(MetricValue::from_json(json!(true)), MetricValue::Bool(true));
        assert_eq!(MetricValue::from_json(json!(3.5)), MetricValue::Number(3.5));
        assert_eq!(
            MetricValue::from_json(json!("beta")),
            MetricValue::Str("beta".to_string())
        );
        assert_eq!(MetricValue::from_json(json!(null)), MetricValue::Unrecognized);
    }

    #[test]
    fn test_mixed_list_is_unrecognized() {
        assert_eq!(
            MetricValue::from_json(json!(["a", "b"])),
            MetricValue::StrList(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(MetricValue::from_json(json!(["a", 1])), MetricValue::Unrecognized);
    }

    #[test]
    fn test_distribution_takes_precedence_over_rate() {
        let value = MetricValue::from_json(json!({
            "sum": 3,
            "values": {"1": 3},
            "numerator": 1,
            "denominator": 2
        }));
        assert!(matches!(value, MetricValue::Distribution(_)));
    }

    #[test]
    fn test_malformed_distribution_values_are_kept_for_conversion() {
        let value = MetricValue::from_json(json!({"sum": 1, "values": [1, 2]}));
        assert_eq!(
            value,
            MetricValue::Distribution(Distribution {
                sum: 1.0,
                values: DistributionValues::Malformed("array"),
            })
        );
    }

    #[test]
    fn test_unknown_object_shape() {
        let value = MetricValue::from_json(json!({"sum": 1}));
        assert_eq!(value, MetricValue::Unrecognized);
    }

    #[test]
    fn test_non_object_category_is_skipped() {
        let ping: Ping = serde_json::from_value(json!({
            "metrics": {"counter": {"a": 1}, "broken": 7}
        }))
        .unwrap();
        let metrics = ping.metrics.unwrap();
        assert_eq!(metrics.len(), 1);
        assert!(metrics.contains_key("counter"));
    }

    #[test]
    fn test_minute_precision_start_time() {
        let parsed = parse_ping_time("2024-01-28T10:00+01:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-28T10:00:00+01:00");

        let parsed = parse_ping_time("2024-01-28T10:00:30.5Z").unwrap();
        assert_eq!(parsed.timestamp_millis() % 1000, 500);
    }

    #[test]
    fn test_non_string_extra_is_rejected() {
        let result = Ping::from_slice(
            br#"{"events":[{"timestamp":1,"category":"ui","name":"click","extra":{"n":1}}]}"#,
        );
        assert!(matches!(result, Err(ParseError::Json(_))));
    }

    #[test]
    fn test_null_metadata_decodes_as_default() {
        let ping = Ping::from_slice(br#"{"client_info": null, "ping_info": null}"#).unwrap();
        assert!(ping.client_info.client_id.is_empty());
        assert_eq!(ping.ping_info.seq, 0);

        let ping = Ping::from_slice(
            br#"{
                "client_info": {"client_id": "c-1", "locale": null, "session_count": null},
                "ping_info": {"seq": null, "ping_type": "metrics", "reason": null,
                              "start_time": null}
            }"#,
        )
        .unwrap();
        assert_eq!(ping.client_info.client_id, "c-1");
        assert!(ping.client_info.locale.is_empty());
        assert_eq!(ping.client_info.session_count, 0);
        assert_eq!(ping.ping_info.ping_type, "metrics");
        assert!(ping.ping_info.reason.is_empty());
        assert!(ping.ping_info.start_time.is_none());
    }

    #[test]
    fn test_missing_sections_default() {
        let ping = Ping::from_slice(b"{}").unwrap();
        assert!(!ping.has_metrics());
        assert!(ping.events().is_empty());
        assert_eq!(ping.ping_info.start_time_utc(), DateTime::UNIX_EPOCH);
    }
}
