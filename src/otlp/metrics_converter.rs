//! Convert record batches to OTLP protobuf requests
//!
//! Builds `ExportMetricsServiceRequest` and `ExportLogsServiceRequest`
//! messages directly from opentelemetry-proto structures.

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, InstrumentationScope as ProtoInstrumentationScope, KeyValue as ProtoKeyValue,
    any_value,
};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{
    AggregationTemporality, Gauge, Histogram, HistogramDataPoint as ProtoHistogramDataPoint,
    Metric, NumberDataPoint as ProtoNumberDataPoint, ResourceMetrics, ScopeMetrics, Sum, metric,
    number_data_point,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;

use crate::otlp::logs_data::{EventLogBatch, EventRecord};
use crate::otlp::metrics_data::*;

impl MetricsBatch {
    /// Convert to a protobuf `ExportMetricsServiceRequest`
    pub fn to_protobuf(&self) -> ExportMetricsServiceRequest {
        let scope_metrics = ScopeMetrics {
            scope: Some(scope_to_proto(&self.scope)),
            metrics: self.metrics.iter().map(metric_to_proto).collect(),
            schema_url: String::new(),
        };

        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Some(resource_to_proto(&self.resource)),
                scope_metrics: vec![scope_metrics],
                schema_url: String::new(),
            }],
        }
    }
}

impl EventLogBatch {
    /// Convert to a protobuf `ExportLogsServiceRequest`
    pub fn to_protobuf(&self) -> ExportLogsServiceRequest {
        let scope_logs = ScopeLogs {
            scope: Some(scope_to_proto(&self.scope)),
            log_records: self.records.iter().map(event_to_proto).collect(),
            schema_url: String::new(),
        };

        ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Some(resource_to_proto(&self.resource)),
                scope_logs: vec![scope_logs],
                schema_url: String::new(),
            }],
        }
    }
}

fn resource_to_proto(attributes: &[opentelemetry::KeyValue]) -> ProtoResource {
    ProtoResource {
        attributes: attributes.iter().map(key_value_to_proto).collect(),
        ..Default::default()
    }
}

fn scope_to_proto(scope: &InstrumentationScope) -> ProtoInstrumentationScope {
    ProtoInstrumentationScope {
        name: scope.name.clone(),
        version: scope.version.clone().unwrap_or_default(),
        ..Default::default()
    }
}

/// Convert an opentelemetry `KeyValue` to its protobuf form
pub(crate) fn key_value_to_proto(kv: &opentelemetry::KeyValue) -> ProtoKeyValue {
    let value = match &kv.value {
        opentelemetry::Value::String(s) => Some(any_value::Value::StringValue(s.to_string())),
        opentelemetry::Value::I64(i) => Some(any_value::Value::IntValue(*i)),
        opentelemetry::Value::F64(f) => Some(any_value::Value::DoubleValue(*f)),
        opentelemetry::Value::Bool(b) => Some(any_value::Value::BoolValue(*b)),
        _ => None,
    };

    ProtoKeyValue {
        key: kv.key.as_str().to_string(),
        value: value.map(|value| AnyValue { value: Some(value) }),
    }
}

fn metric_to_proto(record: &MetricRecord) -> Metric {
    let data = match &record.data {
        MetricData::Gauge(points) => metric::Data::Gauge(Gauge {
            data_points: points.iter().map(number_point_to_proto).collect(),
        }),
        MetricData::Sum(points) => metric::Data::Sum(Sum {
            data_points: points.iter().map(number_point_to_proto).collect(),
            aggregation_temporality: AggregationTemporality::Cumulative as i32,
            is_monotonic: true,
        }),
        MetricData::Histogram(point) => metric::Data::Histogram(Histogram {
            data_points: vec![histogram_point_to_proto(point)],
            aggregation_temporality: AggregationTemporality::Cumulative as i32,
        }),
    };

    Metric {
        name: record.name.clone(),
        unit: record.unit.clone(),
        data: Some(data),
        ..Default::default()
    }
}

fn number_point_to_proto(point: &NumberDataPoint) -> ProtoNumberDataPoint {
    let value = match point.value {
        NumberValue::AsInt(i) => number_data_point::Value::AsInt(i),
        NumberValue::AsDouble(d) => number_data_point::Value::AsDouble(d),
    };

    ProtoNumberDataPoint {
        attributes: point.attributes.iter().map(key_value_to_proto).collect(),
        start_time_unix_nano: point.start_time_unix_nano.unwrap_or(0),
        time_unix_nano: point.time_unix_nano,
        value: Some(value),
        ..Default::default()
    }
}

fn histogram_point_to_proto(point: &HistogramDataPoint) -> ProtoHistogramDataPoint {
    ProtoHistogramDataPoint {
        start_time_unix_nano: point.start_time_unix_nano.unwrap_or(0),
        time_unix_nano: point.time_unix_nano,
        count: point.count,
        sum: Some(point.sum),
        bucket_counts: point.bucket_counts.clone(),
        explicit_bounds: point.explicit_bounds.clone(),
        ..Default::default()
    }
}

fn event_to_proto(record: &EventRecord) -> LogRecord {
    LogRecord {
        time_unix_nano: record.time_unix_nano,
        observed_time_unix_nano: record.time_unix_nano,
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(record.body.clone())),
        }),
        attributes: record.attributes.iter().map(key_value_to_proto).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::KeyValue;

    #[test]
    fn test_counter_to_protobuf() {
        let batch = MetricsBatch {
            resource: vec![KeyValue::new("client.id", "abc")],
            scope: InstrumentationScope::default(),
            metrics: vec![MetricRecord {
                name: "counter.x".to_string(),
                kind: MetricKind::Counter,
                unit: METRIC_UNIT.to_string(),
                data: MetricData::Sum(vec![NumberDataPoint {
                    attributes: Vec::new(),
                    start_time_unix_nano: Some(1),
                    time_unix_nano: 2,
                    value: NumberValue::AsInt(5),
                }]),
            }],
        };

        let request = batch.to_protobuf();
        let resource_metrics = &request.resource_metrics[0];
        let resource = resource_metrics.resource.as_ref().unwrap();
        assert_eq!(resource.attributes[0].key, "client.id");

        let scope_metrics = &resource_metrics.scope_metrics[0];
        assert_eq!(scope_metrics.scope.as_ref().unwrap().name, SCOPE_NAME);

        let metric = &scope_metrics.metrics[0];
        assert_eq!(metric.unit, "1");
        match metric.data.as_ref().unwrap() {
            metric::Data::Sum(sum) => {
                assert!(sum.is_monotonic);
                assert_eq!(
                    sum.aggregation_temporality,
                    AggregationTemporality::Cumulative as i32
                );
                assert_eq!(
                    sum.data_points[0].value,
                    Some(number_data_point::Value::AsInt(5))
                );
                assert_eq!(sum.data_points[0].start_time_unix_nano, 1);
            }
            other => panic!("expected sum, got {other:?}"),
        }
    }

    #[test]
    fn test_event_to_protobuf() {
        let batch = EventLogBatch {
            resource: Vec::new(),
            scope: InstrumentationScope::default(),
            records: vec![EventRecord {
                time_unix_nano: 10,
                body: "click".to_string(),
                attributes: vec![KeyValue::new("event.name", "click")],
            }],
        };

        let request = batch.to_protobuf();
        let record = &request.resource_logs[0].scope_logs[0].log_records[0];
        assert_eq!(record.time_unix_nano, 10);
        assert_eq!(
            record.body.as_ref().and_then(|b| b.value.clone()),
            Some(any_value::Value::StringValue("click".to_string()))
        );
        assert_eq!(record.attributes[0].key, "event.name");
    }
}
