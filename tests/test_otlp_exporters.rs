//! OTLP export over HTTP/protobuf and gRPC

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use prost::Message;
use ping_otlp_receiver::otlp::{LogsSink, MetricsSink, OtlpGrpcExporter, OtlpHttpExporter};
use ping_otlp_receiver::{
    ConfigBuilder, ConsumeError, ExporterConfig, ExporterProtocol, MockOtlpCollector, Ping,
    PingConverter, PingReceiverService,
};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RAW_PING: &str = r#"{
    "client_info": {"client_id": "abc", "os": "Android"},
    "ping_info": {"seq": 1, "start_time": "2024-01-28T10:00:00+00:00", "ping_type": "metrics"},
    "metrics": {
        "counter": {"launches": 3},
        "timing_distribution": {"startup": {"sum": 30, "values": {"10": 1, "20": 1}}}
    },
    "events": [{"timestamp": 100, "category": "app", "name": "opened"}]
}"#;

fn ping() -> Ping {
    Ping::from_slice(RAW_PING.as_bytes()).unwrap()
}

fn exporter_config(protocol: ExporterProtocol, endpoint: String) -> ExporterConfig {
    ExporterConfig {
        protocol,
        endpoint: Some(endpoint),
        timeout_ms: 2000,
    }
}

#[tokio::test]
async fn test_http_exporter_posts_protobuf_metrics() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics"))
        .and(header("content-type", "application/x-protobuf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&collector)
        .await;

    let exporter = OtlpHttpExporter::new(&exporter_config(
        ExporterProtocol::HttpProtobuf,
        format!("{}/", collector.uri()),
    ))
    .unwrap();
    let batch = PingConverter::new().convert_metrics(&ping()).unwrap();
    exporter.consume_metrics(batch).await.unwrap();

    let requests = collector.received_requests().await.unwrap();
    let decoded = ExportMetricsServiceRequest::decode(requests[0].body.as_slice()).unwrap();
    let metrics = &decoded.resource_metrics[0].scope_metrics[0].metrics;
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].name, "counter.launches");
    assert_eq!(metrics[1].name, "timing_distribution.startup");
}

#[tokio::test]
async fn test_http_exporter_posts_protobuf_logs() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/logs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&collector)
        .await;

    let exporter = OtlpHttpExporter::new(&exporter_config(
        ExporterProtocol::HttpProtobuf,
        collector.uri(),
    ))
    .unwrap();
    let batch = PingConverter::new().convert_events(&ping());
    exporter.consume_logs(batch).await.unwrap();

    let requests = collector.received_requests().await.unwrap();
    let decoded = ExportLogsServiceRequest::decode(requests[0].body.as_slice()).unwrap();
    let records = &decoded.resource_logs[0].scope_logs[0].log_records;
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_http_exporter_error_status_is_consume_error() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&collector)
        .await;

    let exporter = OtlpHttpExporter::new(&exporter_config(
        ExporterProtocol::HttpProtobuf,
        collector.uri(),
    ))
    .unwrap();
    let batch = PingConverter::new().convert_metrics(&ping()).unwrap();
    let result = exporter.consume_metrics(batch).await;
    assert!(matches!(result, Err(ConsumeError::Export(_))));
}

#[tokio::test]
async fn test_grpc_exporter_sends_to_collector() {
    let collector = MockOtlpCollector::new();
    let endpoint = collector.start().await.unwrap();
    // Give the server task a moment to start accepting
    tokio::time::sleep(Duration::from_millis(100)).await;

    let exporter =
        OtlpGrpcExporter::new(&exporter_config(ExporterProtocol::Grpc, endpoint)).unwrap();
    let converter = PingConverter::new();
    exporter
        .consume_metrics(converter.convert_metrics(&ping()).unwrap())
        .await
        .unwrap();
    exporter
        .consume_logs(converter.convert_events(&ping()))
        .await
        .unwrap();

    collector.assert_metrics_received(1).await.unwrap();
    collector.assert_logs_received(1).await.unwrap();
    assert_eq!(collector.grpc_calls_count().await, 2);

    let metrics = collector.received_metrics().await;
    let resource = metrics[0].resource_metrics[0].resource.as_ref().unwrap();
    assert!(resource.attributes.iter().any(|kv| kv.key == "os.type"));

    collector.stop();
}

#[tokio::test]
async fn test_service_exports_ingested_ping_over_http() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/metrics"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&collector)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/logs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&collector)
        .await;

    let config = ConfigBuilder::new()
        .endpoint("127.0.0.1:0")
        .exporter(exporter_config(ExporterProtocol::HttpProtobuf, collector.uri()))
        .build()
        .unwrap();
    let service = PingReceiverService::new(config).await.unwrap();
    service.start().await.unwrap();

    let url = format!(
        "http://{}/submit/telemetry/app/metrics/1/doc-1",
        service.local_addr().unwrap()
    );
    let response = reqwest::Client::new()
        .post(url)
        .body(RAW_PING)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    service.shutdown().await.unwrap();
    assert_eq!(collector.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_service_with_logs_pipeline_only() {
    let config = ConfigBuilder::new()
        .endpoint("127.0.0.1:0")
        .pipelines(false, true)
        .build()
        .unwrap();
    let service = PingReceiverService::new(config).await.unwrap();

    assert!(service.receiver().sinks().metrics().is_none());
    assert!(service.receiver().sinks().logs().is_some());
    assert_eq!(service.registry().len(), 1);
    service.shutdown().await.unwrap();
}
