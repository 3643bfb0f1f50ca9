//! End-to-end tests for the ingestion endpoint over a real listener

use ping_otlp_receiver::otlp::Sinks;
use ping_otlp_receiver::otlp::metrics_data::{MetricKind, NumberValue};
use ping_otlp_receiver::{ConfigBuilder, MockSink, PingReceiverService, ReceiverState};
use std::sync::Arc;

const DOC_PATH: &str = "/submit/telemetry/glean-app/metrics/1/0e1b7c3a-1d2e-4f5a-9b8c-7d6e5f4a3b2c";

async fn start_service(sink: &MockSink) -> (PingReceiverService, String) {
    start_service_with(sink, ConfigBuilder::new()).await
}

async fn start_service_with(
    sink: &MockSink,
    builder: ConfigBuilder,
) -> (PingReceiverService, String) {
    let config = builder.endpoint("127.0.0.1:0").build().unwrap();
    let sinks = Sinks {
        metrics: Some(Arc::new(sink.clone())),
        logs: Some(Arc::new(sink.clone())),
    };
    let service = PingReceiverService::with_sinks(config, sinks).unwrap();
    service.start().await.unwrap();
    let base = format!("http://{}", service.local_addr().unwrap());
    (service, base)
}

fn ping_body(metrics: serde_json::Value, events: serde_json::Value) -> String {
    serde_json::json!({
        "client_info": {"client_id": "client-1", "app_build": "100"},
        "ping_info": {
            "seq": 1,
            "start_time": "2024-01-28T10:00:00+00:00",
            "end_time": "2024-01-28T10:05:00+00:00",
            "ping_type": "metrics"
        },
        "metrics": metrics,
        "events": events
    })
    .to_string()
}

#[tokio::test]
async fn test_counter_ping_is_accepted() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(serde_json::json!({"counter": {"x": 5.0}}), serde_json::json!([])))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    sink.assert_metrics_received(1).unwrap();
    sink.assert_logs_received(0).unwrap();
    let batches = sink.metrics_batches();
    let record = batches[0].get("counter.x").unwrap();
    assert_eq!(record.kind, MetricKind::Counter);
    assert_eq!(record.number_points()[0].value, NumberValue::AsInt(5));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_events_reach_logs_sink() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(
            serde_json::json!({}),
            serde_json::json!([{"timestamp": 10, "category": "ui", "name": "click"}]),
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    sink.assert_metrics_received(0).unwrap();
    sink.assert_logs_received(1).unwrap();
    assert_eq!(sink.log_batches()[0].records[0].body, "click");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_get_is_rejected() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let response = reqwest::get(format!("{base}{DOC_PATH}")).await.unwrap();
    assert_eq!(response.status().as_u16(), 405);
    assert_eq!(sink.calls(), 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body("{invalid json}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(sink.calls(), 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let sink = MockSink::new();
    let (service, base) =
        start_service_with(&sink, ConfigBuilder::new().max_request_body_bytes(64)).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(serde_json::json!({"counter": {"x": 1}}), serde_json::json!([])))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/submit/telemetry/only/two"))
        .body(ping_body(serde_json::json!({}), serde_json::json!([])))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_metrics_failure_skips_logs() {
    let sink = MockSink::new();
    sink.reject_metrics(true);
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(
            serde_json::json!({"counter": {"x": 1}}),
            serde_json::json!([{"timestamp": 0, "category": "ui", "name": "click"}]),
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    // Only the rejected metrics call; the logs phase never ran
    assert_eq!(sink.calls(), 1);
    sink.assert_logs_received(0).unwrap();

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_distribution_is_server_error() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(
            serde_json::json!({"timing_distribution": {"t": {"sum": 1, "values": "bad"}}}),
            serde_json::json!([{"timestamp": 0, "category": "ui", "name": "click"}]),
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(sink.calls(), 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_logs_failure_is_server_error() {
    let sink = MockSink::new();
    sink.reject_logs(true);
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(
            serde_json::json!({"counter": {"x": 1}}),
            serde_json::json!([{"timestamp": 0, "category": "ui", "name": "click"}]),
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    sink.assert_metrics_received(1).unwrap();

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;
    let client = reqwest::Client::new();

    let mut handles = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        let url = format!("{base}{DOC_PATH}");
        let body = ping_body(serde_json::json!({"quantity": {"n": i}}), serde_json::json!([]));
        handles.push(tokio::spawn(async move {
            client.post(url).body(body).send().await.unwrap().status().as_u16()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 200);
    }
    sink.assert_metrics_received(20).unwrap();

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_listener() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    service.shutdown().await.unwrap();
    assert_eq!(service.receiver().state(), ReceiverState::Stopped);
    service.shutdown().await.unwrap();

    let result = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(serde_json::json!({}), serde_json::json!([])))
        .send()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_null_metadata_is_accepted() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let body = r#"{
        "client_info": {"client_id": "client-1", "locale": null},
        "ping_info": {"seq": 2, "ping_type": "metrics", "reason": null},
        "metrics": {"counter": {"x": 1}}
    }"#;
    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let batches = sink.metrics_batches();
    assert!(batches[0].resource_attribute("host.locale").is_none());
    assert!(batches[0].resource_attribute("ping.reason").is_none());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_huge_distribution_counts_are_accepted() {
    let sink = MockSink::new();
    let (service, base) = start_service(&sink).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{DOC_PATH}"))
        .body(ping_body(
            serde_json::json!({"custom_distribution": {"d": {
                "sum": 1,
                "values": {"1": 1.0e19, "2": 1.0e19}
            }}}),
            serde_json::json!([]),
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let batches = sink.metrics_batches();
    let point = batches[0]
        .get("custom_distribution.d")
        .unwrap()
        .histogram_point()
        .unwrap();
    assert_eq!(point.count, u64::MAX);

    service.shutdown().await.unwrap();
}
