//! Receiver sharing and lifecycle across pipelines

use ping_otlp_receiver::config::ReceiverConfig;
use ping_otlp_receiver::otlp::{LogsSink, MetricsSink};
use ping_otlp_receiver::{MockSink, ReceiverRegistry, ReceiverState};
use std::sync::Arc;

fn local_config() -> ReceiverConfig {
    ReceiverConfig {
        endpoint: "127.0.0.1:0".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_concurrent_get_or_create_returns_one_receiver() {
    let registry = Arc::new(ReceiverRegistry::new());
    let config = local_config();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let config = config.clone();
            std::thread::spawn(move || {
                let sink = Arc::new(MockSink::new());
                let (metrics, logs) = if i % 2 == 0 {
                    (Some(sink as Arc<dyn MetricsSink>), None)
                } else {
                    (None, Some(sink as Arc<dyn LogsSink>))
                };
                registry
                    .get_or_create("shared", &config, metrics, logs)
                    .unwrap()
            })
        })
        .collect();

    let receivers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for receiver in &receivers[1..] {
        assert!(Arc::ptr_eq(&receivers[0], receiver));
    }
    assert_eq!(registry.len(), 1);
    assert!(receivers[0].sinks().metrics().is_some());
    assert!(receivers[0].sinks().logs().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_binds_once() {
    let registry = ReceiverRegistry::new();
    let receiver = registry
        .get_or_create(
            "glean",
            &local_config(),
            Some(Arc::new(MockSink::new())),
            None,
        )
        .unwrap();

    let starts: Vec<_> = (0..8)
        .map(|_| {
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move { receiver.start().await })
        })
        .collect();
    for start in starts {
        start.await.unwrap().unwrap();
    }

    // Starts that lost the race may return before the winner has bound
    while receiver.state() == ReceiverState::Starting {
        tokio::task::yield_now().await;
    }
    assert_eq!(receiver.state(), ReceiverState::Running);
    let addr = receiver.local_addr().unwrap();

    receiver.start().await.unwrap();
    assert_eq!(receiver.local_addr(), Some(addr));

    registry.shutdown_all().await.unwrap();
    assert_eq!(receiver.state(), ReceiverState::Stopped);
    registry.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_repeated_start_and_shutdown() {
    let registry = ReceiverRegistry::new();
    let receiver = registry
        .get_or_create(
            "glean",
            &local_config(),
            None,
            Some(Arc::new(MockSink::new())),
        )
        .unwrap();
    assert_eq!(receiver.state(), ReceiverState::Created);

    receiver.start().await.unwrap();
    receiver.start().await.unwrap();
    assert_eq!(receiver.state(), ReceiverState::Running);

    receiver.shutdown().await.unwrap();
    receiver.shutdown().await.unwrap();
    assert_eq!(receiver.state(), ReceiverState::Stopped);

    // A stopped receiver is terminal
    receiver.start().await.unwrap();
    assert_eq!(receiver.state(), ReceiverState::Stopped);
    assert!(Arc::ptr_eq(&receiver, &registry.get("glean").unwrap()));
}

#[tokio::test]
async fn test_shutdown_all_without_start() {
    let registry = ReceiverRegistry::new();
    for id in ["a", "b"] {
        registry
            .get_or_create(id, &local_config(), Some(Arc::new(MockSink::new())), None)
            .unwrap();
    }

    registry.shutdown_all().await.unwrap();
    assert_eq!(registry.get("a").unwrap().state(), ReceiverState::Stopped);
    assert_eq!(registry.get("b").unwrap().state(), ReceiverState::Stopped);
}

#[test]
fn test_invalid_config_is_rejected() {
    let registry = ReceiverRegistry::new();
    let config = ReceiverConfig {
        path: String::new(),
        ..local_config()
    };
    let result = registry.get_or_create("bad", &config, Some(Arc::new(MockSink::new())), None);
    assert!(result.is_err());
    assert!(registry.is_empty());
}
