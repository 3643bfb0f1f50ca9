//! Receiver registry
//!
//! Deduplicates receivers by identity so that a metrics pipeline and a logs
//! pipeline pointed at the same configuration bind one listener.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::ReceiverConfig;
use crate::error::{PingReceiverError, ServerError};
use crate::otlp::exporter::{LogsSink, MetricsSink};
use crate::receiver::PingReceiver;

/// Receivers by identity
///
/// Owned by the host process and passed by reference to whatever builds
/// pipelines.
#[derive(Debug, Default)]
pub struct ReceiverRegistry {
    receivers: Mutex<HashMap<String, Arc<PingReceiver>>>,
}

impl ReceiverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the receiver for `id`, creating it on first use
    ///
    /// An existing receiver gets any newly supplied sinks attached to its empty
    /// slots. Creating a receiver requires at least one sink.
    pub fn get_or_create(
        &self,
        id: &str,
        config: &ReceiverConfig,
        metrics: Option<Arc<dyn MetricsSink>>,
        logs: Option<Arc<dyn LogsSink>>,
    ) -> Result<Arc<PingReceiver>, PingReceiverError> {
        let mut receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = receivers.get(id) {
            debug!(id = %id, "Reusing existing receiver");
            existing.attach(metrics, logs);
            return Ok(Arc::clone(existing));
        }

        if metrics.is_none() && logs.is_none() {
            return Err(ServerError::CreateError(format!(
                "receiver {} needs a metrics or logs sink",
                id
            ))
            .into());
        }

        let receiver = Arc::new(PingReceiver::new(id, config.clone(), metrics, logs)?);
        receivers.insert(id.to_string(), Arc::clone(&receiver));

        info!(id = %id, endpoint = %config.endpoint, "Created ping receiver");
        Ok(receiver)
    }

    /// Look up a receiver without creating it
    pub fn get(&self, id: &str) -> Option<Arc<PingReceiver>> {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of registered receivers
    pub fn len(&self) -> usize {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no receiver is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shut down every registered receiver
    ///
    /// All receivers are shut down even if one fails; the first error is
    /// returned.
    pub async fn shutdown_all(&self) -> Result<(), ServerError> {
        let receivers: Vec<Arc<PingReceiver>> = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut first_error = None;
        for receiver in receivers {
            if let Err(e) = receiver.shutdown().await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSink;

    #[test]
    fn test_second_pipeline_reuses_receiver() {
        let registry = ReceiverRegistry::new();
        let config = ReceiverConfig::default();

        let metrics = registry
            .get_or_create("glean", &config, Some(Arc::new(MockSink::new())), None)
            .unwrap();
        let logs = registry
            .get_or_create("glean", &config, None, Some(Arc::new(MockSink::new())))
            .unwrap();

        assert!(Arc::ptr_eq(&metrics, &logs));
        assert_eq!(registry.len(), 1);
        assert!(metrics.sinks().metrics().is_some());
        assert!(metrics.sinks().logs().is_some());
    }

    #[test]
    fn test_create_without_sinks_fails() {
        let registry = ReceiverRegistry::new();
        let result = registry.get_or_create("empty", &ReceiverConfig::default(), None, None);
        assert!(matches!(
            result,
            Err(PingReceiverError::Server(ServerError::CreateError(_)))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_distinct_ids_get_distinct_receivers() {
        let registry = ReceiverRegistry::new();
        let config = ReceiverConfig::default();
        let a = registry
            .get_or_create("a", &config, Some(Arc::new(MockSink::new())), None)
            .unwrap();
        let b = registry
            .get_or_create("b", &config, Some(Arc::new(MockSink::new())), None)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }
}
