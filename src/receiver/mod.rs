//! Ping receiver
//!
//! A [`PingReceiver`] owns one HTTP listener, the ingress handler serving it
//! and the forwarder relaying raw pings. Receivers are created through the
//! [`ReceiverRegistry`] so pipelines sharing an identity share a listener.

pub mod forwarder;
pub mod handler;
pub mod path;
pub mod registry;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReceiverConfig;
use crate::error::{PingReceiverError, ServerError};
use crate::otlp::exporter::{LogsSink, MetricsSink};

pub use forwarder::PingForwarder;
pub use handler::{IngressHandler, SinkSlots};
pub use path::{PathParams, PathTemplate, complete_path_template};
pub use registry::ReceiverRegistry;

const CREATED: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;
const SHUTTING_DOWN: u8 = 3;
const STOPPED: u8 = 4;

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Constructed, not listening
    Created,
    /// Binding the listener
    Starting,
    /// Serving requests
    Running,
    /// Draining connections and forwards
    ShuttingDown,
    /// Terminal
    Stopped,
}

impl From<u8> for ReceiverState {
    fn from(raw: u8) -> Self {
        match raw {
            CREATED => ReceiverState::Created,
            STARTING => ReceiverState::Starting,
            RUNNING => ReceiverState::Running,
            SHUTTING_DOWN => ReceiverState::ShuttingDown,
            _ => ReceiverState::Stopped,
        }
    }
}

/// One HTTP listener serving telemetry pings
pub struct PingReceiver {
    id: String,
    config: ReceiverConfig,
    sinks: Arc<SinkSlots>,
    handler: Arc<IngressHandler>,
    forwarder: Arc<PingForwarder>,
    state: AtomicU8,
    cancel: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
    local_addr: OnceLock<SocketAddr>,
}

impl std::fmt::Debug for PingReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingReceiver")
            .field("id", &self.id)
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state())
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}

impl PingReceiver {
    /// Create a receiver; it does not listen until [`start`](Self::start)
    pub fn new(
        id: impl Into<String>,
        config: ReceiverConfig,
        metrics: Option<Arc<dyn MetricsSink>>,
        logs: Option<Arc<dyn LogsSink>>,
    ) -> Result<Self, PingReceiverError> {
        config.validate()?;

        let sinks = Arc::new(SinkSlots::default());
        if let Some(sink) = metrics {
            sinks.attach_metrics(sink);
        }
        if let Some(sink) = logs {
            sinks.attach_logs(sink);
        }

        let forwarder = Arc::new(PingForwarder::new(&config)?);
        let template = PathTemplate::new(&config.path);
        let handler = Arc::new(IngressHandler::new(
            template,
            config.max_request_body_bytes,
            Arc::clone(&forwarder),
            Arc::clone(&sinks),
        ));

        Ok(Self {
            id: id.into(),
            config,
            sinks,
            handler,
            forwarder,
            state: AtomicU8::new(CREATED),
            cancel: CancellationToken::new(),
            server: Mutex::new(None),
            local_addr: OnceLock::new(),
        })
    }

    /// Registry identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Completed ingestion path template
    pub fn path(&self) -> String {
        self.config.full_path()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ReceiverState {
        self.state.load(Ordering::Acquire).into()
    }

    /// Bound listener address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Attached sinks
    pub fn sinks(&self) -> &SinkSlots {
        &self.sinks
    }

    /// Attach sinks to empty slots
    ///
    /// A sink offered for a slot that is already filled is ignored.
    pub fn attach(&self, metrics: Option<Arc<dyn MetricsSink>>, logs: Option<Arc<dyn LogsSink>>) {
        if let Some(sink) = metrics {
            if self.sinks.attach_metrics(sink) {
                debug!(id = %self.id, "Attached metrics sink to existing receiver");
            } else {
                warn!(id = %self.id, "Receiver already has a metrics sink, ignoring new one");
            }
        }
        if let Some(sink) = logs {
            if self.sinks.attach_logs(sink) {
                debug!(id = %self.id, "Attached logs sink to existing receiver");
            } else {
                warn!(id = %self.id, "Receiver already has a logs sink, ignoring new one");
            }
        }
    }

    /// Bind the listener and start serving
    ///
    /// Only the first call from `Created` does anything; later calls, and
    /// calls after shutdown, return `Ok(())`.
    pub async fn start(&self) -> Result<(), ServerError> {
        if self
            .state
            .compare_exchange(CREATED, STARTING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(id = %self.id, state = ?self.state(), "Receiver start ignored");
            return Ok(());
        }

        let listener = match TcpListener::bind(&self.config.endpoint).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.store(STOPPED, Ordering::Release);
                error!(
                    id = %self.id,
                    endpoint = %self.config.endpoint,
                    error = %e,
                    "Failed to bind receiver"
                );
                return Err(ServerError::BindError(format!(
                    "{}: {}",
                    self.config.endpoint, e
                )));
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state.store(STOPPED, Ordering::Release);
                return Err(ServerError::StartupError(e.to_string()));
            }
        };
        let _ = self.local_addr.set(addr);

        self.forwarder.start();
        let handle = tokio::spawn(serve(
            listener,
            Arc::clone(&self.handler),
            self.cancel.clone(),
            self.config.read_header_timeout(),
        ));
        *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.state.store(RUNNING, Ordering::Release);

        info!(
            id = %self.id,
            address = %addr,
            path = %self.path(),
            forwarding = self.forwarder.is_enabled(),
            "Ping receiver listening"
        );
        Ok(())
    }

    /// Stop serving and wait for connections and forwards to drain
    ///
    /// Safe to call repeatedly and without a prior start.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        loop {
            match self.state.load(Ordering::Acquire) {
                CREATED => {
                    if self
                        .state
                        .compare_exchange(CREATED, STOPPED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.forwarder.shutdown().await;
                        debug!(id = %self.id, "Receiver stopped before start");
                        return Ok(());
                    }
                }
                STARTING => tokio::task::yield_now().await,
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(
                            RUNNING,
                            SHUTTING_DOWN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        break;
                    }
                }
                _ => return Ok(()),
            }
        }

        info!(id = %self.id, "Shutting down ping receiver");
        self.cancel.cancel();

        let handle = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let result = match handle {
            Some(handle) => handle
                .await
                .map_err(|e| ServerError::StartupError(format!("server task failed: {}", e))),
            None => Ok(()),
        };

        self.forwarder.shutdown().await;
        self.state.store(STOPPED, Ordering::Release);
        info!(id = %self.id, "Ping receiver stopped");
        result
    }
}

async fn serve(
    listener: TcpListener,
    handler: Arc<IngressHandler>,
    cancel: CancellationToken,
    read_header_timeout: Duration,
) {
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(read_header_timeout);
    let mut connections = JoinSet::new();

    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
            Some(finished) = connections.join_next() => {
                match finished {
                    Err(e) if e.is_panic() => error!(error = ?e, "Connection handler panicked"),
                    Ok(()) | Err(_) => {}
                }
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let builder = builder.clone();
        let handler = Arc::clone(&handler);
        let cancel = cancel.clone();

        connections.spawn(async move {
            let service = service_fn(move |request: Request<Incoming>| {
                let handler = Arc::clone(&handler);
                async move { Ok::<_, Infallible>(handler.handle(request).await) }
            });

            let connection = builder.serve_connection(io, service);
            tokio::pin!(connection);
            let result = tokio::select! {
                result = connection.as_mut() => result,
                _ = cancel.cancelled() => {
                    connection.as_mut().graceful_shutdown();
                    connection.await
                }
            };
            if let Err(e) = result {
                debug!(error = %e, "Connection closed with error");
            }
        });
    }

    while connections.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::mock::MockSink;

    fn receiver() -> PingReceiver {
        let config = ConfigBuilder::new()
            .endpoint("127.0.0.1:0")
            .build()
            .unwrap();
        PingReceiver::new(
            "test",
            config.receiver,
            Some(Arc::new(MockSink::new())),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let receiver = receiver();
        receiver.shutdown().await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Stopped);
        receiver.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let receiver = receiver();
        receiver.start().await.unwrap();
        let addr = receiver.local_addr().unwrap();
        receiver.start().await.unwrap();
        assert_eq!(receiver.local_addr(), Some(addr));
        assert_eq!(receiver.state(), ReceiverState::Running);

        receiver.shutdown().await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Stopped);
        receiver.start().await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure_stops_receiver() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ConfigBuilder::new()
            .endpoint(occupied.local_addr().unwrap().to_string())
            .build()
            .unwrap();
        let receiver = PingReceiver::new(
            "busy",
            config.receiver,
            None,
            Some(Arc::new(MockSink::new())),
        )
        .unwrap();

        assert!(matches!(
            receiver.start().await,
            Err(ServerError::BindError(_))
        ));
        assert_eq!(receiver.state(), ReceiverState::Stopped);
    }

    #[test]
    fn test_attach_keeps_existing_sink() {
        let receiver = receiver();
        assert!(receiver.sinks().metrics().is_some());
        assert!(receiver.sinks().logs().is_none());

        receiver.attach(
            Some(Arc::new(MockSink::new())),
            Some(Arc::new(MockSink::new())),
        );
        assert!(receiver.sinks().logs().is_some());
    }
}
