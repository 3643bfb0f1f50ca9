//! Raw ping forwarding
//!
//! Relays the unmodified request body to a secondary HTTP endpoint. Forwards
//! are queued on a bounded channel and sent by a dispatcher task that runs a
//! limited number of requests at once. Failures are logged and dropped; they
//! never reach the ingestion response.

use bytes::Bytes;
use reqwest::header::{
    CONNECTION, CONTENT_LENGTH, HOST, HeaderMap, HeaderName, HeaderValue, TRANSFER_ENCODING,
};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ReceiverConfig;
use crate::error::ForwardError;
use crate::receiver::path::PathParams;

/// Inbound headers that describe the original connection and are not relayed
const SKIPPED_HEADERS: [HeaderName; 4] = [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION];

/// One queued forward
#[derive(Debug)]
struct ForwardRequest {
    body: Bytes,
    params: PathParams,
    headers: HeaderMap,
}

/// Everything needed to send a forward
#[derive(Debug)]
struct ForwardTarget {
    client: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
}

impl ForwardTarget {
    async fn send(&self, request: ForwardRequest) -> Result<u16, ForwardError> {
        let url = forward_url(&self.base_url, &request.params)?;
        let headers = merge_headers(&request.headers, &self.headers);

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ForwardError::Status { status, body });
        }

        Ok(status)
    }
}

#[derive(Debug)]
struct ForwarderInner {
    target: Arc<ForwardTarget>,
    sender: Mutex<Option<mpsc::Sender<ForwardRequest>>>,
    pending: Mutex<Option<mpsc::Receiver<ForwardRequest>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    max_concurrency: usize,
    timeout: Duration,
}

/// Best-effort forwarder for raw pings
///
/// Disabled (every call a no-op) when no forward URL is configured.
#[derive(Debug)]
pub struct PingForwarder {
    inner: Option<ForwarderInner>,
}

impl PingForwarder {
    /// Create a forwarder from receiver configuration
    pub fn new(config: &ReceiverConfig) -> Result<Self, ForwardError> {
        let Some(raw_url) = config.forward_url() else {
            return Ok(Self::disabled());
        };

        let base_url = Url::parse(raw_url)
            .map_err(|e| ForwardError::InvalidUrl(format!("{raw_url}: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.forward_headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ForwardError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let mut header_value = HeaderValue::from_str(value.expose_secret()).map_err(|e| {
                ForwardError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            header_value.set_sensitive(true);
            headers.insert(header_name, header_value);
        }

        let timeout = config.forward_timeout();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (sender, receiver) = mpsc::channel(config.forward_queue_size.max(1));

        info!(
            forward_url = %base_url,
            timeout_ms = timeout.as_millis() as u64,
            queue_size = config.forward_queue_size,
            max_concurrency = config.forward_max_concurrency,
            custom_headers = headers.len(),
            "Created ping forwarder"
        );

        Ok(Self {
            inner: Some(ForwarderInner {
                target: Arc::new(ForwardTarget {
                    client,
                    base_url,
                    headers,
                }),
                sender: Mutex::new(Some(sender)),
                pending: Mutex::new(Some(receiver)),
                dispatcher: Mutex::new(None),
                max_concurrency: config.forward_max_concurrency.max(1),
                timeout,
            }),
        })
    }

    /// A forwarder that never sends anything
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Whether a forward URL is configured
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Start the dispatcher task
    ///
    /// Forwards queued before this call are sent once it runs. Calling it
    /// again is a no-op.
    pub fn start(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        let Some(receiver) = inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let handle = tokio::spawn(dispatch(
            receiver,
            Arc::clone(&inner.target),
            inner.max_concurrency,
        ));
        *inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Queue a raw ping for forwarding
    ///
    /// Never fails from the caller's point of view; a full queue drops the
    /// new forward with a warning.
    pub fn forward(&self, body: Bytes, params: PathParams, headers: &HeaderMap) {
        match self.enqueue(body, params, headers) {
            Ok(()) => {}
            Err(ForwardError::QueueFull) => {
                warn!("Forward queue is full, dropping ping");
            }
            Err(e) => {
                debug!(error = %e, "Ping not forwarded");
            }
        }
    }

    fn enqueue(
        &self,
        body: Bytes,
        params: PathParams,
        headers: &HeaderMap,
    ) -> Result<(), ForwardError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let sender = inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ForwardError::Closed)?;

        sender
            .try_send(ForwardRequest {
                body,
                params,
                headers: headers.clone(),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => ForwardError::QueueFull,
                TrySendError::Closed(_) => ForwardError::Closed,
            })
    }

    /// Stop accepting forwards and wait for queued and in-flight ones
    ///
    /// The wait is bounded by the forward timeout; anything still running
    /// after that is aborted.
    pub async fn shutdown(&self) {
        let Some(inner) = &self.inner else {
            return;
        };

        inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let handle = inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        let abort = handle.abort_handle();
        if tokio::time::timeout(inner.timeout, handle).await.is_err() {
            warn!(
                timeout_ms = inner.timeout.as_millis() as u64,
                "Timed out waiting for in-flight forwards, aborting"
            );
            abort.abort();
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<ForwardRequest>,
    target: Arc<ForwardTarget>,
    max_concurrency: usize,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let mut in_flight = JoinSet::new();

    while let Some(request) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let target = Arc::clone(&target);

        in_flight.spawn(async move {
            let _permit = permit;
            match target.send(request).await {
                Ok(status) => debug!(
                    forward_url = %target.base_url,
                    status,
                    "Forwarded raw ping"
                ),
                Err(e) => error!(
                    forward_url = %target.base_url,
                    error = %e,
                    "Failed to forward ping to downstream"
                ),
            }
        });

        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}

/// Join the forward base URL with the document identifiers
///
/// Segments are taken as they appeared in the request path, so already
/// percent-encoded values are not encoded twice.
pub fn forward_url(base: &Url, params: &PathParams) -> Result<Url, ForwardError> {
    if base.cannot_be_a_base() {
        return Err(ForwardError::InvalidUrl(format!(
            "{base} cannot be used as a base URL"
        )));
    }

    let mut url = base.clone();
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        params.segments().join("/")
    );
    url.set_path(&path);
    Ok(url)
}

/// Inbound headers minus connection headers, with configured headers overlaid
pub fn merge_headers(inbound: &HeaderMap, configured: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in &SKIPPED_HEADERS {
        headers.remove(name);
    }
    for (name, value) in configured {
        headers.insert(name.clone(), value.clone());
    }
    headers
}
