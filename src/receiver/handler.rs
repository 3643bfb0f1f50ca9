//! Ingress request handling
//!
//! One request runs: path match, method check, body read, JSON decode,
//! forward, metrics phase, logs phase, response. A metrics failure answers
//! 500 and skips the logs phase.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error};

use crate::error::ParseError;
use crate::otlp::converter::PingConverter;
use crate::otlp::exporter::{LogsSink, MetricsSink};
use crate::ping::Ping;
use crate::receiver::forwarder::PingForwarder;
use crate::receiver::path::PathTemplate;

/// Sink slots shared by every pipeline attached to one receiver
///
/// Each slot is filled at most once.
#[derive(Default)]
pub struct SinkSlots {
    metrics: OnceLock<Arc<dyn MetricsSink>>,
    logs: OnceLock<Arc<dyn LogsSink>>,
}

impl SinkSlots {
    /// Attach a metrics sink; returns false when one is already attached
    pub fn attach_metrics(&self, sink: Arc<dyn MetricsSink>) -> bool {
        self.metrics.set(sink).is_ok()
    }

    /// Attach a logs sink; returns false when one is already attached
    pub fn attach_logs(&self, sink: Arc<dyn LogsSink>) -> bool {
        self.logs.set(sink).is_ok()
    }

    /// The attached metrics sink
    pub fn metrics(&self) -> Option<&Arc<dyn MetricsSink>> {
        self.metrics.get()
    }

    /// The attached logs sink
    pub fn logs(&self) -> Option<&Arc<dyn LogsSink>> {
        self.logs.get()
    }
}

impl std::fmt::Debug for SinkSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSlots")
            .field("metrics", &self.metrics.get().is_some())
            .field("logs", &self.logs.get().is_some())
            .finish()
    }
}

/// Handles ingestion requests for one receiver
#[derive(Debug)]
pub struct IngressHandler {
    template: PathTemplate,
    max_body_bytes: usize,
    converter: PingConverter,
    forwarder: Arc<PingForwarder>,
    sinks: Arc<SinkSlots>,
}

impl IngressHandler {
    /// Create a handler for a path template
    pub fn new(
        template: PathTemplate,
        max_body_bytes: usize,
        forwarder: Arc<PingForwarder>,
        sinks: Arc<SinkSlots>,
    ) -> Self {
        Self {
            template,
            max_body_bytes,
            converter: PingConverter::new(),
            forwarder,
            sinks,
        }
    }

    /// Handle one request
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Some(params) = self.template.matches(request.uri().path()) else {
            debug!(path = %request.uri().path(), "No route for request path");
            return respond(StatusCode::NOT_FOUND, "Not Found");
        };

        if request.method() != Method::POST {
            return respond(
                StatusCode::METHOD_NOT_ALLOWED,
                "Only POST method is allowed",
            );
        }

        let (parts, body) = request.into_parts();
        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let e = body_error(e, self.max_body_bytes);
                error!(error = %e, "Failed to read request body");
                return respond(StatusCode::BAD_REQUEST, "Failed to read request body");
            }
        };

        let ping = match Ping::from_slice(&body) {
            Ok(ping) => ping,
            Err(e) => {
                error!(error = %e, "Failed to parse ping JSON");
                return respond(StatusCode::BAD_REQUEST, "Invalid JSON format");
            }
        };

        self.forwarder.forward(body, params, &parts.headers);

        if let Some(sink) = self.sinks.metrics().filter(|_| ping.has_metrics()) {
            let batch = match self.converter.convert_metrics(&ping) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Failed to convert ping to metrics");
                    return respond(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process metrics");
                }
            };
            if let Err(e) = sink.consume_metrics(batch).await {
                error!(error = %e, "Failed to consume metrics");
                return respond(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process metrics");
            }
        }

        if let Some(sink) = self.sinks.logs().filter(|_| !ping.events().is_empty()) {
            let batch = self.converter.convert_events(&ping);
            if let Err(e) = sink.consume_logs(batch).await {
                error!(error = %e, "Failed to consume event logs");
                return respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process event logs",
                );
            }
        }

        respond(StatusCode::OK, "OK")
    }
}

fn body_error(error: Box<dyn std::error::Error + Send + Sync>, limit: usize) -> ParseError {
    if error.is::<LengthLimitError>() {
        ParseError::BodyTooLarge { limit }
    } else {
        ParseError::Body(error.to_string())
    }
}

fn respond(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
