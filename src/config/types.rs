//! Configuration type definitions
//!
//! Defines all configuration structures for the ping receiver.

use reqwest::header::{HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;
use crate::receiver::path::complete_path_template;

/// Protocol used to export converted records to the downstream pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterProtocol {
    /// Write records to the structured log only
    #[default]
    Logging,
    /// OTLP over HTTP with Protobuf bodies (`/v1/metrics`, `/v1/logs`)
    HttpProtobuf,
    /// OTLP over gRPC
    Grpc,
}

/// Downstream exporter settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Export protocol (default: logging)
    #[serde(default)]
    pub protocol: ExporterProtocol,

    /// Collector endpoint, required unless the protocol is `logging`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-export timeout in milliseconds (default: 10000)
    #[serde(default = "default_exporter_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            protocol: ExporterProtocol::default(),
            endpoint: None,
            timeout_ms: default_exporter_timeout_ms(),
        }
    }
}

impl ExporterConfig {
    /// Validate exporter configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "Exporter timeout must be greater than 0".to_string(),
            ));
        }

        if self.protocol == ExporterProtocol::Logging {
            return Ok(());
        }

        match self.endpoint.as_deref() {
            None | Some("") => Err(ConfigError::MissingRequiredField(format!(
                "exporter.endpoint is required for protocol {:?}",
                self.protocol
            ))),
            Some(url) => validate_http_url(url, "exporter.endpoint"),
        }
    }

    /// Export timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which pipelines attach a sink to the shared receiver
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PipelinesConfig {
    /// Attach a metrics sink (default: true)
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Attach a logs sink (default: true)
    #[serde(default = "default_true")]
    pub logs: bool,
}

impl Default for PipelinesConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            logs: true,
        }
    }
}

/// HTTP listener and forwarding settings for one receiver
///
/// # Default Values
///
/// - `endpoint`: `localhost:9888`
/// - `read_header_timeout_secs`: `20`
/// - `path`: `/submit/telemetry`
/// - `max_request_body_bytes`: `10485760`
/// - `forward_timeout_ms`: `30000`
/// - `forward_queue_size`: `1000`
/// - `forward_max_concurrency`: `16`
///
/// Forwarding is disabled unless `forward_url` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    /// Listen address as `host:port` (default: localhost:9888)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum time to wait for request headers in seconds (default: 20)
    #[serde(default = "default_read_header_timeout_secs")]
    pub read_header_timeout_secs: u64,

    /// Path prefix for ingestion; the four document placeholders are appended
    /// when missing (default: /submit/telemetry)
    #[serde(default = "default_path")]
    pub path: String,

    /// Largest accepted request body (default: 10 MiB)
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,

    /// Downstream endpoint receiving the raw ping; forwarding is disabled when unset
    #[serde(default)]
    pub forward_url: Option<String>,

    /// Headers added to forwarded requests, overriding inbound headers of the same name
    #[serde(default)]
    pub forward_headers: HashMap<String, SecretString>,

    /// Forward request timeout in milliseconds; 0 selects the default (default: 30000)
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,

    /// Pending forwards held before new ones are dropped (default: 1000)
    #[serde(default = "default_forward_queue_size")]
    pub forward_queue_size: usize,

    /// Forwards sent at the same time (default: 16)
    #[serde(default = "default_forward_max_concurrency")]
    pub forward_max_concurrency: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            read_header_timeout_secs: default_read_header_timeout_secs(),
            path: default_path(),
            max_request_body_bytes: default_max_request_body_bytes(),
            forward_url: None,
            forward_headers: HashMap::new(),
            forward_timeout_ms: default_forward_timeout_ms(),
            forward_queue_size: default_forward_queue_size(),
            forward_max_concurrency: default_forward_max_concurrency(),
        }
    }
}

impl ReceiverConfig {
    /// Validate receiver configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(ConfigError::InvalidPath("path cannot be empty".to_string()));
        }

        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(format!(
                "path must start with '/': {}",
                self.path
            )));
        }

        validate_endpoint(&self.endpoint)?;

        if self.max_request_body_bytes == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_request_body_bytes must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = self.forward_url() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidUrl(
                    "forward_url must start with http:// or https://".to_string(),
                ));
            }
            validate_http_url(url, "forward_url")?;
        }

        for (name, value) in &self.forward_headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::ValidationFailed(format!("Invalid forward header name {name}: {e}"))
            })?;
            HeaderValue::from_str(value.expose_secret()).map_err(|e| {
                ConfigError::ValidationFailed(format!(
                    "Invalid value for forward header {name}: {e}"
                ))
            })?;
        }

        if self.forward_queue_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "forward_queue_size must be greater than 0".to_string(),
            ));
        }

        if self.forward_max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "forward_max_concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Ingestion path with the document placeholders completed
    pub fn full_path(&self) -> String {
        complete_path_template(&self.path)
    }

    /// Configured forward URL, treating an empty string as unset
    pub fn forward_url(&self) -> Option<&str> {
        self.forward_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Forward timeout, falling back to 30 seconds when unset
    pub fn forward_timeout(&self) -> Duration {
        if self.forward_timeout_ms == 0 {
            Duration::from_millis(default_forward_timeout_ms())
        } else {
            Duration::from_millis(self.forward_timeout_ms)
        }
    }

    /// Header read timeout as a duration
    pub fn read_header_timeout(&self) -> Duration {
        Duration::from_secs(self.read_header_timeout_secs)
    }
}

/// Main configuration structure for the ping receiver service
///
/// # Configuration Sources
///
/// Configuration can be loaded from:
/// - YAML files
/// - Environment variables (with `PING_RECEIVER_*` prefix)
/// - Programmatic API (using `ConfigBuilder`)
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ping_otlp_receiver::ConfigBuilder::new()
///     .endpoint("0.0.0.0:9888")
///     .forward_url("https://ingestion.example.com/submit")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Registry identity shared by the metrics and logs pipelines (default: glean)
    #[serde(default = "default_id")]
    pub id: String,

    /// HTTP listener and forwarding settings
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Downstream exporter settings
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Enabled pipelines
    #[serde(default)]
    pub pipelines: PipelinesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: default_id(),
            receiver: ReceiverConfig::default(),
            exporter: ExporterConfig::default(),
            pipelines: PipelinesConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::MissingRequiredField("id".to_string()));
        }

        self.receiver.validate()?;
        self.exporter.validate()?;

        if !self.pipelines.metrics && !self.pipelines.logs {
            return Err(ConfigError::ValidationFailed(
                "At least one pipeline (metrics or logs) must be enabled".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for creating configurations programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the registry identity
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the listen address
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.receiver.endpoint = endpoint.into();
        self
    }

    /// Set the ingestion path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.receiver.path = path.into();
        self
    }

    /// Set the request body limit
    pub fn max_request_body_bytes(mut self, bytes: usize) -> Self {
        self.config.receiver.max_request_body_bytes = bytes;
        self
    }

    /// Enable forwarding to the given URL
    pub fn forward_url(mut self, url: impl Into<String>) -> Self {
        self.config.receiver.forward_url = Some(url.into());
        self
    }

    /// Add a header to forwarded requests
    pub fn forward_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .receiver
            .forward_headers
            .insert(name.into(), SecretString::new(value.into()));
        self
    }

    /// Set the forward timeout
    pub fn forward_timeout(mut self, timeout: Duration) -> Self {
        self.config.receiver.forward_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the forward queue size
    pub fn forward_queue_size(mut self, size: usize) -> Self {
        self.config.receiver.forward_queue_size = size;
        self
    }

    /// Set the forward concurrency limit
    pub fn forward_max_concurrency(mut self, limit: usize) -> Self {
        self.config.receiver.forward_max_concurrency = limit;
        self
    }

    /// Set the exporter configuration
    pub fn exporter(mut self, exporter: ExporterConfig) -> Self {
        self.config.exporter = exporter;
        self
    }

    /// Enable or disable the metrics and logs pipelines
    pub fn pipelines(mut self, metrics: bool, logs: bool) -> Self {
        self.config.pipelines = PipelinesConfig { metrics, logs };
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let Some((host, port)) = endpoint.rsplit_once(':') else {
        return Err(ConfigError::InvalidEndpoint(format!(
            "endpoint must be host:port, got {endpoint:?}"
        )));
    };
    if port.parse::<u16>().is_err() {
        return Err(ConfigError::InvalidEndpoint(format!(
            "invalid port in endpoint {endpoint:?}"
        )));
    }
    if host.is_empty() {
        return Err(ConfigError::InvalidEndpoint(format!(
            "missing host in endpoint {endpoint:?}"
        )));
    }
    Ok(())
}

fn validate_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{field} is not a valid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl(format!(
            "{field} must use http:// or https:// scheme, got {scheme}"
        ))),
    }
}

// Default value functions
fn default_id() -> String {
    "glean".to_string()
}

fn default_endpoint() -> String {
    "localhost:9888".to_string()
}

fn default_read_header_timeout_secs() -> u64 {
    20
}

fn default_path() -> String {
    "/submit/telemetry".to_string()
}

fn default_max_request_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_forward_timeout_ms() -> u64 {
    30_000
}

fn default_forward_queue_size() -> usize {
    1000
}

fn default_forward_max_concurrency() -> usize {
    16
}

fn default_exporter_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}
