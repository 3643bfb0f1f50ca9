//! Configuration loader
//!
//! Loads configuration from YAML files, environment variables, or programmatic API.
//! Priority: environment variables > provided config or file > defaults

use std::env;
use std::str::FromStr;

use crate::config::types::{Config, ExporterProtocol};
use crate::error::ConfigError;
use tracing::{debug, info, warn};

/// Environment variable naming the YAML configuration file
pub const CONFIG_PATH_ENV: &str = "PING_RECEIVER_CONFIG";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from YAML file
    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        info!(
            config_path = %path.display(),
            "Loading configuration from YAML file"
        );

        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to read configuration file"
            );
            ConfigError::Read(format!("{}: {}", path.display(), e))
        })?;

        debug!(
            config_path = %path.display(),
            file_size_bytes = content.len(),
            "Read configuration file"
        );

        let config = Self::from_yaml_str(&content).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to load YAML configuration"
            );
            e
        })?;

        info!(
            config_path = %path.display(),
            id = %config.id,
            endpoint = %config.receiver.endpoint,
            path = %config.receiver.full_path(),
            forwarding = config.receiver.forward_url().is_some(),
            "Configuration loaded and validated successfully"
        );

        Ok(config)
    }

    /// Parse YAML content, apply environment overrides, and validate
    pub fn from_yaml_str(content: &str) -> Result<Config, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ValidationFailed(format!("Failed to parse YAML: {}", e)))?;

        Self::apply_env_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Config, ConfigError> {
        info!("Loading configuration from environment variables");
        Self::load(None)
    }

    /// Load configuration with priority: environment variables > provided config > defaults
    pub fn load(provided: Option<Config>) -> Result<Config, ConfigError> {
        if provided.is_some() {
            debug!("Loading configuration with provided config and environment variable overrides");
        } else {
            debug!("Loading configuration with defaults and environment variable overrides");
        }

        let mut config = provided.unwrap_or_default();

        Self::apply_env_overrides(&mut config);

        config.validate().map_err(|e| {
            warn!(
                error = %e,
                "Configuration validation failed"
            );
            e
        })?;

        info!(
            id = %config.id,
            endpoint = %config.receiver.endpoint,
            path = %config.receiver.full_path(),
            forwarding = config.receiver.forward_url().is_some(),
            exporter = ?config.exporter.protocol,
            "Configuration loaded and validated successfully"
        );

        Ok(config)
    }

    /// Load from the file named by `PING_RECEIVER_CONFIG`, or from the environment
    pub fn discover() -> Result<Config, ConfigError> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_yaml(path),
            _ => Self::from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(endpoint) = env::var("PING_RECEIVER_ENDPOINT") {
            debug!(
                env_var = "PING_RECEIVER_ENDPOINT",
                value = %endpoint,
                "Applying environment variable override"
            );
            config.receiver.endpoint = endpoint;
        }

        if let Ok(path) = env::var("PING_RECEIVER_PATH") {
            debug!(
                env_var = "PING_RECEIVER_PATH",
                value = %path,
                "Applying environment variable override"
            );
            config.receiver.path = path;
        }

        if let Ok(url) = env::var("PING_RECEIVER_FORWARD_URL") {
            debug!(
                env_var = "PING_RECEIVER_FORWARD_URL",
                value = %url,
                "Applying environment variable override"
            );
            config.receiver.forward_url = Some(url);
        }

        if let Some(bytes) = parse_env::<usize>("PING_RECEIVER_MAX_REQUEST_BODY_BYTES") {
            config.receiver.max_request_body_bytes = bytes;
        }

        if let Some(ms) = parse_env::<u64>("PING_RECEIVER_FORWARD_TIMEOUT_MS") {
            config.receiver.forward_timeout_ms = ms;
        }

        if let Some(size) = parse_env::<usize>("PING_RECEIVER_FORWARD_QUEUE_SIZE") {
            config.receiver.forward_queue_size = size;
        }

        if let Some(limit) = parse_env::<usize>("PING_RECEIVER_FORWARD_MAX_CONCURRENCY") {
            config.receiver.forward_max_concurrency = limit;
        }

        if let Ok(protocol) = env::var("PING_RECEIVER_EXPORTER_PROTOCOL") {
            config.exporter.protocol = match protocol.to_lowercase().as_str() {
                "logging" => ExporterProtocol::Logging,
                "http_protobuf" | "http/protobuf" | "http" => ExporterProtocol::HttpProtobuf,
                "grpc" => ExporterProtocol::Grpc,
                _ => {
                    warn!(
                        env_var = "PING_RECEIVER_EXPORTER_PROTOCOL",
                        value = %protocol,
                        "Unknown exporter protocol, keeping configured value"
                    );
                    config.exporter.protocol
                }
            };
        }

        if let Ok(endpoint) = env::var("PING_RECEIVER_EXPORTER_ENDPOINT") {
            config.exporter.endpoint = Some(endpoint);
        }
    }
}

fn parse_env<T>(name: &'static str) -> Option<T>
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => {
            debug!(
                env_var = name,
                value = %value,
                "Applying environment variable override"
            );
            Some(value)
        }
        Err(e) => {
            warn!(
                env_var = name,
                value = %raw,
                error = %e,
                "Failed to parse environment variable, using default"
            );
            None
        }
    }
}
