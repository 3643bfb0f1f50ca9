//! Error types for the ping receiver
//!
//! Defines all error types used throughout the library. Only parse, conversion
//! and consume errors ever reach an HTTP response; forward errors are logged
//! and dropped, configuration errors are fatal at startup.

use thiserror::Error;

/// Main error type for the ping receiver
#[derive(Error, Debug)]
pub enum PingReceiverError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request body could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Ping could not be converted to records
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// A sink rejected a converted batch
    #[error("Consume error: {0}")]
    Consume(#[from] ConsumeError),

    /// Forwarding to the downstream endpoint failed
    #[error("Forward error: {0}")]
    Forward(#[from] ForwardError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server-related errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid ingestion path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid URL format
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    /// Invalid listen endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Missing required configuration field
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    Read(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors decoding an inbound ping
#[derive(Error, Debug)]
pub enum ParseError {
    /// Request body could not be read
    #[error("Failed to read request body: {0}")]
    Body(String),

    /// Request body exceeded the configured limit
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },

    /// Request body is not a valid ping document
    #[error("Invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors converting a ping into metric records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// A distribution's `values` field is not a mapping
    #[error("invalid distribution values format for {metric}: expected object, found {found}")]
    InvalidDistributionValues {
        /// Full dotted metric name
        metric: String,
        /// JSON type that was found instead
        found: &'static str,
    },
}

/// Errors raised by a metrics or logs sink
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// The sink refused the batch
    #[error("Sink rejected batch: {0}")]
    Rejected(String),

    /// The export transport failed
    #[error("Export failed: {0}")]
    Export(String),
}

/// Errors forwarding a raw ping downstream
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The downstream URL could not be built
    #[error("Failed to create full url: {0}")]
    InvalidUrl(String),

    /// A header could not be copied onto the forward request
    #[error("Invalid forward header {name}: {reason}")]
    InvalidHeader {
        /// Header name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// The request could not be sent or timed out
    #[error("Failed to forward ping: {0}")]
    Transport(#[from] reqwest::Error),

    /// Downstream answered with an error status
    #[error("Downstream returned error {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if readable
        body: String,
    },

    /// Forward queue is full
    #[error("Forward queue is full")]
    QueueFull,

    /// Forwarder has been shut down
    #[error("Forwarder is shut down")]
    Closed,
}

/// Server-related errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind server address
    #[error("Failed to bind server address: {0}")]
    BindError(String),

    /// Failed to start server
    #[error("Failed to start server: {0}")]
    StartupError(String),

    /// Receiver creation was refused
    #[error("Failed to create receiver: {0}")]
    CreateError(String),
}

impl From<anyhow::Error> for PingReceiverError {
    fn from(err: anyhow::Error) -> Self {
        PingReceiverError::Io(std::io::Error::other(err.to_string()))
    }
}
