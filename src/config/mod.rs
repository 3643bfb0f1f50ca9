//! Configuration module
//!
//! Provides configuration management for the ping receiver including
//! loading from YAML files, environment variables, and programmatic API.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{
    Config, ConfigBuilder, ExporterConfig, ExporterProtocol, PipelinesConfig, ReceiverConfig,
};
