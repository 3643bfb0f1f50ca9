//! Telemetry ping model
//!
//! The decoded form of one inbound submission. A ping is built per request and
//! dropped once conversion finishes.

pub mod model;

pub use model::{
    Bucket, ClientInfo, Distribution, DistributionValues, Event, MetricCategories, MetricValue,
    Ping, PingInfo, Rate,
};
