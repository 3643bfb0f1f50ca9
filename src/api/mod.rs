//! Service API
//!
//! Wires configuration, sinks, registry and receiver together for embedded or
//! standalone use.

pub mod public;
