//! Configuration Module
//!
//! Environment-driven configuration for the gateway process.

mod settings;

pub use settings::{AclSource, BufferSettings, ConfigError, GatewayConfig, ServerSettings};
