//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the interceptor chain, the gateway lifecycle, the
//! stream drivers and the port interfaces they depend on.

/// Call error taxonomy and gRPC status mapping.
pub mod error;

/// Gateway composition root and shutdown contract.
pub mod gateway;

/// Interceptor chain and built-in stages.
pub mod interceptor;

/// Port interfaces for publishing, subscriptions and stream sinks.
pub mod ports;

/// Live log and statistics stream drivers.
pub mod services;
