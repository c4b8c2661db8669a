//! Domain Layer - Core gateway types and policy logic.
//!
//! This layer contains the access policy, the per-call event record and the
//! statistics window fold. Nothing here touches the network or the runtime.

/// Consumer access policy and method matching.
pub mod access;

/// Per-call telemetry events.
pub mod event;

/// Windowed call statistics.
pub mod stats;
