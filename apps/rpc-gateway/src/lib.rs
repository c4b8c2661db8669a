#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! RPC Gateway - Intercepted gRPC Services with Live Telemetry
//!
//! A gRPC server whose every call passes through an interceptor chain that
//! identifies the consumer, checks it against an access table and publishes
//! a call event. Admin clients watch those events live or as windowed
//! statistics.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types with no I/O
//!   - `access`: Consumer → method access table
//!   - `event`: Per-call telemetry record
//!   - `stats`: Windowed call counts
//!
//! - **Application**: Use cases and port definitions
//!   - `interceptor`: Extract → authorize → telemetry chain
//!   - `gateway`: Call admission and shutdown ordering
//!   - `services`: Live log and statistics stream drivers
//!   - `ports`: Publisher, registry, event source and sink interfaces
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `bus`: Bounded publish/subscribe registry
//!   - `grpc`: Admin and Biz tonic services
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!               ┌─────────────────────────────────┐
//! Biz call ────►│ extract ─► authorize ─► publish │───► handler
//!               └────────────────┬────────────────┘
//!                                ▼
//!                          ┌───────────┐    ┌─────────────┐
//!                          │ Event Bus │───►│ Logging     │──► admin client
//!                          └───────────┘    │ Statistics  │──► admin client
//!                                           └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Access table, call events and statistics windows.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::access::{AccessPolicy, AccessTableError, MethodMatching, MethodPattern};
pub use domain::event::CallEvent;
pub use domain::stats::{StatSnapshot, StatWindow};

// Application
pub use application::error::CallError;
pub use application::gateway::{Gateway, SharedGateway};
pub use application::interceptor::{
    CONSUMER_METADATA_KEY, CallPath, CallScope, IncomingCall, InterceptorChain, Stage,
};

// Infrastructure config
pub use infrastructure::config::{
    AclSource, BufferSettings, ConfigError, GatewayConfig, ServerSettings,
};

// Event bus
pub use infrastructure::bus::{BusStats, EventBus, SharedEventBus, Subscription};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// gRPC services (for integration tests)
pub use infrastructure::grpc::{
    AdminService, BizService, CallPathLayer, build_gateway, call_path_layer, methods,
    proto::gateway::v1 as proto,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
