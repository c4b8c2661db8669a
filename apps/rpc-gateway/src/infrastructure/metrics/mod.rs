//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Calls**: Calls by method and outcome, plus handler latency
//! - **Event bus**: Events delivered to and dropped for subscribers
//! - **Streams**: Live subscriptions and admin stream lifetimes
//! - **Statistics**: Snapshots emitted by aggregators
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Calls
    describe_counter!(
        "rpc_gateway_calls_total",
        "Total calls by method and outcome"
    );
    describe_histogram!(
        "rpc_gateway_call_duration_seconds",
        "Time from chain entry to handler completion for admitted calls"
    );

    // Event bus
    describe_counter!(
        "rpc_gateway_events_delivered_total",
        "Total call events delivered to subscriber buffers"
    );
    describe_counter!(
        "rpc_gateway_events_dropped_total",
        "Total call events dropped because a subscriber buffer was full"
    );
    describe_gauge!(
        "rpc_gateway_subscribers",
        "Number of live event bus subscriptions"
    );

    // Streams
    describe_counter!(
        "rpc_gateway_streams_opened_total",
        "Total admin streams opened by kind"
    );
    describe_counter!(
        "rpc_gateway_streams_closed_total",
        "Total admin streams closed by kind and reason"
    );
    describe_histogram!(
        "rpc_gateway_stream_duration_seconds",
        "Lifetime of admin streams"
    );

    // Statistics
    describe_counter!(
        "rpc_gateway_snapshots_emitted_total",
        "Total statistics snapshots sent to callers"
    );
    describe_histogram!(
        "rpc_gateway_snapshot_calls",
        "Calls counted per emitted statistics snapshot"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for admin stream kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `Admin.Logging`.
    Logging,
    /// `Admin.Statistics`.
    Statistics,
}

impl StreamKind {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logging => "logging",
            Self::Statistics => "statistics",
        }
    }
}

/// Record a finished call.
pub fn record_call(method: &str, outcome: &'static str) {
    counter!(
        "rpc_gateway_calls_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record handler latency for an admitted call.
pub fn record_call_duration(method: &str, duration: Duration) {
    histogram!(
        "rpc_gateway_call_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the result of offering one event to every subscriber.
pub fn record_event_published(delivered: usize, dropped: usize) {
    counter!("rpc_gateway_events_delivered_total").increment(delivered as u64);
    if dropped > 0 {
        counter!("rpc_gateway_events_dropped_total").increment(dropped as u64);
    }
}

/// Update the live subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!("rpc_gateway_subscribers").set(count as f64);
}

/// Record an admin stream being opened.
pub fn record_stream_opened(kind: StreamKind) {
    counter!(
        "rpc_gateway_streams_opened_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record an admin stream ending.
pub fn record_stream_closed(kind: StreamKind, reason: &'static str, lifetime: Duration) {
    counter!(
        "rpc_gateway_streams_closed_total",
        "kind" => kind.as_str(),
        "reason" => reason
    )
    .increment(1);
    histogram!(
        "rpc_gateway_stream_duration_seconds",
        "kind" => kind.as_str()
    )
    .record(lifetime.as_secs_f64());
}

/// Record a statistics snapshot sent to a caller.
#[allow(clippy::cast_precision_loss)]
pub fn record_snapshot_emitted(calls: u64) {
    counter!("rpc_gateway_snapshots_emitted_total").increment(1);
    histogram!("rpc_gateway_snapshot_calls").record(calls as f64);
}

// =============================================================================
// Tests
// =============================================================================
