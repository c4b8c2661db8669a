//! Built-in chain stages: extract, authorize, telemetry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{CallScope, Stage};
use crate::application::error::CallError;
use crate::application::ports::EventPublisher;
use crate::domain::access::AccessPolicy;
use crate::domain::event::{CallEvent, MethodPath};

/// Metadata key carrying the caller identity.
pub const CONSUMER_METADATA_KEY: &str = "consumer";

// =============================================================================
// Extract
// =============================================================================

/// Builds the call event from metadata, peer address and method path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractStage;

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> &'static str {
        "extract"
    }

    async fn process(&self, scope: &mut CallScope) -> Result<(), CallError> {
        let incoming = scope.incoming();

        if MethodPath::parse(incoming.method()).is_none() {
            return Err(CallError::Internal(format!(
                "malformed method path {:?}",
                incoming.method()
            )));
        }

        let consumer = incoming
            .metadata()
            .get(CONSUMER_METADATA_KEY)
            .ok_or_else(|| CallError::Unauthenticated("missing consumer metadata".to_string()))?
            .to_str()
            .map_err(|_| CallError::Unauthenticated("consumer metadata is not printable".to_string()))?;

        if consumer.trim().is_empty() {
            return Err(CallError::Unauthenticated(
                "consumer metadata is empty".to_string(),
            ));
        }
        if consumer.trim() != consumer {
            return Err(CallError::Unauthenticated(
                "consumer metadata has surrounding whitespace".to_string(),
            ));
        }

        let host = incoming
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();

        let event = CallEvent::new(host, incoming.method(), consumer, Utc::now().timestamp());
        scope.set_event(event);
        Ok(())
    }
}

// =============================================================================
// Authorize
// =============================================================================

/// Rejects calls the access policy does not allow.
#[derive(Debug, Clone)]
pub struct AuthorizeStage {
    policy: Arc<AccessPolicy>,
}

impl AuthorizeStage {
    /// Create an authorize stage over a shared policy.
    #[must_use]
    pub const fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for AuthorizeStage {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn process(&self, scope: &mut CallScope) -> Result<(), CallError> {
        let event = scope.event().ok_or_else(|| {
            CallError::Internal("call event missing before authorization".to_string())
        })?;

        if self.policy.allowed(&event.consumer, &event.method) {
            Ok(())
        } else {
            Err(CallError::Unauthenticated(format!(
                "method {} is not allowed for {}",
                event.method, event.consumer
            )))
        }
    }
}

// =============================================================================
// Telemetry
// =============================================================================

/// Publishes the call event to live subscribers.
pub struct TelemetryStage {
    publisher: Arc<dyn EventPublisher>,
}

impl TelemetryStage {
    /// Create a telemetry stage over a publisher.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Stage for TelemetryStage {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn process(&self, scope: &mut CallScope) -> Result<(), CallError> {
        let event = scope.event().ok_or_else(|| {
            CallError::Internal("call event missing before telemetry".to_string())
        })?;

        let outcome = self.publisher.publish(event);
        tracing::trace!(
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "Call event published"
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
