//! Interceptor Chain
//!
//! Ordered cross-cutting stages wrapped around every call handler, unary and
//! streaming alike.
//!
//! # Flow
//!
//! ```text
//! IncomingCall ──► extract ──► authorize ──► telemetry ──► handler(CallScope)
//!                     │            │             │
//!                     └────────────┴─────────────┴──► Status (short-circuit)
//! ```
//!
//! Each stage reads and writes an explicit per-call [`CallScope`]. The first
//! stage error stops the chain: later stages and the handler never run, so a
//! rejected call is never published as an event.

mod stages;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tonic::Status;
use tonic::metadata::MetadataMap;
use tracing::Instrument;
use uuid::Uuid;

pub use stages::{AuthorizeStage, CONSUMER_METADATA_KEY, ExtractStage, TelemetryStage};

use super::error::CallError;
use super::ports::EventPublisher;
use crate::domain::access::AccessPolicy;
use crate::domain::event::CallEvent;
use crate::infrastructure::metrics;

// =============================================================================
// Incoming Call
// =============================================================================

/// Request extension carrying the method path the transport routed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPath(pub String);

/// Transport-independent view of an inbound call.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    method: String,
    metadata: MetadataMap,
    remote_addr: Option<SocketAddr>,
}

impl IncomingCall {
    /// Create an incoming call from its parts.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        metadata: MetadataMap,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: method.into(),
            metadata,
            remote_addr,
        }
    }

    /// Capture method, metadata and peer address from a tonic request.
    ///
    /// The method comes from the request's [`CallPath`] extension when the
    /// transport recorded one, and from `fallback` otherwise.
    #[must_use]
    pub fn from_request<T>(request: &tonic::Request<T>, fallback: &str) -> Self {
        let method = request
            .extensions()
            .get::<CallPath>()
            .map_or(fallback, |path| path.0.as_str());

        Self::new(method, request.metadata().clone(), request.remote_addr())
    }

    /// Fully qualified method path.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Call metadata.
    #[must_use]
    pub const fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Peer address, if the transport knows it.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

// =============================================================================
// Call Scope
// =============================================================================

/// Per-call record threaded through the stages and into the handler.
#[derive(Debug)]
pub struct CallScope {
    call_id: Uuid,
    incoming: IncomingCall,
    event: Option<CallEvent>,
}

impl CallScope {
    /// Open a scope for a new call.
    #[must_use]
    pub fn new(incoming: IncomingCall) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            incoming,
            event: None,
        }
    }

    /// Unique id of this call, for log correlation.
    #[must_use]
    pub const fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// The inbound call.
    #[must_use]
    pub const fn incoming(&self) -> &IncomingCall {
        &self.incoming
    }

    /// The call event, once extracted.
    #[must_use]
    pub const fn event(&self) -> Option<&CallEvent> {
        self.event.as_ref()
    }

    /// Attach the extracted call event.
    pub fn set_event(&mut self, event: CallEvent) {
        self.event = Some(event);
    }

    /// Consume the scope, returning the call event.
    #[must_use]
    pub fn into_event(self) -> Option<CallEvent> {
        self.event
    }
}

// =============================================================================
// Stages
// =============================================================================

/// One cross-cutting step applied to every call before its handler.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Inspect or enrich the call scope.
    ///
    /// # Errors
    ///
    /// Returns a `CallError` to reject the call.
    async fn process(&self, scope: &mut CallScope) -> Result<(), CallError>;
}

// =============================================================================
// Chain
// =============================================================================

/// Ordered list of stages, composed once at startup.
pub struct InterceptorChain {
    stages: Vec<Box<dyn Stage>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl InterceptorChain {
    /// Create a chain from stages, applied in order.
    #[must_use]
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The standard extract → authorize → telemetry chain.
    #[must_use]
    pub fn standard(policy: Arc<AccessPolicy>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::new(vec![
            Box::new(ExtractStage),
            Box::new(AuthorizeStage::new(policy)),
            Box::new(TelemetryStage::new(publisher)),
        ])
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage, then the handler with the resulting scope.
    ///
    /// # Errors
    ///
    /// Returns the first stage's error, or the handler's error, as a gRPC
    /// status.
    pub async fn intercept<T, F, Fut>(&self, incoming: IncomingCall, handler: F) -> Result<T, Status>
    where
        T: Send,
        F: FnOnce(CallScope) -> Fut + Send,
        Fut: Future<Output = Result<T, CallError>> + Send,
    {
        let method = incoming.method().to_string();
        let mut scope = CallScope::new(incoming);
        let span = tracing::info_span!(
            "call",
            call_id = %scope.call_id(),
            method = %method,
        );

        async move {
            let started = Instant::now();

            for stage in &self.stages {
                if let Err(err) = stage.process(&mut scope).await {
                    tracing::warn!(
                        stage = stage.name(),
                        code = ?err.grpc_code(),
                        error = %err,
                        "Call rejected"
                    );
                    metrics::record_call(&method, err.kind());
                    return Err(err.into());
                }
            }

            let result = handler(scope).await;
            let outcome = result.as_ref().map_or_else(CallError::kind, |_| "ok");
            metrics::record_call(&method, outcome);
            metrics::record_call_duration(&method, started.elapsed());

            match &result {
                Ok(_) => tracing::debug!("Call completed"),
                Err(err) => tracing::info!(error = %err, "Call failed"),
            }

            result.map_err(Into::into)
        }
        .instrument(span)
        .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tonic::Code;
    use tonic::metadata::MetadataValue;

    use super::*;
    use crate::application::ports::{MockEventPublisher, NoOpEventPublisher, PublishOutcome};

    const CHECK: &str = "/gateway.v1.Biz/Check";
    const ADD: &str = "/gateway.v1.Biz/Add";

    fn call(method: &str, consumer: Option<&str>) -> IncomingCall {
        let mut metadata = MetadataMap::new();
        if let Some(consumer) = consumer {
            metadata.insert(CONSUMER_METADATA_KEY, MetadataValue::try_from(consumer).unwrap());
        }
        IncomingCall::new(method, metadata, Some("127.0.0.1:40000".parse().unwrap()))
    }

    fn policy() -> Arc<AccessPolicy> {
        Arc::new(AccessPolicy::from_json(r#"{"alice": ["*"], "bob": ["Check"]}"#).unwrap())
    }

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Stage for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn process(&self, _scope: &mut CallScope) -> Result<(), CallError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(CallError::Internal(self.name.to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn stages_run_in_order_and_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = |name, fail| -> Box<dyn Stage> {
            Box::new(Recording {
                name,
                log: Arc::clone(&log),
                fail,
            })
        };
        let chain = InterceptorChain::new(vec![
            stage("first", false),
            stage("second", true),
            stage("third", false),
        ]);

        let handler_ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&handler_ran);
        let result = chain
            .intercept(call(CHECK, Some("alice")), |_scope| async move {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().code(), Code::Internal);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert!(!*handler_ran.lock().unwrap());
    }

    #[tokio::test]
    async fn admitted_call_publishes_once_and_reaches_handler() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|e| e.consumer == "bob" && e.method == CHECK && e.host == "127.0.0.1:40000")
            .times(1)
            .returning(|_| PublishOutcome {
                delivered: 1,
                dropped: 0,
            });
        let chain = InterceptorChain::standard(policy(), Arc::new(publisher));

        let consumer = chain
            .intercept(call(CHECK, Some("bob")), |scope| async move {
                Ok(scope.into_event().map(|e| e.consumer))
            })
            .await
            .unwrap();

        assert_eq!(consumer.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn denied_call_is_not_published() {
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().times(0);
        let chain = InterceptorChain::standard(policy(), Arc::new(publisher));

        let status = chain
            .intercept(call(ADD, Some("bob")), |_scope| async { Ok(()) })
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), format!("method {ADD} is not allowed for bob"));
    }

    #[tokio::test]
    async fn missing_consumer_is_unauthenticated() {
        let chain = InterceptorChain::standard(policy(), Arc::new(NoOpEventPublisher));

        let status = chain
            .intercept(call(CHECK, None), |_scope| async { Ok(()) })
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn handler_error_maps_to_status() {
        let chain = InterceptorChain::standard(policy(), Arc::new(NoOpEventPublisher));

        let status = chain
            .intercept(call(CHECK, Some("alice")), |_scope| async {
                Err::<(), _>(CallError::InvalidArgument("bad".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[test]
    fn request_prefers_recorded_call_path() {
        let mut request = tonic::Request::new(());
        assert_eq!(IncomingCall::from_request(&request, CHECK).method(), CHECK);

        request.extensions_mut().insert(CallPath(ADD.to_string()));
        assert_eq!(IncomingCall::from_request(&request, CHECK).method(), ADD);
    }

    #[tokio::test]
    async fn malformed_call_path_is_internal() {
        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().times(0);
        let chain = InterceptorChain::standard(policy(), Arc::new(publisher));

        let mut request = tonic::Request::new(());
        request
            .metadata_mut()
            .insert(CONSUMER_METADATA_KEY, MetadataValue::from_static("alice"));
        request.extensions_mut().insert(CallPath("Check".to_string()));

        let status = chain
            .intercept(IncomingCall::from_request(&request, CHECK), |_scope| async {
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Internal);
    }

    #[test]
    fn standard_chain_order() {
        let chain = InterceptorChain::standard(policy(), Arc::new(NoOpEventPublisher));
        assert_eq!(chain.stage_names(), vec!["extract", "authorize", "telemetry"]);
    }
}
