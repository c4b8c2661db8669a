//! Gateway
//!
//! Composition root for a running server. Owns the interceptor chain, the
//! subscriber registry handle and the trackers for in-flight calls and stream
//! tasks, and enforces the shutdown ordering:
//!
//! 1. stop admitting calls (late calls get `UNAVAILABLE`)
//! 2. wait for in-flight handler invocations
//! 3. close the subscriber registry so every stream sees its source end
//! 4. wait for stream tasks to drain

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tonic::Status;

use super::error::CallError;
use super::interceptor::{CallScope, IncomingCall, InterceptorChain};
use super::ports::SubscriberRegistry;

/// Shared handle to the gateway.
pub type SharedGateway = Arc<Gateway>;

/// Running gateway state.
pub struct Gateway {
    chain: InterceptorChain,
    registry: Arc<dyn SubscriberRegistry>,
    in_flight: TaskTracker,
    streams: TaskTracker,
    started_at: Instant,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("chain", &self.chain)
            .field("in_flight", &self.in_flight.len())
            .field("streams", &self.streams.len())
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway over a chain and the registry it publishes into.
    #[must_use]
    pub fn new(chain: InterceptorChain, registry: Arc<dyn SubscriberRegistry>) -> Self {
        Self {
            chain,
            registry,
            in_flight: TaskTracker::new(),
            streams: TaskTracker::new(),
            started_at: Instant::now(),
        }
    }

    /// Run a call through the interceptor chain and its handler.
    ///
    /// # Errors
    ///
    /// Returns `UNAVAILABLE` once shutdown has begun, otherwise whatever the
    /// chain or handler produced.
    pub async fn dispatch<T, F, Fut>(&self, incoming: IncomingCall, handler: F) -> Result<T, Status>
    where
        T: Send,
        F: FnOnce(CallScope) -> Fut + Send,
        Fut: Future<Output = Result<T, CallError>> + Send,
    {
        // Track before checking so shutdown either sees this call or rejects it.
        let call = self.in_flight.track_future(self.chain.intercept(incoming, handler));
        if self.in_flight.is_closed() {
            return Err(CallError::Unavailable("gateway is shutting down".to_string()).into());
        }
        call.await
    }

    /// Spawn a stream forwarding task that shutdown will wait for.
    pub fn spawn_stream<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.streams.spawn(task)
    }

    /// Whether new calls are admitted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.in_flight.is_closed()
    }

    /// Calls currently inside the chain or their handler.
    #[must_use]
    pub fn in_flight_calls(&self) -> usize {
        self.in_flight.len()
    }

    /// Stream tasks currently running.
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    /// Live bus subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }

    /// Time since the gateway was created.
    #[must_use]
    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Drain calls, close subscriptions, then wait for streams to end.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.in_flight.close();
        tracing::info!(in_flight = self.in_flight.len(), "Draining in-flight calls");
        self.in_flight.wait().await;

        self.registry.close();

        self.streams.close();
        tracing::info!(streams = self.streams.len(), "Waiting for streams to end");
        self.streams.wait().await;

        tracing::info!("Gateway shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::{mpsc, oneshot};
    use tonic::Code;
    use tonic::metadata::{MetadataMap, MetadataValue};

    use super::*;
    use crate::application::interceptor::CONSUMER_METADATA_KEY;
    use crate::application::ports::{EventPublisher, EventSource};
    use crate::application::services::forward_events;
    use crate::domain::access::AccessPolicy;
    use crate::infrastructure::bus::EventBus;

    fn gateway(bus: &Arc<EventBus>) -> Gateway {
        let policy = Arc::new(AccessPolicy::from_json(r#"{"alice": ["*"]}"#).unwrap());
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let registry: Arc<dyn SubscriberRegistry> = bus.clone();
        Gateway::new(InterceptorChain::standard(policy, publisher), registry)
    }

    fn call(method: &str) -> IncomingCall {
        let mut metadata = MetadataMap::new();
        metadata.insert(CONSUMER_METADATA_KEY, MetadataValue::from_static("alice"));
        IncomingCall::new(method, metadata, None)
    }

    #[tokio::test]
    async fn dispatch_runs_handler() {
        let bus = Arc::new(EventBus::new(8));
        let gateway = gateway(&bus);

        let result = gateway
            .dispatch(call("/gateway.v1.Biz/Check"), |_scope| async { Ok(7) })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(gateway.in_flight_calls(), 0);
    }

    #[tokio::test]
    async fn calls_after_shutdown_are_unavailable() {
        let bus = Arc::new(EventBus::new(8));
        let gateway = gateway(&bus);
        gateway.shutdown().await;

        let status = gateway
            .dispatch(call("/gateway.v1.Biz/Check"), |_scope| async { Ok(()) })
            .await
            .unwrap_err();

        assert_eq!(status.code(), Code::Unavailable);
        assert!(!gateway.is_accepting());
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_calls() {
        let bus = Arc::new(EventBus::new(8));
        let gateway = Arc::new(gateway(&bus));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (entered_tx, entered_rx) = oneshot::channel::<()>();

        let worker = Arc::clone(&gateway);
        let call_task = tokio::spawn(async move {
            worker
                .dispatch(call("/gateway.v1.Biz/Add"), |_scope| async move {
                    let _ = entered_tx.send(());
                    let _ = release_rx.await;
                    Ok(())
                })
                .await
        });
        entered_rx.await.unwrap();

        let stopper = Arc::clone(&gateway);
        let shutdown = tokio::spawn(async move { stopper.shutdown().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shutdown.is_finished());
        assert!(!bus.is_closed());

        release_tx.send(()).unwrap();
        shutdown.await.unwrap();
        assert!(call_task.await.unwrap().is_ok());
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn shutdown_ends_streams_through_bus_closure() {
        let bus = Arc::new(EventBus::new(8));
        let gateway = gateway(&bus);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let mut subscription = bus.subscribe();
        assert!(subscription.try_recv().is_none());
        let (done_tx, done_rx) = oneshot::channel();
        gateway.spawn_stream(async move {
            let result = forward_events(subscription, &out_tx).await;
            let _ = done_tx.send(result);
        });

        gateway
            .dispatch(call("/gateway.v1.Biz/Test"), |_scope| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(out_rx.recv().await.unwrap().method, "/gateway.v1.Biz/Test");

        gateway.shutdown().await;

        assert_eq!(done_rx.await.unwrap(), Ok(1));
        assert_eq!(gateway.active_streams(), 0);
        assert_eq!(gateway.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closed_source_ends_immediately() {
        let bus = Arc::new(EventBus::new(8));
        bus.shutdown();
        let mut subscription = bus.subscribe();
        assert!(subscription.next_event().await.is_none());
    }
}
