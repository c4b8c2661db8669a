//! gRPC Service Implementations
//!
//! Implements `gateway.v1.Admin` (live log and statistics streams) and
//! `gateway.v1.Biz` (no-op unary calls) on top of the shared [`Gateway`].

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use super::methods;
use super::proto::gateway::v1::{
    self as proto, Nothing, StatInterval, admin_server::Admin, biz_server::Biz,
};
use crate::application::error::CallError;
use crate::application::gateway::SharedGateway;
use crate::application::interceptor::IncomingCall;
use crate::application::ports::{SinkClosed, StreamSink};
use crate::application::services::{StatsAggregator, forward_events};
use crate::domain::event::CallEvent;
use crate::domain::stats::StatSnapshot;
use crate::infrastructure::bus::SharedEventBus;
use crate::infrastructure::metrics::{self, StreamKind};

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Default response stream buffer per caller.
pub const DEFAULT_STREAM_BUFFER: usize = 256;

// =============================================================================
// Proto Conversions
// =============================================================================

impl From<CallEvent> for proto::Event {
    fn from(event: CallEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            consumer: event.consumer,
            method: event.method,
            host: event.host,
        }
    }
}

impl From<StatSnapshot> for proto::Stat {
    fn from(snapshot: StatSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            by_method: snapshot.by_method,
            by_consumer: snapshot.by_consumer,
        }
    }
}

// =============================================================================
// Response Sinks
// =============================================================================

/// Stream sink that converts domain items into proto messages for tonic.
struct ProtoSink<T, P> {
    tx: mpsc::Sender<Result<P, Status>>,
    _item: PhantomData<fn(T)>,
}

impl<T, P> ProtoSink<T, P> {
    const fn new(tx: mpsc::Sender<Result<P, Status>>) -> Self {
        Self {
            tx,
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T, P> StreamSink<T> for ProtoSink<T, P>
where
    T: Send + 'static,
    P: From<T> + Send + 'static,
{
    async fn send(&self, item: T) -> Result<(), SinkClosed> {
        self.tx.send(Ok(P::from(item))).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}

fn response_channel<T, P>(buffer: usize) -> (ProtoSink<T, P>, BoxedStream<P>)
where
    T: Send + 'static,
    P: From<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ProtoSink::new(tx), Box::pin(ReceiverStream::new(rx)))
}

fn log_stream_end(
    kind: StreamKind,
    consumer: &str,
    started: Instant,
    result: &Result<u64, CallError>,
) {
    let reason = match result {
        Ok(_) => "source_closed",
        Err(_) => "caller_gone",
    };
    metrics::record_stream_closed(kind, reason, started.elapsed());

    match result {
        Ok(items) => tracing::info!(
            stream = kind.as_str(),
            consumer = %consumer,
            items,
            "Stream ended by shutdown"
        ),
        Err(err) => tracing::info!(
            stream = kind.as_str(),
            consumer = %consumer,
            error = %err,
            "Stream caller disconnected"
        ),
    }
}

// =============================================================================
// Admin Service
// =============================================================================

/// `gateway.v1.Admin` implementation.
#[derive(Debug, Clone)]
pub struct AdminService {
    gateway: SharedGateway,
    bus: SharedEventBus,
    stream_buffer: usize,
}

impl AdminService {
    /// Create the admin service.
    #[must_use]
    pub const fn new(gateway: SharedGateway, bus: SharedEventBus, stream_buffer: usize) -> Self {
        Self {
            gateway,
            bus,
            stream_buffer,
        }
    }
}

#[tonic::async_trait]
impl Admin for AdminService {
    type LoggingStream = BoxedStream<proto::Event>;
    type StatisticsStream = BoxedStream<proto::Stat>;

    async fn logging(&self, request: Request<Nothing>) -> StreamResult<Self::LoggingStream> {
        let incoming = IncomingCall::from_request(&request, methods::LOGGING);
        let gateway = Arc::clone(&self.gateway);
        let bus = Arc::clone(&self.bus);
        let buffer = self.stream_buffer;

        self.gateway
            .dispatch(incoming, move |scope| async move {
                let consumer = scope.into_event().map(|e| e.consumer).unwrap_or_default();
                let subscription = bus.subscribe();
                let (sink, stream) = response_channel::<CallEvent, proto::Event>(buffer);

                tracing::info!(
                    consumer = %consumer,
                    subscriber_id = %subscription.id(),
                    "Logging stream opened"
                );
                metrics::record_stream_opened(StreamKind::Logging);

                gateway.spawn_stream(async move {
                    let started = Instant::now();
                    let result = forward_events(subscription, &sink).await;
                    log_stream_end(StreamKind::Logging, &consumer, started, &result);
                });

                Ok(Response::new(stream))
            })
            .await
    }

    async fn statistics(
        &self,
        request: Request<StatInterval>,
    ) -> StreamResult<Self::StatisticsStream> {
        let incoming = IncomingCall::from_request(&request, methods::STATISTICS);
        let interval_seconds = request.into_inner().interval_seconds;
        let gateway = Arc::clone(&self.gateway);
        let bus = Arc::clone(&self.bus);
        let buffer = self.stream_buffer;

        self.gateway
            .dispatch(incoming, move |scope| async move {
                let consumer = scope.into_event().map(|e| e.consumer).unwrap_or_default();
                let subscription = bus.subscribe();
                let subscriber_id = subscription.id();
                let aggregator =
                    StatsAggregator::from_interval_seconds(subscription, interval_seconds)?;
                let (sink, stream) = response_channel::<StatSnapshot, proto::Stat>(buffer);

                tracing::info!(
                    consumer = %consumer,
                    subscriber_id = %subscriber_id,
                    interval_seconds,
                    "Statistics stream opened"
                );
                metrics::record_stream_opened(StreamKind::Statistics);

                gateway.spawn_stream(async move {
                    let started = Instant::now();
                    let result = aggregator.run(&sink).await;
                    log_stream_end(StreamKind::Statistics, &consumer, started, &result);
                });

                Ok(Response::new(stream))
            })
            .await
    }
}

// =============================================================================
// Biz Service
// =============================================================================

/// `gateway.v1.Biz` implementation. Every method is a no-op once admitted.
#[derive(Debug, Clone)]
pub struct BizService {
    gateway: SharedGateway,
}

impl BizService {
    /// Create the biz service.
    #[must_use]
    pub const fn new(gateway: SharedGateway) -> Self {
        Self { gateway }
    }

    async fn admit(&self, incoming: IncomingCall) -> Result<Response<Nothing>, Status> {
        self.gateway
            .dispatch(incoming, |_scope| async { Ok(Response::new(Nothing::default())) })
            .await
    }
}

#[tonic::async_trait]
impl Biz for BizService {
    async fn check(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.admit(IncomingCall::from_request(&request, methods::CHECK))
            .await
    }

    async fn add(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.admit(IncomingCall::from_request(&request, methods::ADD))
            .await
    }

    async fn test(&self, request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        self.admit(IncomingCall::from_request(&request, methods::TEST))
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio_stream::StreamExt;
    use tonic::Code;
    use tonic::metadata::MetadataValue;

    use super::*;
    use crate::application::gateway::Gateway;
    use crate::application::interceptor::{CONSUMER_METADATA_KEY, InterceptorChain};
    use crate::application::ports::{EventPublisher, SubscriberRegistry};
    use crate::domain::access::AccessPolicy;
    use crate::infrastructure::bus::EventBus;

    fn services(acl: &str) -> (AdminService, BizService, SharedEventBus, SharedGateway) {
        let bus = Arc::new(EventBus::new(16));
        let policy = Arc::new(AccessPolicy::from_json(acl).unwrap());
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let registry: Arc<dyn SubscriberRegistry> = bus.clone();
        let gateway = Arc::new(Gateway::new(
            InterceptorChain::standard(policy, publisher),
            registry,
        ));
        (
            AdminService::new(Arc::clone(&gateway), Arc::clone(&bus), 8),
            BizService::new(Arc::clone(&gateway)),
            bus,
            gateway,
        )
    }

    fn request<T>(message: T, consumer: &'static str) -> Request<T> {
        let mut request = Request::new(message);
        request
            .metadata_mut()
            .insert(CONSUMER_METADATA_KEY, MetadataValue::from_static(consumer));
        request
    }

    #[test]
    fn event_to_proto() {
        let event = CallEvent::new("1.2.3.4:5", "/gateway.v1.Biz/Add", "biz_user", 99);
        let proto = proto::Event::from(event);

        assert_eq!(proto.timestamp, 99);
        assert_eq!(proto.consumer, "biz_user");
        assert_eq!(proto.method, "/gateway.v1.Biz/Add");
        assert_eq!(proto.host, "1.2.3.4:5");
    }

    #[test]
    fn snapshot_to_proto() {
        let snapshot = StatSnapshot {
            timestamp: 7,
            by_method: HashMap::from([("/gateway.v1.Biz/Check".to_string(), 2)]),
            by_consumer: HashMap::from([("biz_user".to_string(), 2)]),
        };
        let proto = proto::Stat::from(snapshot);

        assert_eq!(proto.timestamp, 7);
        assert_eq!(proto.by_method["/gateway.v1.Biz/Check"], 2);
        assert_eq!(proto.by_consumer["biz_user"], 2);
    }

    #[tokio::test]
    async fn biz_calls_follow_policy() {
        let (_, biz, _, _) = services(r#"{"biz_user": ["Check"]}"#);

        assert!(biz.check(request(Nothing::default(), "biz_user")).await.is_ok());

        let status = biz.add(request(Nothing::default(), "biz_user")).await.unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);

        let status = biz.test(Request::new(Nothing::default())).await.unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn logging_streams_later_calls() {
        let (admin, biz, bus, _) =
            services(r#"{"logger": ["Logging"], "biz_user": ["Check"]}"#);

        let mut stream = admin
            .logging(request(Nothing::default(), "logger"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(bus.subscriber_count(), 1);

        biz.check(request(Nothing::default(), "biz_user")).await.unwrap();

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.consumer, "biz_user");
        assert_eq!(event.method, methods::CHECK);
    }

    #[tokio::test]
    async fn statistics_rejects_zero_interval() {
        let (admin, _, bus, _) = services(r#"{"stat": ["Statistics"]}"#);

        let status = admin
            .statistics(request(StatInterval { interval_seconds: 0 }, "stat"))
            .await
            .err()
            .unwrap();

        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn statistics_rejects_oversized_interval() {
        let (admin, _, bus, gateway) = services(r#"{"stat": ["Statistics"]}"#);

        let status = admin
            .statistics(request(StatInterval { interval_seconds: u64::MAX }, "stat"))
            .await
            .err()
            .unwrap();

        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(gateway.active_streams(), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_open_streams() {
        let (admin, _, bus, gateway) = services(r#"{"logger": ["*"]}"#);

        let mut log = admin
            .logging(request(Nothing::default(), "logger"))
            .await
            .unwrap()
            .into_inner();
        let mut stats = admin
            .statistics(request(StatInterval { interval_seconds: 60 }, "logger"))
            .await
            .unwrap()
            .into_inner();

        let opened = log.next().await.unwrap().unwrap();
        assert_eq!(opened.method, methods::STATISTICS);

        gateway.shutdown().await;

        assert!(log.next().await.is_none());
        assert!(stats.next().await.is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
