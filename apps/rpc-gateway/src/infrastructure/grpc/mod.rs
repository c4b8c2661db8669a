//! gRPC Services
//!
//! Tonic adapters for the `gateway.v1.Admin` and `gateway.v1.Biz` services.
//!
//! # Architecture
//!
//! Every RPC builds an `IncomingCall` from the tonic request and hands it to
//! `Gateway::dispatch`, which runs the interceptor chain before the handler.
//! Streaming handlers then:
//!
//! 1. Open a subscription on the event bus
//! 2. Spawn a tracked forwarding task (live log or statistics aggregator)
//! 3. Return the receiving half of an mpsc channel as the response stream
//! 4. Unsubscribe when the caller hangs up or the bus closes
//!
//! [`call_path_layer`] sits in front of the services and records the routed
//! method path as a [`CallPath`] extension, which `IncomingCall` reads.

pub mod server;

use std::sync::Arc;

use tonic::body::Body;
use tonic::codegen::http;
use tower::util::MapRequestLayer;

use crate::application::gateway::{Gateway, SharedGateway};
use crate::application::interceptor::{CallPath, InterceptorChain};
use crate::application::ports::{EventPublisher, SubscriberRegistry};
use crate::domain::access::AccessPolicy;
use crate::infrastructure::bus::SharedEventBus;

/// Include generated protobuf code.
/// The generated code is in packages/schema-gen/rust/gateway/v1/
/// gateway.v1.rs includes gateway.v1.tonic.rs at the end
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod gateway {
        pub mod v1 {
            include!("../../../../../packages/schema-gen/rust/gateway/v1/gateway.v1.rs");
        }
    }
}

/// Fully qualified method paths served by the gateway.
pub mod methods {
    /// `Admin.Logging`: stream of call events.
    pub const LOGGING: &str = "/gateway.v1.Admin/Logging";
    /// `Admin.Statistics`: stream of windowed call counts.
    pub const STATISTICS: &str = "/gateway.v1.Admin/Statistics";
    /// `Biz.Check`.
    pub const CHECK: &str = "/gateway.v1.Biz/Check";
    /// `Biz.Add`.
    pub const ADD: &str = "/gateway.v1.Biz/Add";
    /// `Biz.Test`.
    pub const TEST: &str = "/gateway.v1.Biz/Test";
}

pub use server::{AdminService, BizService};

/// Layer recording each request's URI path as a [`CallPath`] extension.
pub type CallPathLayer = MapRequestLayer<fn(http::Request<Body>) -> http::Request<Body>>;

/// Build the layer passed to `Server::builder().layer(..)`.
#[must_use]
pub fn call_path_layer() -> CallPathLayer {
    MapRequestLayer::new(record_call_path::<Body> as fn(_) -> _)
}

fn record_call_path<B>(mut request: http::Request<B>) -> http::Request<B> {
    let path = CallPath(request.uri().path().to_string());
    request.extensions_mut().insert(path);
    request
}

/// Wire the standard interceptor chain to `bus` and wrap it in a gateway.
#[must_use]
pub fn build_gateway(policy: AccessPolicy, bus: &SharedEventBus) -> SharedGateway {
    let publisher: Arc<dyn EventPublisher> = bus.clone();
    let registry: Arc<dyn SubscriberRegistry> = bus.clone();
    let chain = InterceptorChain::standard(Arc::new(policy), publisher);
    Arc::new(Gateway::new(chain, registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_uri_path() {
        let request = http::Request::builder()
            .uri("http://localhost:8082/gateway.v1.Biz/Check")
            .body(())
            .unwrap();

        let request = record_call_path(request);
        assert_eq!(
            request.extensions().get::<CallPath>(),
            Some(&CallPath(methods::CHECK.to_string()))
        );
    }
}
