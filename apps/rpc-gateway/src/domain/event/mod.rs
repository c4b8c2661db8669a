//! Call Events
//!
//! The per-call telemetry record produced by the interceptor chain and fanned
//! out to live log and statistics subscribers.

/// One admitted call, as seen by the gateway.
///
/// Created once per intercepted call and never mutated afterwards. Every
/// event that reaches the bus has a non-empty consumer and method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallEvent {
    /// Peer address of the caller, or empty if the transport has none.
    pub host: String,
    /// Fully qualified method path (`/package.Service/Method`).
    pub method: String,
    /// Caller identity taken from the `consumer` metadata key.
    pub consumer: String,
    /// Unix timestamp (seconds) at which the call was intercepted.
    pub timestamp: i64,
}

impl CallEvent {
    /// Create a new call event.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        method: impl Into<String>,
        consumer: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            host: host.into(),
            method: method.into(),
            consumer: consumer.into(),
            timestamp,
        }
    }

    /// Service part of the method path, if well formed.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        MethodPath::parse(&self.method).map(|p| p.service)
    }
}

/// A parsed `/service/method` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodPath<'a> {
    /// Fully qualified service name, e.g. `gateway.v1.Biz`.
    pub service: &'a str,
    /// Method name, e.g. `Check`.
    pub method: &'a str,
}

impl<'a> MethodPath<'a> {
    /// Parse a gRPC method path.
    ///
    /// Returns `None` unless the path is exactly `/service/method` with both
    /// parts non-empty.
    #[must_use]
    pub fn parse(path: &'a str) -> Option<Self> {
        let rest = path.strip_prefix('/')?;
        let (service, method) = rest.split_once('/')?;
        if service.is_empty() || method.is_empty() || method.contains('/') {
            return None;
        }
        Some(Self { service, method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_path() {
        let path = MethodPath::parse("/gateway.v1.Biz/Check").unwrap();
        assert_eq!(path.service, "gateway.v1.Biz");
        assert_eq!(path.method, "Check");
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "/", "Check", "gateway.v1.Biz/Check", "//Check", "/svc/", "/a/b/c"] {
            assert!(MethodPath::parse(bad).is_none(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn event_service() {
        let event = CallEvent::new("127.0.0.1:5000", "/gateway.v1.Admin/Logging", "logger", 1);
        assert_eq!(event.service(), Some("gateway.v1.Admin"));
    }
}
