//! Call error types.
//!
//! Every failure an intercepted call can produce, with its gRPC mapping.
//!
//! | Variant | Code | Usage |
//! |---------|------|-------|
//! | `Unauthenticated` | `UNAUTHENTICATED` (16) | Missing consumer or policy denial |
//! | `Internal` | `INTERNAL` (13) | Malformed transport context, missing call event |
//! | `InvalidArgument` | `INVALID_ARGUMENT` (3) | Zero statistics interval |
//! | `Unavailable` | `UNAVAILABLE` (14) | Gateway is draining |
//! | `Disconnected` | `CANCELLED` (1) | Stream caller went away |

use thiserror::Error;
use tonic::{Code, Status};

/// Errors produced by the interceptor chain and call handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Caller identity missing or not allowed to call the method.
    #[error("{0}")]
    Unauthenticated(String),

    /// The transport context was not what the gateway was wired for.
    #[error("{0}")]
    Internal(String),

    /// Request payload rejected.
    #[error("{0}")]
    InvalidArgument(String),

    /// The gateway no longer accepts calls.
    #[error("{0}")]
    Unavailable(String),

    /// The stream's receiving side is gone.
    #[error("stream receiver disconnected")]
    Disconnected,
}

impl CallError {
    /// Get the gRPC status code for this error.
    #[must_use]
    pub const fn grpc_code(&self) -> Code {
        match self {
            Self::Unauthenticated(_) => Code::Unauthenticated,
            Self::Internal(_) => Code::Internal,
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::Unavailable(_) => Code::Unavailable,
            Self::Disconnected => Code::Cancelled,
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Internal(_) => "internal",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unavailable(_) => "unavailable",
            Self::Disconnected => "disconnected",
        }
    }

    /// Convert to a gRPC status.
    #[must_use]
    pub fn to_status(&self) -> Status {
        Status::new(self.grpc_code(), self.to_string())
    }
}

impl From<CallError> for Status {
    fn from(err: CallError) -> Self {
        err.to_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let status: Status = CallError::Unauthenticated("no consumer".into()).into();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "no consumer");

        assert_eq!(CallError::Internal(String::new()).grpc_code(), Code::Internal);
        assert_eq!(
            CallError::InvalidArgument(String::new()).grpc_code(),
            Code::InvalidArgument
        );
        assert_eq!(CallError::Unavailable(String::new()).grpc_code(), Code::Unavailable);
        assert_eq!(CallError::Disconnected.grpc_code(), Code::Cancelled);
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            CallError::Unauthenticated(String::new()).kind(),
            CallError::Internal(String::new()).kind(),
            CallError::InvalidArgument(String::new()).kind(),
            CallError::Unavailable(String::new()).kind(),
            CallError::Disconnected.kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
