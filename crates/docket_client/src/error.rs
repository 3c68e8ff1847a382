//! Error types for the client.

use crate::operation::OperationId;
use docket_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while registering, flushing or reading lazy
/// operations.
///
/// Errors are `Clone` because a failed operation keeps its error and hands a
/// copy to every reader.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The multi-get round trip failed as a whole.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the flush can be attempted again.
        retryable: bool,
    },

    /// A response payload could not be turned into the operation's result.
    #[error("cannot deserialize result of {operation}: {message}")]
    Deserialization {
        /// Description of the operation.
        operation: String,
        /// Error message.
        message: String,
    },

    /// The server answered one request of the batch with an error status.
    #[error("server returned status {status}: {message}")]
    Server {
        /// Status code of the individual response.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The result was read before any response had been consumed.
    #[error("result not ready: the lazy operation has not been executed")]
    ResultNotReady,

    /// The handle does not belong to this session.
    #[error("unknown lazy operation {0}")]
    UnknownOperation(OperationId),

    /// A document conversion ran outside of an operation scope.
    #[error("no conversion context is active")]
    ContextNotActive,

    /// The session used up its request budget.
    #[error("session exceeded the maximum of {max} requests")]
    MaxRequestsExceeded {
        /// Configured maximum.
        max: u32,
    },

    /// Envelope encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a deserialization error for the described operation.
    pub fn deserialization(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Deserialization {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if repeating the flush may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the error is scoped to a single operation.
    pub fn is_operation_scoped(&self) -> bool {
        matches!(
            self,
            ClientError::Deserialization { .. } | ClientError::Server { .. }
        )
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport_retryable("connection reset").is_retryable());
        assert!(!ClientError::transport_fatal("bad certificate").is_retryable());
        assert!(ClientError::Server {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!ClientError::Server {
            status: 400,
            message: "bad query".into()
        }
        .is_retryable());
        assert!(!ClientError::ResultNotReady.is_retryable());
    }

    #[test]
    fn operation_scope() {
        assert!(ClientError::deserialization("load users/1", "expected object").is_operation_scoped());
        assert!(!ClientError::transport_retryable("timeout").is_operation_scoped());
    }

    #[test]
    fn error_display() {
        let err = ClientError::MaxRequestsExceeded { max: 30 };
        assert_eq!(err.to_string(), "session exceeded the maximum of 30 requests");

        let err: ClientError = ProtocolError::decoding("eof").into();
        assert!(err.to_string().contains("eof"));
    }
}
