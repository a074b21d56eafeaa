//! Client error types.

use std::time::Duration;

use thiserror::Error;

use synthlink_protocol::{ProtocolError, RequestId};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
///
/// Request failures reach the caller through the same future that would
/// have carried the reply.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection closed or failed before the reply arrived.
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// No reply within the request timeout.
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },

    /// The pending table is full.
    #[error("too many pending requests (limit: {limit})")]
    TooManyPending { limit: usize },

    /// Endpoint string could not be parsed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Payload given on the command line is not JSON.
    #[error("invalid payload {input:?}: {reason}")]
    InvalidPayload { input: String, reason: String },

    /// Protocol error (encoding, framing, payload shape).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reconnect requested on a client built from an existing stream.
    #[error("client was built from a stream and cannot reconnect")]
    NotReconnectable,

    /// Reconnect requested while the connection is still open.
    #[error("connection is still open")]
    AlreadyConnected,
}

impl ClientError {
    /// Creates a connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Returns true if the error means the connection is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ClientError::Timeout {
            id: 4,
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "request 4 timed out after 250ms");

        let err = ClientError::connection_lost("peer closed the connection");
        assert_eq!(err.to_string(), "connection lost: peer closed the connection");
        assert!(err.is_connection_lost());

        let err = ClientError::TooManyPending { limit: 2 };
        assert_eq!(err.to_string(), "too many pending requests (limit: 2)");
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn error_from_protocol() {
        let err: ClientError = ProtocolError::LineTooLong { max: 8 }.into();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(
            err.to_string(),
            "protocol error: line exceeds 8 bytes without a delimiter"
        );
    }
}
