//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, framing or decoding lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded message exceeds the line limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Incoming data grew past the line limit without a delimiter.
    #[error("line exceeds {max} bytes without a delimiter")]
    LineTooLong { max: usize },

    /// A complete line that is not a valid envelope.
    #[error("malformed record ({reason}): {record}")]
    MalformedRecord { reason: String, record: String },

    /// Failed to serialize a message to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reply payload did not have the shape the caller asked for.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Builds a [`ProtocolError::MalformedRecord`] from the raw bytes.
    pub fn malformed(reason: impl Into<String>, record: &[u8]) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
            record: String::from_utf8_lossy(record).into_owned(),
        }
    }
}
