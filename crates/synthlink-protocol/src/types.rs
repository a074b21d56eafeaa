//! Message envelope shared by requests and replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id chosen by the client and echoed by the engine.
pub type RequestId = u64;

/// Envelope wrapping every line on the wire.
///
/// The same shape travels in both directions. A reply without a `payload`
/// field decodes with a `null` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    /// Correlation id.
    pub id: RequestId,
    /// Opaque request or reply body.
    #[serde(default)]
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates an envelope.
    pub fn new(id: RequestId, payload: T) -> Self {
        Self { id, payload }
    }
}
