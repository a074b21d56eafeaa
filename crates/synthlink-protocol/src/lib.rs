//! Wire protocol between synthlink and the synthesis engine.
//!
//! # Protocol Overview
//!
//! Every message is one line of compact JSON terminated by `\n`:
//!
//! ```text
//! {"id":0,"payload":{"type":"Ping"}}\n
//! ```
//!
//! Requests and replies share the same [`Envelope`]: the `id` is chosen by
//! the client and echoed by the engine, the `payload` is opaque. There is no
//! handshake, no version negotiation and no heartbeat.
//!
//! # Example
//!
//! ```rust
//! use synthlink_protocol::{Envelope, LineFramer, decode_line, encode_line};
//! use serde_json::json;
//!
//! let line = encode_line(&Envelope::new(0, json!({"type": "Ping"}))).unwrap();
//!
//! let mut framer = LineFramer::new();
//! let records = framer.push(&line);
//! let decoded = decode_line(&records[0]).unwrap();
//! assert_eq!(decoded.id, 0);
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{LineFramer, LineReader, decode_line, encode_line, encode_line_limited};
pub use types::{Envelope, RequestId};

/// Record delimiter.
pub const DELIMITER: u8 = b'\n';

/// Maximum length of a single line, delimiter excluded (1 MiB).
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;
