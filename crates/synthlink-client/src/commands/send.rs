//! Send command: issue payloads concurrently, print replies in order.

use std::io::Write;

use serde_json::Value;
use tracing::debug;

use crate::client::EngineClient;
use crate::error::{ClientError, ClientResult};

/// Parses every argument as JSON before anything is sent.
pub fn parse_payloads(inputs: &[String]) -> ClientResult<Vec<Value>> {
    inputs
        .iter()
        .map(|input| {
            serde_json::from_str(input).map_err(|e| ClientError::InvalidPayload {
                input: input.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Sends all payloads, then awaits the replies in argument order.
///
/// Each reply is written to `out` as one JSON line. Failed requests are
/// reported on stderr. Returns how many requests failed.
pub async fn run(
    client: &EngineClient,
    payloads: Vec<Value>,
    out: &mut impl Write,
) -> ClientResult<usize> {
    let replies: Vec<_> = payloads.into_iter().map(|p| client.send(p)).collect();
    debug!(count = replies.len(), "payloads issued");

    let mut failures = 0;
    for (index, reply) in replies.into_iter().enumerate() {
        match reply.await {
            Ok(value) => {
                serde_json::to_writer(&mut *out, &value)
                    .map_err(synthlink_protocol::ProtocolError::from)?;
                writeln!(out)?;
            }
            Err(e) => {
                failures += 1;
                eprintln!("error: payload #{}: {}", index + 1, e);
            }
        }
    }
    out.flush()?;
    Ok(failures)
}
