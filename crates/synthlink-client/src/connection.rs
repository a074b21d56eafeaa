//! Background task owning one engine connection.
//!
//! The task writes queued lines in order and dispatches every complete
//! record it reads back. It holds only a weak reference to the client
//! state, so dropping the last [`EngineClient`](crate::EngineClient) ends it.

use std::sync::Weak;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use synthlink_protocol::{LineReader, ProtocolError};

use crate::client::{CloseReason, Shared};
use crate::endpoint::Endpoint;

/// Opens `endpoint` and drives the resulting stream.
pub(crate) fn spawn_connect(
    endpoint: Endpoint,
    outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Weak<Shared>,
    generation: u64,
) {
    tokio::spawn(async move {
        let Some((connect_timeout, max_line_length)) = shared
            .upgrade()
            .map(|s| (s.options().connect_timeout, s.options().max_line_length))
        else {
            return;
        };

        let result = match &endpoint {
            Endpoint::Tcp(addr) => {
                match tokio::time::timeout(connect_timeout, TcpStream::connect(addr.as_str())).await
                {
                    Ok(Ok(stream)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(error = %e, "failed to set TCP_NODELAY");
                        }
                        Ok(Transport::Tcp(stream))
                    }
                    Ok(Err(e)) => Err(format!("failed to connect to {endpoint}: {e}")),
                    Err(_) => Err(format!(
                        "connection to {endpoint} timed out after {connect_timeout:?}"
                    )),
                }
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                match tokio::time::timeout(connect_timeout, tokio::net::UnixStream::connect(path))
                    .await
                {
                    Ok(Ok(stream)) => Ok(Transport::Unix(stream)),
                    Ok(Err(e)) => Err(format!("failed to connect to {endpoint}: {e}")),
                    Err(_) => Err(format!(
                        "connection to {endpoint} timed out after {connect_timeout:?}"
                    )),
                }
            }
        };

        let transport = match result {
            Ok(transport) => transport,
            Err(msg) => {
                if let Some(shared) = shared.upgrade() {
                    shared.close(generation, CloseReason::ConnectFailed(msg));
                }
                return;
            }
        };

        match shared.upgrade() {
            Some(s) => s.mark_connected(generation),
            None => return,
        }

        let reason = match transport {
            Transport::Tcp(stream) => {
                drive(stream, outgoing, &shared, generation, max_line_length).await
            }
            #[cfg(unix)]
            Transport::Unix(stream) => {
                drive(stream, outgoing, &shared, generation, max_line_length).await
            }
        };
        finish(&shared, generation, reason);
    });
}

/// Drives a stream that is already open.
pub(crate) fn spawn_stream<S>(
    stream: S,
    outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Weak<Shared>,
    generation: u64,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        let Some(max_line_length) = shared.upgrade().map(|s| s.options().max_line_length) else {
            return;
        };
        let reason = drive(stream, outgoing, &shared, generation, max_line_length).await;
        finish(&shared, generation, reason);
    });
}

enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

fn finish(shared: &Weak<Shared>, generation: u64, reason: CloseReason) {
    debug!(generation, reason = %reason, "connection task finished");
    if let Some(shared) = shared.upgrade() {
        shared.close(generation, reason);
    }
}

async fn drive<S>(
    stream: S,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: &Weak<Shared>,
    generation: u64,
    max_line_length: usize,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = LineReader::new(reader).with_max_line_length(max_line_length);

    tokio::select! {
        reason = write_loop(&mut writer, &mut outgoing) => reason,
        reason = read_loop(&mut reader, shared, generation) => reason,
    }
}

/// Writes queued lines until the queue closes or a write fails.
async fn write_loop<W>(writer: &mut W, outgoing: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> CloseReason
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outgoing.recv().await {
        let written = async {
            writer.write_all(&line).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            return CloseReason::Transport(format!("write failed: {e}"));
        }
        trace!(bytes = line.len(), "line written");
    }

    // Every sender is gone: the client was closed or dropped.
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "shutdown after close failed");
    }
    CloseReason::ClosedByClient
}

/// Reads records and hands them to the client state.
async fn read_loop<R>(reader: &mut LineReader<R>, shared: &Weak<Shared>, generation: u64) -> CloseReason
where
    R: AsyncRead + Unpin,
{
    loop {
        match reader.next_record().await {
            Ok(Some(record)) => match shared.upgrade() {
                Some(shared) => shared.dispatch(generation, &record),
                None => return CloseReason::ClosedByClient,
            },
            Ok(None) => return CloseReason::PeerClosed,
            Err(ProtocolError::Io(e)) => {
                return CloseReason::Transport(format!("read failed: {e}"));
            }
            Err(e) => return CloseReason::Protocol(e.to_string()),
        }
    }
}
