//! Correlated request client.
//!
//! `EngineClient` multiplexes any number of concurrent requests over one
//! connection. Each request gets the next correlation id, its line is queued
//! for the connection task, and the returned [`ReplyFuture`] completes when
//! the engine answers with the same id, whatever the order of the replies.
//!
//! ```text
//!  send(A) ──► id 0 ─┐                        ┌─► reply id 1 ─► B resolves
//!  send(B) ──► id 1 ─┼─► outgoing ──► engine ─┤
//!                    │   queue                └─► reply id 0 ─► A resolves
//!              pending table { 0, 1 }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use synthlink_protocol::{
    Envelope, MAX_LINE_LENGTH, ProtocolError, RequestId, decode_line, encode_line_limited,
};

use crate::connection;
use crate::endpoint::Endpoint;
use crate::error::{ClientError, ClientResult};
use crate::pending::{CompletionRx, PendingTable};

/// Default time to wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time to wait for the connection to be established.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the pending table.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Future returned by [`EngineClient::send`].
pub type ReplyFuture = Pin<Box<dyn Future<Output = ClientResult<Value>> + Send + 'static>>;

/// Client options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Time to wait for each reply; `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Time to wait for the connection to open.
    pub connect_timeout: Duration,
    /// Maximum number of requests awaiting a reply.
    pub max_pending: usize,
    /// Maximum length of one line in either direction.
    pub max_line_length: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl ClientOptions {
    /// Builder: set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder: set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set the pending table capacity.
    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    /// Builder: set the line length limit.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The connection could not be opened.
    ConnectFailed(String),
    /// The engine closed its end.
    PeerClosed,
    /// Read or write failed.
    Transport(String),
    /// The engine sent data that cannot be framed.
    Protocol(String),
    /// [`EngineClient::close`] was called or every handle was dropped.
    ClosedByClient,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(msg) => write!(f, "connect failed: {msg}"),
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::ClosedByClient => write!(f, "closed by client"),
        }
    }
}

/// Connection lifecycle as seen by the owner of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// The connection is being opened; sends are queued.
    Connecting,
    /// The stream is up.
    Connected,
    /// The connection ended; pending requests were failed.
    Closed(CloseReason),
}

impl ConnectionState {
    /// Returns true for [`ConnectionState::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Mutable state guarded by one lock.
struct Inner {
    next_id: RequestId,
    pending: PendingTable,
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
    generation: u64,
    closed: Option<CloseReason>,
}

/// State shared between client handles and the connection task.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    endpoint: Option<Endpoint>,
    options: ClientOptions,
}

impl Shared {
    pub(crate) fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Records that the connection of `generation` is up.
    pub(crate) fn mark_connected(&self, generation: u64) {
        let inner = self.inner.lock();
        if inner.generation == generation && inner.closed.is_none() {
            self.state_tx.send_replace(ConnectionState::Connected);
            info!(generation, "connected to engine");
        }
    }

    /// Handles one complete record read from the connection of `generation`.
    pub(crate) fn dispatch(&self, generation: u64, record: &[u8]) {
        let envelope = match decode_line(record) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed record");
                return;
            }
        };

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(id = envelope.id, generation, "reply from a stale connection");
            return;
        }
        if inner.pending.resolve(envelope.id, envelope.payload) {
            debug!(id = envelope.id, pending = inner.pending.len(), "reply delivered");
        } else {
            debug!(id = envelope.id, "orphaned reply");
        }
    }

    /// Ends the connection of `generation`; no-op for stale generations.
    pub(crate) fn close(&self, generation: u64, reason: CloseReason) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            self.close_locked(&mut inner, reason);
        }
    }

    fn close_locked(&self, inner: &mut Inner, reason: CloseReason) {
        if inner.closed.is_some() {
            return;
        }
        inner.outgoing = None;
        let message = reason.to_string();
        let failed = inner
            .pending
            .fail_all(|| ClientError::connection_lost(message.clone()));

        match reason {
            CloseReason::ClosedByClient => info!(failed, "connection closed"),
            ref other => warn!(reason = %other, failed, "connection lost"),
        }

        inner.closed = Some(reason.clone());
        self.state_tx.send_replace(ConnectionState::Closed(reason));
    }

    fn forget(&self, id: RequestId) {
        if self.inner.lock().pending.remove(id) {
            debug!(id, "request abandoned");
        }
    }
}

/// Removes a request from the table when its future goes away.
struct PendingGuard {
    shared: Arc<Shared>,
    id: RequestId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.shared.forget(self.id);
    }
}

/// Handle to one engine connection.
///
/// Cloning is cheap; all clones share the id counter, the pending table and
/// the connection. The connection task stops once every handle is dropped.
#[derive(Clone)]
pub struct EngineClient {
    shared: Arc<Shared>,
}

impl EngineClient {
    /// Opens a connection to `endpoint` in the background.
    ///
    /// Returns immediately. Requests sent before the connection is up are
    /// queued and written in order once it is.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(endpoint: Endpoint, options: ClientOptions) -> Self {
        let (client, outgoing_rx) = Self::with_state(Some(endpoint.clone()), options);
        info!(endpoint = %endpoint, "connecting to engine");
        connection::spawn_connect(endpoint, outgoing_rx, Arc::downgrade(&client.shared), 0);
        client
    }

    /// Drives an already-open stream.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn from_stream<S>(stream: S, options: ClientOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client, outgoing_rx) = Self::with_state(None, options);
        client.shared.mark_connected(0);
        connection::spawn_stream(stream, outgoing_rx, Arc::downgrade(&client.shared), 0);
        client
    }

    fn with_state(
        endpoint: Option<Endpoint>,
        options: ClientOptions,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let inner = Inner {
            next_id: 0,
            pending: PendingTable::new(options.max_pending),
            outgoing: Some(outgoing_tx),
            generation: 0,
            closed: None,
        };
        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            state_tx,
            endpoint,
            options,
        });
        (Self { shared }, outgoing_rx)
    }

    /// Sends `payload` and returns a future resolving to the reply payload.
    ///
    /// The id is assigned and the line queued before this returns, so
    /// requests go out in call order even if their futures are polled in a
    /// different order. Uses the default request timeout.
    pub fn send<P: Serialize>(&self, payload: P) -> ReplyFuture {
        self.send_with_timeout(payload, self.shared.options.request_timeout)
    }

    /// Same as [`send`](Self::send) with an explicit timeout.
    ///
    /// The deadline starts now, not when the future is first polled.
    pub fn send_with_timeout<P: Serialize>(
        &self,
        payload: P,
        timeout: Option<Duration>,
    ) -> ReplyFuture {
        let issued = self.issue(&payload).map(|(id, rx)| {
            let guard = PendingGuard {
                shared: Arc::clone(&self.shared),
                id,
            };
            (guard, rx)
        });
        let deadline = timeout.map(|after| (Instant::now() + after, after));

        // The guard lives in the future from here on, so dropping the
        // future unpolled still removes the entry.
        Box::pin(async move {
            let (guard, rx) = issued?;
            let id = guard.id;

            let received = match deadline {
                Some((at, after)) => match tokio::time::timeout_at(at, rx).await {
                    Ok(received) => received,
                    Err(_) => {
                        warn!(id, ?after, "request timed out");
                        return Err(ClientError::Timeout { id, after });
                    }
                },
                None => rx.await,
            };

            received.unwrap_or_else(|_| Err(ClientError::connection_lost("client state dropped")))
        })
    }

    /// Sends `payload` and decodes the reply payload as `R`.
    pub fn request<R, P>(
        &self,
        payload: P,
    ) -> Pin<Box<dyn Future<Output = ClientResult<R>> + Send + 'static>>
    where
        R: DeserializeOwned + Send + 'static,
        P: Serialize,
    {
        let reply = self.send(payload);
        Box::pin(async move {
            let value = reply.await?;
            serde_json::from_value::<R>(value)
                .map_err(|e| ClientError::from(ProtocolError::UnexpectedPayload(e.to_string())))
        })
    }

    /// Assigns an id, registers the completion and queues the line.
    fn issue<P: Serialize>(&self, payload: &P) -> ClientResult<(RequestId, CompletionRx)> {
        let mut inner = self.shared.inner.lock();
        if let Some(ref reason) = inner.closed {
            return Err(ClientError::connection_lost(reason.to_string()));
        }

        let id = inner.next_id;
        let line = encode_line_limited(
            &Envelope::new(id, payload),
            self.shared.options.max_line_length,
        )?;
        let rx = inner.pending.insert(id)?;

        let queued = inner
            .outgoing
            .as_ref()
            .is_some_and(|tx| tx.send(line).is_ok());
        if !queued {
            inner.pending.remove(id);
            return Err(ClientError::connection_lost("connection task stopped"));
        }

        inner.next_id += 1;
        debug!(id, pending = inner.pending.len(), "request queued");
        Ok((id, rx))
    }

    /// Id the next request will get.
    pub fn next_id(&self) -> RequestId {
        self.shared.inner.lock().next_id
    }

    /// Ids awaiting a reply, ascending.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        self.shared.inner.lock().pending.ids()
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    /// Returns true if `id` is awaiting a reply.
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.shared.inner.lock().pending.contains(id)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Watches connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Endpoint this client connects to, if it was built with [`connect`](Self::connect).
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.shared.endpoint.as_ref()
    }

    /// Closes the connection and fails every pending request.
    ///
    /// Lines already queued are still written before the stream shuts down.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        self.shared.close_locked(&mut inner, CloseReason::ClosedByClient);
    }

    /// Opens a fresh connection after the previous one closed.
    ///
    /// The id counter carries on from where it was, so late replies for the
    /// old connection can never match a new request.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn reconnect(&self) -> ClientResult<()> {
        let endpoint = self
            .shared
            .endpoint
            .clone()
            .ok_or(ClientError::NotReconnectable)?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.closed.is_none() {
                return Err(ClientError::AlreadyConnected);
            }
            inner.generation += 1;
            inner.closed = None;
            inner.outgoing = Some(outgoing_tx);
            self.shared.state_tx.send_replace(ConnectionState::Connecting);
            info!(
                endpoint = %endpoint,
                generation = inner.generation,
                next_id = inner.next_id,
                "reconnecting to engine"
            );
            inner.generation
        };

        connection::spawn_connect(
            endpoint,
            outgoing_rx,
            Arc::downgrade(&self.shared),
            generation,
        );
        Ok(())
    }
}

impl fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("EngineClient")
            .field("endpoint", &self.shared.endpoint)
            .field("next_id", &inner.next_id)
            .field("pending", &inner.pending.len())
            .field("closed", &inner.closed)
            .finish()
    }
}
