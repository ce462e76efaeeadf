//! Protocol transport: the command/event multiplexer.
//!
//! The transport owns one [`Connection`], a command registry and an event
//! registry. Outbound, it assigns ids from an atomic counter, records a
//! pending entry and writes the serialized frame. Inbound, every frame is
//! classified and routed to command completion, event dispatch, the
//! protocol-error observer, or the unknown-message observer.
//!
//! # Lifecycle
//!
//! ```text
//! New ──connect()──► Connecting ──handshake──► Connected
//!                        │                        │
//!                   (handshake failed)     disconnect() / socket error
//!                        ▼                        ▼
//!                      Closed ◄──drained── Disconnecting
//! ```
//!
//! Commands may only be sent in `Connected`. Leaving `Connected` completes
//! every pending command with [`Error::ConnectionClosed`], so waiters
//! always wake.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Command, CommandFrame, ErrorResponse, Event, InboundMessage};

use super::commands::{CommandOutcome, CommandRegistry, PendingCommand};
use super::connection::Connection;
use super::events::{DispatchOutcome, EventRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for `send_command_and_wait`.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered observer notifications before slow subscribers lag.
const OBSERVER_CHANNEL_CAPACITY: usize = 128;

// ============================================================================
// TransportState
// ============================================================================

/// Lifecycle state of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Constructed, never connected.
    New,
    /// WebSocket handshake in progress.
    Connecting,
    /// Open session; commands may be sent.
    Connected,
    /// Teardown in progress.
    Disconnecting,
    /// Terminal state.
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Observer notifications emitted by the receive loop.
///
/// Subscribe with [`Transport::observe`]. Typed event payloads flow through
/// the dispatcher registered for the event name; the observer carries the
/// event's validated JSON payload for diagnostics and fan-out.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An event decoded and dispatched successfully.
    EventReceived {
        /// Event name.
        method: String,
        /// The event's `params` payload.
        params: Value,
    },

    /// The peer sent an error frame with no id.
    ProtocolError {
        /// Decoded error fields.
        error: ErrorResponse,
    },

    /// A frame matched no category, or matched a command/event this
    /// transport does not know.
    UnknownMessage {
        /// The frame text as received.
        raw: String,
    },
}

// ============================================================================
// Transport
// ============================================================================

/// The protocol transport.
///
/// Cheap to clone; clones share the underlying session.
///
/// # Example
///
/// ```ignore
/// let transport = Transport::new(None, Connection::new());
/// transport.register_event::<LoadEvent, _>(|event| println!("{}", event.url));
/// transport.connect("ws://127.0.0.1:9222/session").await?;
///
/// let status = transport
///     .send_command_and_wait(&RawCommand::new("session.status", json!({})))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    /// Framed message channel to the peer.
    connection: Connection,

    /// In-flight commands by id.
    commands: CommandRegistry,

    /// Event name to dispatcher mapping.
    events: EventRegistry,

    /// Lifecycle state.
    state: Mutex<TransportState>,

    /// Next command id; starts at 1, never reused.
    counter: AtomicU64,

    /// Serializes id assignment with the connection write, so ids observed
    /// on the wire are strictly increasing.
    send_gate: tokio::sync::Mutex<()>,

    /// Observer fan-out.
    observers: broadcast::Sender<TransportEvent>,

    /// Deadline used by `send_command_and_wait`.
    default_timeout: Duration,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("events", &self.inner.events.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport - Construction
// ============================================================================

impl Transport {
    /// Creates a transport over `connection`.
    ///
    /// `command_timeout` is the deadline applied by
    /// [`send_command_and_wait`](Transport::send_command_and_wait);
    /// `None` selects the 30s default.
    #[must_use]
    pub fn new(command_timeout: Option<Duration>, connection: Connection) -> Self {
        let (observers, _) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(TransportInner {
                connection,
                commands: CommandRegistry::new(),
                events: EventRegistry::new(),
                state: Mutex::new(TransportState::New),
                counter: AtomicU64::new(1),
                send_gate: tokio::sync::Mutex::new(()),
                observers,
                default_timeout: command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            }),
        }
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.inner.state.lock()
    }

    /// Number of in-flight commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.commands.len()
    }

    /// Deadline used by [`send_command_and_wait`](Transport::send_command_and_wait).
    #[inline]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Subscribes to transport observer notifications.
    ///
    /// Slow subscribers lag rather than backpressure the receive loop.
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.observers.subscribe()
    }

    /// Registers a typed dispatcher for `E::METHOD`.
    ///
    /// Last writer wins per event name. Dispatchers run synchronously on
    /// the receive loop and must not block. Registration is normally done
    /// before [`connect`](Transport::connect); doing it later is visible
    /// to the next inbound frame.
    pub fn register_event<E, F>(&self, dispatch: F)
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.inner.events.register::<E, F>(dispatch);
    }
}

// ============================================================================
// Transport - Lifecycle
// ============================================================================

impl Transport {
    /// Establishes the session and starts the receive loop.
    ///
    /// # Errors
    ///
    /// [`Error::TransportStartFailed`] if the handshake fails or the
    /// transport already left the `New` state. A failed handshake leaves
    /// the transport `Closed`; there is no reconnect.
    pub async fn connect(&self, url: &str) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != TransportState::New {
                return Err(Error::transport_start_failed(format!(
                    "connect is invalid in state `{state}`"
                )));
            }
            *state = TransportState::Connecting;
        }

        let frames = match self.inner.connection.start(url).await {
            Ok(frames) => frames,
            Err(e) => {
                *self.inner.state.lock() = TransportState::Closed;
                return Err(e);
            }
        };

        *self.inner.state.lock() = TransportState::Connected;
        info!(url, "Transport connected");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(TransportInner::receive_loop(inner, frames));

        Ok(())
    }

    /// Tears the session down.
    ///
    /// Every pending command completes with [`Error::ConnectionClosed`];
    /// outstanding waiters wake immediately. Idempotent.
    pub async fn disconnect(&self) {
        debug!("Disconnect requested");
        self.inner.teardown().await;
    }
}

// ============================================================================
// Transport - Commands
// ============================================================================

impl Transport {
    /// Sends a command and returns its assigned id.
    ///
    /// Id assignment, registry insertion and the connection write happen
    /// in that order. If the write fails the entry is removed and the id
    /// abandoned, never reused.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] outside the `Connected` state
    /// - [`Error::DuplicateCommandId`] on registry collision (fatal,
    ///   closes the transport)
    /// - [`Error::Json`] / [`Error::ConnectionClosed`] from serialization
    ///   or the write
    pub async fn send_command<C: Command>(&self, command: &C) -> Result<CommandId> {
        self.ensure_connected("send_command")?;

        let _gate = self.inner.send_gate.lock().await;
        // State may have moved while we waited on the gate.
        self.ensure_connected("send_command")?;

        let id = self.inner.next_id();
        if let Err(e) = self.inner.commands.insert(id, PendingCommand::new(command)) {
            error!(%id, "Command id collision; closing transport");
            self.inner.teardown().await;
            return Err(e);
        }

        let frame = CommandFrame {
            id,
            method: command.method(),
            params: command.params(),
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                self.inner.commands.remove(id);
                return Err(e.into());
            }
        };

        trace!(%id, method = command.method(), "Sending command");
        if let Err(e) = self.inner.connection.send(text).await {
            self.inner.commands.remove(id);
            return Err(e);
        }

        Ok(id)
    }

    /// Waits until the command's completion is signaled.
    ///
    /// On timeout the registry entry is retained: a late response still
    /// lands until the caller collects the result or the transport
    /// disconnects, so a slow peer is never raced.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommandId`] if the id was never issued or already
    ///   collected
    /// - [`Error::CommandTimeout`] if `wait_timeout` elapses first
    pub async fn wait_for_command(&self, id: CommandId, wait_timeout: Duration) -> Result<()> {
        let Some(mut rx) = self.inner.commands.take_completion(id)? else {
            // Already completed; nothing to wait for.
            return Ok(());
        };

        match timeout(wait_timeout, &mut rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                self.inner.commands.restore_completion(id, rx);
                Err(Error::command_timeout(id, wait_timeout.as_millis() as u64))
            }
        }
    }

    /// Removes the command's entry and returns its decoded result.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommandId`] if the id was never issued or already
    ///   taken
    /// - [`Error::Peer`] if the peer answered with an error frame
    /// - [`Error::Decode`] if the response did not match the declared
    ///   schema
    /// - [`Error::ConnectionClosed`] if the transport left `Connected`
    ///   before a response arrived
    pub fn take_command_response<R: Send + 'static>(&self, id: CommandId) -> Result<R> {
        let pending = self.inner.commands.take_completed(id)?;
        let method = pending.method().to_owned();

        match pending.into_outcome() {
            CommandOutcome::Completed(boxed) => boxed
                .downcast::<R>()
                .map(|value| *value)
                .map_err(|_| Error::internal(format!("result type mismatch for `{method}`"))),
            CommandOutcome::PeerError(response) => Err(Error::peer(response)),
            CommandOutcome::DecodeFailure(e) => Err(e),
            CommandOutcome::Aborted => Err(Error::ConnectionClosed),
            CommandOutcome::Pending => {
                Err(Error::internal(format!("command {id} collected before completion")))
            }
        }
    }

    /// Sends a command, waits with the default timeout, and returns the
    /// decoded result.
    ///
    /// # Errors
    ///
    /// Everything [`send_command`](Transport::send_command),
    /// [`wait_for_command`](Transport::wait_for_command) and
    /// [`take_command_response`](Transport::take_command_response) can
    /// return.
    pub async fn send_command_and_wait<C: Command>(&self, command: &C) -> Result<C::Result> {
        let id = self.send_command(command).await?;
        self.wait_for_command(id, self.inner.default_timeout).await?;
        self.take_command_response::<C::Result>(id)
    }

    /// Fails with [`Error::NotConnected`] outside the `Connected` state.
    fn ensure_connected(&self, operation: &str) -> Result<()> {
        if self.state() == TransportState::Connected {
            Ok(())
        } else {
            Err(Error::not_connected(operation))
        }
    }
}

// ============================================================================
// TransportInner - Receive Loop
// ============================================================================

impl TransportInner {
    /// Assigns the next command id.
    fn next_id(&self) -> CommandId {
        let raw = self.counter.fetch_add(1, Ordering::AcqRel);
        CommandId::from_counter(raw)
    }

    /// Drains the inbound frame stream, then tears the transport down.
    async fn receive_loop(inner: Arc<Self>, mut frames: mpsc::UnboundedReceiver<String>) {
        while let Some(text) = frames.recv().await {
            inner.handle_frame(&text);
        }

        debug!("Inbound frame stream ended");
        inner.teardown().await;
    }

    /// Routes one classified frame. Never fails; anything that does not
    /// match a pending command or registered event degrades to the
    /// unknown-message observer.
    fn handle_frame(&self, raw: &str) {
        let message = InboundMessage::classify(raw);
        trace!(kind = message.kind(), "Frame received");

        match message {
            InboundMessage::CommandResponse { id, result } => {
                let completed = CommandId::new(id)
                    .is_some_and(|id| self.commands.complete_response(id, result));
                if !completed {
                    // Late response after take, or an id never issued.
                    debug!(id, "Response matched no pending command");
                    self.emit_unknown(raw);
                }
            }

            InboundMessage::CommandError { id, error } => {
                let completed =
                    CommandId::new(id).is_some_and(|id| self.commands.complete_error(id, error));
                if !completed {
                    debug!(id, "Error response matched no pending command");
                    self.emit_unknown(raw);
                }
            }

            InboundMessage::UnsolicitedError { error } => {
                warn!(code = %error.error, message = %error.message, "Peer protocol error");
                let _ = self.observers.send(TransportEvent::ProtocolError { error });
            }

            InboundMessage::Event { method, params } => {
                match self.events.dispatch(&method, params.clone()) {
                    DispatchOutcome::Dispatched => {
                        let _ = self
                            .observers
                            .send(TransportEvent::EventReceived { method, params });
                    }
                    DispatchOutcome::Unregistered => {
                        debug!(%method, "Event has no registered dispatcher");
                        self.emit_unknown(raw);
                    }
                    DispatchOutcome::DecodeFailed(e) => {
                        debug!(%method, error = %e, "Event payload decode failed");
                        self.emit_unknown(raw);
                    }
                }
            }

            InboundMessage::Unknown { raw } => {
                debug!(len = raw.len(), "Unclassifiable frame");
                self.emit_unknown(&raw);
            }
        }
    }

    fn emit_unknown(&self, raw: &str) {
        let _ = self.observers.send(TransportEvent::UnknownMessage {
            raw: raw.to_owned(),
        });
    }

    /// Stops the connection, aborts pending commands, and closes.
    ///
    /// Safe to call from the receive loop, `disconnect`, and the fatal
    /// invariant path; every step is idempotent.
    async fn teardown(&self) {
        {
            let mut state = self.state.lock();
            if *state == TransportState::Closed {
                return;
            }
            *state = TransportState::Disconnecting;
        }

        self.connection.stop().await;
        let aborted = self.commands.abort_all();
        *self.state.lock() = TransportState::Closed;

        debug!(aborted, "Transport closed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use serde::Deserialize;
    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;

    use crate::protocol::RawCommand;

    type PeerStream = WebSocketStream<TcpStream>;

    /// Binds a local listener and runs `script` against the first peer.
    async fn spawn_peer<F, Fut>(script: F) -> String
    where
        F: FnOnce(PeerStream) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            script(ws).await;
        });

        format!("ws://{addr}")
    }

    /// Reads the next text frame as JSON.
    async fn next_frame(ws: &mut PeerStream) -> Value {
        loop {
            match ws.next().await.expect("frame").expect("frame ok") {
                Message::Text(text) => return serde_json::from_str(&text).expect("json"),
                Message::Close(_) => panic!("peer saw close while expecting a frame"),
                _ => {}
            }
        }
    }

    async fn send_json(ws: &mut PeerStream, value: Value) {
        ws.send(Message::Text(value.to_string().into()))
            .await
            .expect("peer send");
    }

    fn status_command() -> RawCommand {
        RawCommand::new("session.status", json!({}))
    }

    async fn connected_transport(url: &str) -> Transport {
        let transport = Transport::new(Some(Duration::from_secs(5)), Connection::new());
        transport.connect(url).await.expect("connect");
        transport
    }

    #[tokio::test]
    async fn test_round_trip_success() {
        let url = spawn_peer(|mut ws| async move {
            let frame = next_frame(&mut ws).await;
            assert_eq!(frame["method"], "session.status");
            assert_eq!(frame["params"], json!({}));

            let id = frame["id"].as_u64().expect("id");
            send_json(&mut ws, json!({"id": id, "result": {"ready": true, "message": "ok"}}))
                .await;
        })
        .await;

        let transport = connected_transport(&url).await;
        let result: Value = transport
            .send_command_and_wait(&status_command())
            .await
            .expect("round trip");

        assert_eq!(result, json!({"ready": true, "message": "ok"}));
        assert_eq!(transport.pending_count(), 0);

        transport.disconnect().await;
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_peer_error_surfaces() {
        let url = spawn_peer(|mut ws| async move {
            let frame = next_frame(&mut ws).await;
            let id = frame["id"].as_u64().expect("id");
            send_json(
                &mut ws,
                json!({"id": id, "error": "no such frame", "message": "context x not found"}),
            )
            .await;
        })
        .await;

        let transport = connected_transport(&url).await;
        let err = transport
            .send_command_and_wait::<RawCommand>(&RawCommand::new(
                "browsingContext.navigate",
                json!({"context": "x", "url": "about:blank"}),
            ))
            .await
            .unwrap_err();

        let response = err.peer_response().expect("peer error");
        assert_eq!(response.error, "no such frame");
        assert_eq!(response.message, "context x not found");
        assert_eq!(transport.pending_count(), 0);

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let url = spawn_peer(|mut ws| async move {
            let first = next_frame(&mut ws).await;
            let second = next_frame(&mut ws).await;

            // Answer in reverse order.
            for frame in [&second, &first] {
                let id = frame["id"].as_u64().expect("id");
                send_json(&mut ws, json!({"id": id, "result": {"answered": id}})).await;
            }
        })
        .await;

        let transport = connected_transport(&url).await;
        let id_a = transport.send_command(&status_command()).await.expect("send a");
        let id_b = transport.send_command(&status_command()).await.expect("send b");
        assert!(id_a < id_b);

        transport
            .wait_for_command(id_a, Duration::from_secs(5))
            .await
            .expect("wait a");
        transport
            .wait_for_command(id_b, Duration::from_secs(5))
            .await
            .expect("wait b");

        let result_a: Value = transport.take_command_response(id_a).expect("take a");
        let result_b: Value = transport.take_command_response(id_b).expect("take b");
        assert_eq!(result_a["answered"], id_a.get());
        assert_eq!(result_b["answered"], id_b.get());
        assert_eq!(transport.pending_count(), 0);

        transport.disconnect().await;
    }

    #[derive(Debug, Deserialize)]
    struct Load {
        context: String,
        url: String,
        timestamp: u64,
    }

    impl Event for Load {
        const METHOD: &'static str = "browsingContext.load";
    }

    #[tokio::test]
    async fn test_event_dispatch() {
        let url = spawn_peer(|mut ws| async move {
            send_json(
                &mut ws,
                json!({
                    "method": "browsingContext.load",
                    "params": {"context": "c1", "url": "https://a", "timestamp": 1700}
                }),
            )
            .await;
            // Keep the socket open until the client disconnects.
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = Transport::new(None, Connection::new());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        transport.register_event::<Load, _>(move |event| {
            let _ = seen_tx.send((event.context, event.url, event.timestamp));
        });

        let mut observer = transport.observe();
        transport.connect(&url).await.expect("connect");

        let (context, event_url, timestamp) =
            timeout(Duration::from_secs(5), seen_rx.recv())
                .await
                .expect("dispatch in time")
                .expect("dispatched");
        assert_eq!(context, "c1");
        assert_eq!(event_url, "https://a");
        assert_eq!(timestamp, 1700);

        match timeout(Duration::from_secs(5), observer.recv())
            .await
            .expect("observer in time")
            .expect("observer event")
        {
            TransportEvent::EventReceived { method, params } => {
                assert_eq!(method, "browsingContext.load");
                assert_eq!(params["context"], "c1");
            }
            other => panic!("expected EventReceived, got {other:?}"),
        }

        // Dispatched exactly once; the command registry is untouched.
        assert!(seen_rx.try_recv().is_err());
        assert_eq!(transport.pending_count(), 0);

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_unsolicited_error() {
        let url = spawn_peer(|mut ws| async move {
            send_json(&mut ws, json!({"error": "invalid argument", "message": "bad frame"}))
                .await;
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = Transport::new(None, Connection::new());
        let mut observer = transport.observe();
        transport.connect(&url).await.expect("connect");

        match timeout(Duration::from_secs(5), observer.recv())
            .await
            .expect("observer in time")
            .expect("observer event")
        {
            TransportEvent::ProtocolError { error } => {
                assert_eq!(error.error, "invalid argument");
                assert_eq!(error.message, "bad frame");
            }
            other => panic!("expected ProtocolError, got {other:?}"),
        }

        assert_eq!(transport.pending_count(), 0);
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_unregistered_event_is_unknown() {
        let url = spawn_peer(|mut ws| async move {
            send_json(&mut ws, json!({"method": "some.unregistered", "params": {}})).await;
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = Transport::new(None, Connection::new());
        let mut observer = transport.observe();
        transport.connect(&url).await.expect("connect");

        match timeout(Duration::from_secs(5), observer.recv())
            .await
            .expect("observer in time")
            .expect("observer event")
        {
            TransportEvent::UnknownMessage { raw } => {
                assert!(raw.contains("some.unregistered"));
            }
            other => panic!("expected UnknownMessage, got {other:?}"),
        }

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let transport = Transport::new(None, Connection::new());
        let err = transport.send_command(&status_command()).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_closes_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let transport = Transport::new(None, Connection::new());
        let err = transport.connect(&format!("ws://{addr}")).await.unwrap_err();
        assert!(matches!(err, Error::TransportStartFailed { .. }));
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_teardown_wakes_waiters() {
        let url = spawn_peer(|mut ws| async move {
            // Swallow the command and never answer.
            let _ = next_frame(&mut ws).await;
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = connected_transport(&url).await;
        let id = transport.send_command(&status_command()).await.expect("send");

        let waiter = {
            let transport = transport.clone();
            tokio::spawn(async move {
                transport.wait_for_command(id, Duration::from_secs(30)).await
            })
        };

        // Give the waiter a moment to park.
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.disconnect().await;

        // The waiter wakes well within its own deadline.
        timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter woke")
            .expect("join")
            .expect("wait returned");

        let err = transport.take_command_response::<Value>(id).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn test_timeout_keeps_entry_for_late_response() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let url = spawn_peer(|mut ws| async move {
            let frame = next_frame(&mut ws).await;
            let id = frame["id"].as_u64().expect("id");

            // Hold the response until the test has observed the timeout.
            release_rx.await.expect("release");
            send_json(&mut ws, json!({"id": id, "result": {"late": true}})).await;
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = connected_transport(&url).await;
        let id = transport.send_command(&status_command()).await.expect("send");

        let err = transport
            .wait_for_command(id, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }));
        // Entry survives the timeout.
        assert_eq!(transport.pending_count(), 1);

        release_tx.send(()).expect("release peer");

        transport
            .wait_for_command(id, Duration::from_secs(5))
            .await
            .expect("second wait");
        let result: Value = transport.take_command_response(id).expect("take");
        assert_eq!(result["late"], true);

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_late_response_after_take_is_unknown() {
        let (second_tx, second_rx) = tokio::sync::oneshot::channel::<()>();

        let url = spawn_peer(|mut ws| async move {
            let frame = next_frame(&mut ws).await;
            let id = frame["id"].as_u64().expect("id");
            send_json(&mut ws, json!({"id": id, "result": {}})).await;

            // Duplicate response for an id the caller has already taken.
            second_rx.await.expect("go");
            send_json(&mut ws, json!({"id": id, "result": {"dup": true}})).await;
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = connected_transport(&url).await;
        let mut observer = transport.observe();

        let _: Value = transport
            .send_command_and_wait(&status_command())
            .await
            .expect("first response");
        second_tx.send(()).expect("trigger duplicate");

        match timeout(Duration::from_secs(5), observer.recv())
            .await
            .expect("observer in time")
            .expect("observer event")
        {
            TransportEvent::UnknownMessage { raw } => assert!(raw.contains("dup")),
            other => panic!("expected UnknownMessage, got {other:?}"),
        }

        // Nothing was reinserted.
        assert_eq!(transport.pending_count(), 0);
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_ids_are_strictly_increasing() {
        let url = spawn_peer(|mut ws| async move {
            for _ in 0..8 {
                let frame = next_frame(&mut ws).await;
                let id = frame["id"].as_u64().expect("id");
                send_json(&mut ws, json!({"id": id, "result": {}})).await;
            }
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = connected_transport(&url).await;

        let mut previous = None;
        for _ in 0..8 {
            let id = transport.send_command(&status_command()).await.expect("send");
            if let Some(previous) = previous {
                assert!(id > previous);
            }
            assert!(id.get() >= 1);
            previous = Some(id);

            transport
                .wait_for_command(id, Duration::from_secs(5))
                .await
                .expect("wait");
            let _: Value = transport.take_command_response(id).expect("take");
        }

        assert_eq!(transport.pending_count(), 0);
        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_take_unknown_id_fails() {
        let transport = Transport::new(None, Connection::new());
        let id = CommandId::new(99).unwrap();
        let err = transport.take_command_response::<Value>(id).unwrap_err();
        assert!(matches!(err, Error::UnknownCommandId { .. }));
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let url = spawn_peer(|mut ws| async move {
            while ws.next().await.is_some() {}
        })
        .await;

        let transport = connected_transport(&url).await;
        let err = transport.connect(&url).await.unwrap_err();
        assert!(matches!(err, Error::TransportStartFailed { .. }));

        transport.disconnect().await;
    }
}
