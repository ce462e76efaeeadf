//! WebSocket connection: framed duplex text channel to one peer.
//!
//! The connection dials a WebSocket URL, then runs two tasks:
//!
//! - a **writer** draining a bounded queue into the socket, so frames are
//!   emitted in the order `send` was called
//! - a **reader** surfacing complete text frames on an unbounded stream
//!
//! The reader closing its stream (socket error, peer close, [`stop`]) is
//! the connection's end-of-life signal; the transport observes it as
//! `None` from the frame receiver. Binary frames are logged and dropped at
//! this layer; ping/pong stays inside tungstenite.
//!
//! [`stop`]: Connection::stop

// ============================================================================
// Imports
// ============================================================================

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Outgoing frame queue depth before senders suspend.
const SEND_QUEUE_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Commands for the writer task.
enum WriterCommand {
    /// Transmit one text frame.
    Frame(String),
    /// Close the socket gracefully and exit.
    Close,
}

// ============================================================================
// Connection
// ============================================================================

/// A duplex framed-message channel over a WebSocket URL.
///
/// Created inert; [`start`](Connection::start) dials the peer and returns
/// the inbound frame stream. [`send`](Connection::send) may be called from
/// any task; ordering at the socket matches the order `send` resolved.
///
/// # Example
///
/// ```ignore
/// let connection = Connection::new();
/// let mut frames = connection.start("ws://127.0.0.1:9222/session").await?;
/// connection.send(r#"{"id":1,"method":"session.status","params":{}}"#.into()).await?;
/// while let Some(frame) = frames.recv().await {
///     println!("<< {frame}");
/// }
/// ```
pub struct Connection {
    /// Writer handle; `None` before `start` and after `stop`.
    writer: Mutex<Option<mpsc::Sender<WriterCommand>>>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Creates a connection in the stopped state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(None),
        }
    }

    /// Returns `true` if the connection has been started and not stopped.
    #[inline]
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Establishes the WebSocket and begins the receive loop.
    ///
    /// Returns the stream of inbound text frames. The stream yields `None`
    /// once the socket closes for any reason.
    ///
    /// # Errors
    ///
    /// - [`Error::TransportStartFailed`] if the handshake does not
    ///   complete, or if the connection was already started
    pub async fn start(&self, url: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        if self.is_started() {
            return Err(Error::transport_start_failed("connection already started"));
        }

        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| Error::transport_start_failed(e.to_string()))?;

        debug!(url, "WebSocket connection established");

        let (ws_write, ws_read) = ws_stream.split();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);

        tokio::spawn(Self::write_loop(ws_write, writer_rx));
        tokio::spawn(Self::read_loop(ws_read, frames_tx));

        *self.writer.lock() = Some(writer_tx);

        Ok(frames_rx)
    }

    /// Enqueues one text frame for transmission.
    ///
    /// Suspends while the outgoing queue is full; frames reach the socket
    /// in the order their `send` call resolved.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection was never started
    /// - [`Error::ConnectionClosed`] if the writer has shut down
    pub async fn send(&self, text: String) -> Result<()> {
        let writer = {
            let guard = self.writer.lock();
            guard
                .as_ref()
                .cloned()
                .ok_or_else(|| Error::not_connected("send"))?
        };

        writer
            .send(WriterCommand::Frame(text))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Initiates a graceful close and releases the writer.
    ///
    /// Idempotent; the first call wins and later calls are no-ops. The
    /// inbound frame stream ends once the close completes.
    pub async fn stop(&self) {
        let writer = self.writer.lock().take();

        if let Some(writer) = writer {
            debug!("Stopping connection");
            // Writer already gone means the socket failed first; that is
            // an acceptable way to be stopped.
            let _ = writer.send(WriterCommand::Close).await;
        }
    }
}

// ============================================================================
// Connection - I/O Loops
// ============================================================================

impl Connection {
    /// Drains the outgoing queue into the socket.
    async fn write_loop(mut ws_write: WsSink, mut writer_rx: mpsc::Receiver<WriterCommand>) {
        while let Some(command) = writer_rx.recv().await {
            match command {
                WriterCommand::Frame(text) => {
                    trace!(len = text.len(), "Sending frame");
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        warn!(error = %e, "WebSocket send failed");
                        break;
                    }
                }
                WriterCommand::Close => {
                    debug!("Close requested");
                    let _ = ws_write.close().await;
                    break;
                }
            }
        }

        debug!("Writer loop terminated");
    }

    /// Surfaces complete text frames until the socket ends.
    async fn read_loop(mut ws_read: WsSource, frames_tx: mpsc::UnboundedSender<String>) {
        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if frames_tx.send(text.as_str().to_owned()).is_err() {
                        debug!("Frame receiver dropped");
                        break;
                    }
                }

                Ok(Message::Close(_)) => {
                    debug!("WebSocket closed by remote");
                    break;
                }

                Ok(Message::Binary(data)) => {
                    warn!(len = data.len(), "Ignoring binary frame");
                }

                // Ping/Pong/Frame are handled inside tungstenite.
                Ok(_) => {}

                Err(e) => {
                    error!(error = %e, "WebSocket error");
                    break;
                }
            }
        }

        debug!("Reader loop terminated");
        // Dropping frames_tx ends the inbound stream for the transport.
    }
}

// ============================================================================
// Tests
// ============================================================================
