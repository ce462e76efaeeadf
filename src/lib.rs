//! WebDriver BiDi client library.
//!
//! A client for the WebDriver BiDi protocol: JSON text frames over a
//! WebSocket, with client-issued commands correlated to responses by a
//! monotonically increasing id, and unsolicited peer events routed to
//! registered dispatchers.
//!
//! # Architecture
//!
//! - **Local end (this crate)**: sends commands, receives responses and
//!   events over one WebSocket
//! - **Remote end (browser)**: executes commands, emits events
//!
//! Key design points:
//!
//! - One [`Transport`] owns one [`Connection`] plus the command and event
//!   registries for the lifetime of a session
//! - Command ids come from an atomic counter; ids are unique and strictly
//!   increasing, never reused
//! - The receive loop classifies every inbound frame into exactly one of
//!   five categories and never crashes on malformed input
//! - The client knows no browser semantics; `"browsingContext.navigate"`
//!   is a method name with parameters, nothing more
//!
//! # Quick Start
//!
//! ```no_run
//! use bidi_webdriver::{Connection, Launcher, Transport, Result};
//! use bidi_webdriver::browsing_context::ReadinessState;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Spawn a driver binary and discover the WebSocket endpoint.
//!     let driver = Launcher::builder()
//!         .binary("/usr/bin/geckodriver")
//!         .build()?
//!         .launch()
//!         .await?;
//!     let session = driver.new_session(json!({})).await?;
//!
//!     // Connect the transport and issue commands.
//!     let transport = Transport::new(None, Connection::new());
//!     transport.connect(&session.websocket_url).await?;
//!
//!     let status = transport.session().status().await?;
//!     println!("ready: {} ({})", status.ready, status.message);
//!
//!     transport
//!         .browsing_context()
//!         .navigate("ctx", "https://example.com", ReadinessState::Complete)
//!         .await?;
//!
//!     transport.disconnect().await;
//!     driver.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browsing_context`] | `browsingContext.*` commands and events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`launcher`] | Driver process supervision (optional collaborator) |
//! | [`log`] | `log.*` events |
//! | [`protocol`] | Wire message types and classification |
//! | [`session`] | `session.*` commands |
//! | [`subscribers`] | Listener lists for typed event fan-out |
//! | [`transport`] | Connection, registries and the [`Transport`] |

// ============================================================================
// Modules
// ============================================================================

/// `browsingContext` module commands and events.
pub mod browsing_context;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Driver process supervision.
///
/// Optional collaborator; any producer of a WebSocket URL works.
pub mod launcher;

/// `log` module events.
pub mod log;

/// Wire protocol message types.
pub mod protocol;

/// `session` module commands.
pub mod session;

/// Listener lists for typed event fan-out.
pub mod subscribers;

/// Protocol transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, SubscriptionId};

// Launcher types
pub use launcher::{DriverProcess, DriverSession, Launcher, LauncherBuilder};

// Protocol types
pub use protocol::{Command, ErrorResponse, Event, InboundMessage, RawCommand};

// Transport types
pub use transport::{Connection, Transport, TransportEvent, TransportState};

// Subscriber list
pub use subscribers::Subscribers;
