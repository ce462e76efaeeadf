//! Error types for the BiDi client.
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`].
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Transport state | [`Error::NotConnected`], [`Error::TransportStartFailed`], [`Error::ConnectionClosed`] |
//! | Commands | [`Error::CommandTimeout`], [`Error::UnknownCommandId`], [`Error::DuplicateCommandId`] |
//! | Peer | [`Error::Peer`], [`Error::Decode`] |
//! | Launcher | [`Error::Config`], [`Error::DriverNotFound`], [`Error::ProcessLaunchFailed`], [`Error::SessionSetup`], [`Error::ReadyTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CommandId;
use crate::protocol::ErrorResponse;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Transport State Errors
    // ========================================================================
    /// Operation invalid in the current transport state.
    ///
    /// Returned when an operation requires an open transport.
    #[error("Not connected: {operation} requires an open transport")]
    NotConnected {
        /// The operation that was attempted.
        operation: String,
    },

    /// Connect did not complete.
    ///
    /// Returned when the WebSocket handshake fails or the transport was
    /// already started.
    #[error("Transport start failed: {message}")]
    TransportStartFailed {
        /// Description of the start failure.
        message: String,
    },

    /// The transport left the connected state.
    ///
    /// Pending commands are completed with this error on teardown, so
    /// waiters never deadlock.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// A command id collided in the registry.
    ///
    /// The atomic counter makes this unreachable; a firing is a fatal
    /// invariant violation and closes the transport.
    #[error("Duplicate command id: {id}")]
    DuplicateCommandId {
        /// The colliding id.
        id: CommandId,
    },

    /// Waiting for a command response exceeded its deadline.
    ///
    /// The registry entry is retained; a late response still lands until
    /// the caller collects the result or the transport disconnects.
    #[error("Command {id} timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// The command that timed out.
        id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A response was requested for an id never issued or already taken.
    #[error("Unknown command id: {id}")]
    UnknownCommandId {
        /// The unrecognized id.
        id: CommandId,
    },

    // ========================================================================
    // Peer Errors
    // ========================================================================
    /// The peer answered a command with an error frame.
    #[error("Peer error `{}`: {}", .response.error, .response.message)]
    Peer {
        /// The decoded error frame.
        response: ErrorResponse,
    },

    /// A successful response could not be decoded into the declared type.
    #[error("Failed to decode `{method}` response: {source}")]
    Decode {
        /// Method name of the command whose response failed to decode.
        method: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Internal invariant violation.
    ///
    /// Surfaced when registry state contradicts the single-writer
    /// discipline. Treated as fatal by the transport.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },

    // ========================================================================
    // Launcher Errors
    // ========================================================================
    /// Launcher configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Driver binary not found at path.
    #[error("Driver binary not found at: {path}")]
    DriverNotFound {
        /// Path where the driver binary was expected.
        path: PathBuf,
    },

    /// Failed to launch the driver process.
    #[error("Failed to launch driver: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// Session creation against the launcher failed.
    #[error("Session setup failed: {message}")]
    SessionSetup {
        /// Description of the session failure.
        message: String,
    },

    /// The launcher did not report ready in time.
    #[error("Driver not ready after {timeout_ms}ms")]
    ReadyTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP error talking to the launcher.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a not-connected error.
    #[inline]
    pub fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
        }
    }

    /// Creates a transport start error.
    #[inline]
    pub fn transport_start_failed(message: impl Into<String>) -> Self {
        Self::TransportStartFailed {
            message: message.into(),
        }
    }

    /// Creates a duplicate command id error.
    #[inline]
    pub fn duplicate_command_id(id: CommandId) -> Self {
        Self::DuplicateCommandId { id }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn command_timeout(id: CommandId, timeout_ms: u64) -> Self {
        Self::CommandTimeout { id, timeout_ms }
    }

    /// Creates an unknown command id error.
    #[inline]
    pub fn unknown_command_id(id: CommandId) -> Self {
        Self::UnknownCommandId { id }
    }

    /// Creates a peer error from a decoded error frame.
    #[inline]
    pub fn peer(response: ErrorResponse) -> Self {
        Self::Peer { response }
    }

    /// Creates a decode failure for a command response.
    #[inline]
    pub fn decode(method: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            method: method.into(),
            source,
        }
    }

    /// Creates an internal invariant error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a driver-not-found error.
    #[inline]
    pub fn driver_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DriverNotFound { path: path.into() }
    }

    /// Creates a process launch error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a session setup error.
    #[inline]
    pub fn session_setup(message: impl Into<String>) -> Self {
        Self::SessionSetup {
            message: message.into(),
        }
    }

    /// Creates a ready timeout error.
    #[inline]
    pub fn ready_timeout(timeout_ms: u64) -> Self {
        Self::ReadyTimeout { timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. } | Self::ReadyTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. }
                | Self::TransportStartFailed { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the peer reported this error.
    #[inline]
    #[must_use]
    pub fn is_peer_error(&self) -> bool {
        matches!(self, Self::Peer { .. })
    }

    /// Returns the peer error response, if any.
    #[inline]
    #[must_use]
    pub fn peer_response(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Peer { response } => Some(response),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::not_connected("send_command");
        assert_eq!(
            err.to_string(),
            "Not connected: send_command requires an open transport"
        );
    }

    #[test]
    fn test_peer_error_display() {
        let err = Error::peer(ErrorResponse {
            error: "no such frame".into(),
            message: "context x not found".into(),
            stacktrace: None,
        });
        assert_eq!(
            err.to_string(),
            "Peer error `no such frame`: context x not found"
        );
    }

    #[test]
    fn test_is_timeout() {
        let id = CommandId::new(1).unwrap();
        let timeout_err = Error::command_timeout(id, 5000);
        let other_err = Error::unknown_command_id(id);

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::not_connected("x").is_connection_error());
        assert!(Error::transport_start_failed("refused").is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_peer_response_accessor() {
        let err = Error::peer(ErrorResponse {
            error: "invalid argument".into(),
            message: "bad frame".into(),
            stacktrace: Some("at foo".into()),
        });

        assert!(err.is_peer_error());
        let response = err.peer_response().expect("peer response");
        assert_eq!(response.error, "invalid argument");
        assert_eq!(response.stacktrace.as_deref(), Some("at foo"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
