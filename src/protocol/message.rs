//! Inbound frame classification.
//!
//! Every text frame received from the peer is sorted into exactly one of
//! five categories before the transport routes it:
//!
//! | Variant | Condition |
//! |---------|-----------|
//! | [`InboundMessage::CommandResponse`] | non-null integer `id` and `result` present |
//! | [`InboundMessage::CommandError`] | non-null integer `id` and top-level error fields |
//! | [`InboundMessage::UnsolicitedError`] | no `id` (or `id: null`) and top-level error fields |
//! | [`InboundMessage::Event`] | `method` string and `params` present |
//! | [`InboundMessage::Unknown`] | anything else, including unparseable frames |
//!
//! A frame carrying both `result` and `error` classifies as an error;
//! classification never fails, so a malformed frame degrades to `Unknown`
//! instead of killing the receive loop.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

// ============================================================================
// ErrorResponse
// ============================================================================

/// Decoded form of a peer error frame.
///
/// # Format
///
/// ```json
/// {
///   "id": 2,
///   "error": "no such frame",
///   "message": "context x not found",
///   "stacktrace": "..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code, e.g. `"invalid argument"`.
    pub error: String,

    /// Human-readable description.
    pub message: String,

    /// Optional remote stack trace.
    #[serde(default)]
    pub stacktrace: Option<String>,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl ErrorResponse {
    /// Extracts the top-level error fields from a frame object.
    ///
    /// Returns `None` unless `error` is present as a string. A missing
    /// `message` becomes the empty string; peers are not all equally
    /// diligent about it.
    fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let error = object.get("error")?.as_str()?.to_owned();
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let stacktrace = object
            .get("stacktrace")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        Some(Self {
            error,
            message,
            stacktrace,
        })
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// One received frame, classified.
///
/// Ids are carried as raw `u64` here; matching them against issued
/// [`CommandId`](crate::identifiers::CommandId)s is the transport's job,
/// and an id the transport never issued (including 0) routes the frame to
/// the unknown-message path.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Successful response to a command.
    CommandResponse {
        /// Correlation id echoed by the peer.
        id: u64,
        /// Raw result payload, decoded later against the command's schema.
        result: Value,
    },

    /// Error response to a command.
    CommandError {
        /// Correlation id echoed by the peer.
        id: u64,
        /// Decoded error fields.
        error: ErrorResponse,
    },

    /// Error frame with no id (or `id: null`).
    UnsolicitedError {
        /// Decoded error fields.
        error: ErrorResponse,
    },

    /// Peer-initiated event.
    Event {
        /// Event name in `module.eventName` format.
        method: String,
        /// Raw event payload.
        params: Value,
    },

    /// Anything that matched no other category.
    Unknown {
        /// The frame text as received.
        raw: String,
    },
}

impl InboundMessage {
    /// Classifies one raw text frame.
    ///
    /// Rules are applied in order; exactly one variant is produced for any
    /// input and classification itself never errors.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw) else {
            return Self::Unknown {
                raw: raw.to_owned(),
            };
        };

        // An `id` that is present but null counts as no id.
        let id = object.get("id").and_then(Value::as_u64);
        let id_is_absent = match object.get("id") {
            None | Some(Value::Null) => true,
            Some(_) => false,
        };

        if let Some(id) = id {
            // Error takes precedence over result when both are present.
            if let Some(error) = ErrorResponse::from_object(&object) {
                return Self::CommandError { id, error };
            }
            if let Some(result) = object.get("result") {
                return Self::CommandResponse {
                    id,
                    result: result.clone(),
                };
            }
        }

        if id_is_absent
            && let Some(error) = ErrorResponse::from_object(&object)
        {
            return Self::UnsolicitedError { error };
        }

        if let Some(method) = object.get("method").and_then(Value::as_str)
            && let Some(params) = object.get("params")
        {
            return Self::Event {
                method: method.to_owned(),
                params: params.clone(),
            };
        }

        Self::Unknown {
            raw: raw.to_owned(),
        }
    }

    /// Returns a short label for logging.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandResponse { .. } => "command-response",
            Self::CommandError { .. } => "command-error",
            Self::UnsolicitedError { .. } => "unsolicited-error",
            Self::Event { .. } => "event",
            Self::Unknown { .. } => "unknown",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
