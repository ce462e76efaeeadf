//! Command definitions and the outgoing frame format.
//!
//! A command is a `(method, params)` pair plus a declared result type:
//! the schema the transport uses to decode the peer's response. Typed
//! commands implement [`Command`]; [`RawCommand`] is the untyped escape
//! hatch for methods without a declared shape.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::CommandId;

// ============================================================================
// Command Trait
// ============================================================================

/// A protocol command with a declared result schema.
///
/// The transport serializes `params()` under the command's `method()` and
/// decodes the eventual `result` payload into [`Command::Result`]. The
/// client attaches no meaning to method names; `"browsingContext.navigate"`
/// is just a string routed to the peer.
///
/// # Example
///
/// ```
/// use bidi_webdriver::protocol::Command;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize)]
/// struct Navigate {
///     context: String,
///     url: String,
/// }
///
/// #[derive(Debug, Deserialize)]
/// struct NavigateResult {
///     url: String,
/// }
///
/// impl Command for Navigate {
///     type Params = Self;
///     type Result = NavigateResult;
///
///     fn method(&self) -> &str {
///         "browsingContext.navigate"
///     }
///
///     fn params(&self) -> &Self {
///         self
///     }
/// }
/// ```
pub trait Command: Send + Sync {
    /// Serialized form of the command parameters.
    type Params: Serialize;

    /// Declared shape of a successful response payload.
    type Result: DeserializeOwned + Send + 'static;

    /// Method name in `module.methodName` format.
    fn method(&self) -> &str;

    /// Parameters serialized into the outgoing frame.
    fn params(&self) -> &Self::Params;
}

// ============================================================================
// EmptyParams / EmptyResult
// ============================================================================

/// Parameter set for commands that take none; serializes to `{}`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EmptyParams {}

/// Result shape for commands whose response payload carries no fields.
///
/// Unknown members are ignored, matching the protocol's extensibility rule.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EmptyResult {}

// ============================================================================
// RawCommand
// ============================================================================

/// An untyped command: arbitrary method name, JSON params, JSON result.
///
/// Useful for methods this crate declares no types for, and for tests.
#[derive(Debug, Clone)]
pub struct RawCommand {
    method: String,
    params: Value,
}

impl RawCommand {
    /// Creates a raw command.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

impl Command for RawCommand {
    type Params = Value;
    type Result = Value;

    #[inline]
    fn method(&self) -> &str {
        &self.method
    }

    #[inline]
    fn params(&self) -> &Value {
        &self.params
    }
}

// ============================================================================
// CommandFrame
// ============================================================================

/// The outgoing wire frame: `{ "id": ..., "method": ..., "params": ... }`.
///
/// Every client-to-peer frame carries an id; the transport never emits a
/// frame without one.
#[derive(Debug, Serialize)]
pub(crate) struct CommandFrame<'a, P: Serialize> {
    /// Correlation id assigned by the transport.
    pub id: CommandId,

    /// Method name.
    pub method: &'a str,

    /// Command parameters.
    pub params: &'a P,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_serialization() {
        let command = RawCommand::new("session.status", json!({}));
        let frame = CommandFrame {
            id: CommandId::new(1).unwrap(),
            method: command.method(),
            params: command.params(),
        };

        let text = serde_json::to_string(&frame).unwrap();
        assert_eq!(text, r#"{"id":1,"method":"session.status","params":{}}"#);
    }

    #[test]
    fn test_frame_preserves_params() {
        let command = RawCommand::new(
            "browsingContext.navigate",
            json!({"context": "x", "url": "about:blank"}),
        );
        let frame = CommandFrame {
            id: CommandId::new(2).unwrap(),
            method: command.method(),
            params: command.params(),
        };

        let value: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["id"], 2);
        assert_eq!(value["method"], "browsingContext.navigate");
        assert_eq!(value["params"]["url"], "about:blank");
    }

    #[test]
    fn test_empty_params_serialize_to_object() {
        let text = serde_json::to_string(&EmptyParams {}).unwrap();
        assert_eq!(text, "{}");
    }

    #[test]
    fn test_empty_result_ignores_unknown_members() {
        let _result: EmptyResult =
            serde_json::from_value(json!({"extra": 1, "more": "fields"})).unwrap();
    }
}
