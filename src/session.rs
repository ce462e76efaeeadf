//! The `session` module: status, session lifecycle and event subscription.
//!
//! Thin typed facade over [`Transport::send_command_and_wait`]. The
//! transport does not know what any of these methods mean; this module
//! pins down their parameter and result shapes.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::protocol::{Command, EmptyParams, EmptyResult};
use crate::transport::Transport;

// ============================================================================
// session.status
// ============================================================================

/// `session.status` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {}

impl Command for Status {
    type Params = EmptyParams;
    type Result = StatusResult;

    fn method(&self) -> &str {
        "session.status"
    }

    fn params(&self) -> &EmptyParams {
        &EmptyParams {}
    }
}

/// Result of `session.status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    /// Whether the peer accepts new sessions.
    pub ready: bool,
    /// Implementation-defined status message.
    pub message: String,
}

// ============================================================================
// session.new
// ============================================================================

/// `session.new` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct New {
    /// Requested capabilities.
    pub capabilities: CapabilitiesRequest,
}

impl Command for New {
    type Params = Self;
    type Result = NewResult;

    fn method(&self) -> &str {
        "session.new"
    }

    fn params(&self) -> &Self {
        self
    }
}

/// Capabilities negotiation payload for `session.new`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesRequest {
    /// Capabilities every match must satisfy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_match: Option<Value>,
}

/// Result of `session.new`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResult {
    /// Peer-assigned session id.
    pub session_id: String,
    /// Matched capabilities, kept loose; browsers extend this freely.
    pub capabilities: Value,
}

// ============================================================================
// session.end
// ============================================================================

/// `session.end` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct End {}

impl Command for End {
    type Params = EmptyParams;
    type Result = EmptyResult;

    fn method(&self) -> &str {
        "session.end"
    }

    fn params(&self) -> &EmptyParams {
        &EmptyParams {}
    }
}

// ============================================================================
// session.subscribe / session.unsubscribe
// ============================================================================

/// Event subscription payload shared by subscribe and unsubscribe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// Event names, e.g. `"browsingContext.load"`.
    pub events: Vec<String>,
    /// Restrict to these browsing contexts; empty means global.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
}

/// `session.subscribe` command.
#[derive(Debug, Clone, Serialize)]
pub struct Subscribe(pub SubscriptionRequest);

impl Command for Subscribe {
    type Params = SubscriptionRequest;
    type Result = EmptyResult;

    fn method(&self) -> &str {
        "session.subscribe"
    }

    fn params(&self) -> &SubscriptionRequest {
        &self.0
    }
}

/// `session.unsubscribe` command.
#[derive(Debug, Clone, Serialize)]
pub struct Unsubscribe(pub SubscriptionRequest);

impl Command for Unsubscribe {
    type Params = SubscriptionRequest;
    type Result = EmptyResult;

    fn method(&self) -> &str {
        "session.unsubscribe"
    }

    fn params(&self) -> &SubscriptionRequest {
        &self.0
    }
}

// ============================================================================
// SessionModule
// ============================================================================

/// Facade bundling the `session.*` commands.
pub struct SessionModule<'a> {
    transport: &'a Transport,
}

impl Transport {
    /// The `session` module facade.
    #[inline]
    #[must_use]
    pub fn session(&self) -> SessionModule<'_> {
        SessionModule { transport: self }
    }
}

impl SessionModule<'_> {
    /// Queries peer readiness.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn status(&self) -> Result<StatusResult> {
        self.transport.send_command_and_wait(&Status {}).await
    }

    /// Negotiates a new session.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn new_session(&self, capabilities: CapabilitiesRequest) -> Result<NewResult> {
        self.transport
            .send_command_and_wait(&New { capabilities })
            .await
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn end(&self) -> Result<()> {
        self.transport.send_command_and_wait(&End {}).await?;
        Ok(())
    }

    /// Subscribes to the named events, globally.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn subscribe(&self, events: &[&str]) -> Result<()> {
        let request = SubscriptionRequest {
            events: events.iter().map(ToString::to_string).collect(),
            contexts: Vec::new(),
        };
        self.transport
            .send_command_and_wait(&Subscribe(request))
            .await?;
        Ok(())
    }

    /// Drops subscriptions to the named events.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn unsubscribe(&self, events: &[&str]) -> Result<()> {
        let request = SubscriptionRequest {
            events: events.iter().map(ToString::to_string).collect(),
            contexts: Vec::new(),
        };
        self.transport
            .send_command_and_wait(&Unsubscribe(request))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_status_params_are_empty() {
        let command = Status {};
        assert_eq!(serde_json::to_value(command.params()).unwrap(), json!({}));
        assert_eq!(command.method(), "session.status");
    }

    #[test]
    fn test_status_result_shape() {
        let result: StatusResult =
            serde_json::from_value(json!({"ready": true, "message": "ok"})).unwrap();
        assert!(result.ready);
        assert_eq!(result.message, "ok");
    }

    #[test]
    fn test_new_session_requests_websocket_url() {
        let command = New {
            capabilities: CapabilitiesRequest {
                always_match: Some(json!({"webSocketUrl": true})),
            },
        };

        let value = serde_json::to_value(command.params()).unwrap();
        assert_eq!(value["capabilities"]["alwaysMatch"]["webSocketUrl"], true);
    }

    #[test]
    fn test_new_result_shape() {
        let result: NewResult = serde_json::from_value(json!({
            "sessionId": "abc-123",
            "capabilities": {"browserName": "firefox"}
        }))
        .unwrap();

        assert_eq!(result.session_id, "abc-123");
        assert_eq!(result.capabilities["browserName"], "firefox");
    }

    #[test]
    fn test_subscribe_omits_empty_contexts() {
        let command = Subscribe(SubscriptionRequest {
            events: vec!["log.entryAdded".into()],
            contexts: Vec::new(),
        });

        let value = serde_json::to_value(command.params()).unwrap();
        assert_eq!(value, json!({"events": ["log.entryAdded"]}));
        assert_eq!(command.method(), "session.subscribe");
    }

    #[test]
    fn test_subscribe_with_contexts() {
        let command = Unsubscribe(SubscriptionRequest {
            events: vec!["browsingContext.load".into()],
            contexts: vec!["ctx-1".into()],
        });

        let value = serde_json::to_value(command.params()).unwrap();
        assert_eq!(value["contexts"], json!(["ctx-1"]));
    }
}
