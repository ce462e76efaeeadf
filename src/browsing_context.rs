//! The `browsingContext` module: navigation, context tree and lifecycle
//! events.
//!
//! Contexts are referred to by their peer-assigned string ids; this crate
//! attaches no meaning to them.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::identifiers::SubscriptionId;
use crate::protocol::{Command, EmptyParams, EmptyResult, Event};
use crate::subscribers::Subscribers;
use crate::transport::Transport;

// ============================================================================
// browsingContext.navigate
// ============================================================================

/// When a navigate command is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadinessState {
    /// Return as soon as the navigation was initiated.
    None,
    /// Wait for `domContentLoaded`.
    Interactive,
    /// Wait for the load event.
    Complete,
}

/// `browsingContext.navigate` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigate {
    /// Target context id.
    pub context: String,
    /// Destination URL.
    pub url: String,
    /// Completion condition.
    pub wait: ReadinessState,
}

impl Command for Navigate {
    type Params = Self;
    type Result = NavigateResult;

    fn method(&self) -> &str {
        "browsingContext.navigate"
    }

    fn params(&self) -> &Self {
        self
    }
}

/// Result of `browsingContext.navigate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    /// Navigation id, when the peer tracked one.
    pub navigation: Option<String>,
    /// The URL actually navigated to.
    pub url: String,
}

// ============================================================================
// browsingContext.getTree
// ============================================================================

/// `browsingContext.getTree` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetTree {}

impl Command for GetTree {
    type Params = EmptyParams;
    type Result = GetTreeResult;

    fn method(&self) -> &str {
        "browsingContext.getTree"
    }

    fn params(&self) -> &EmptyParams {
        &EmptyParams {}
    }
}

/// Result of `browsingContext.getTree`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTreeResult {
    /// Top-level contexts.
    pub contexts: Vec<ContextInfo>,
}

/// One node of the context tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    /// Context id.
    pub context: String,
    /// Current document URL.
    pub url: String,
    /// Child contexts, when requested.
    #[serde(default)]
    pub children: Option<Vec<ContextInfo>>,
    /// Parent context id, absent for top-level contexts.
    #[serde(default)]
    pub parent: Option<String>,
}

// ============================================================================
// browsingContext.create / browsingContext.close
// ============================================================================

/// Kind of context to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CreateType {
    /// A new tab.
    Tab,
    /// A new window.
    Window,
}

/// `browsingContext.create` command.
#[derive(Debug, Clone, Serialize)]
pub struct Create {
    /// Tab or window.
    #[serde(rename = "type")]
    pub create_type: CreateType,
}

impl Command for Create {
    type Params = Self;
    type Result = CreateResult;

    fn method(&self) -> &str {
        "browsingContext.create"
    }

    fn params(&self) -> &Self {
        self
    }
}

/// Result of `browsingContext.create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    /// Id of the created context.
    pub context: String,
}

/// `browsingContext.close` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Close {
    /// Context to close.
    pub context: String,
}

impl Command for Close {
    type Params = Self;
    type Result = EmptyResult;

    fn method(&self) -> &str {
        "browsingContext.close"
    }

    fn params(&self) -> &Self {
        self
    }
}

// ============================================================================
// Events
// ============================================================================

/// `browsingContext.load` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    /// Context that finished loading.
    pub context: String,
    /// Document URL.
    pub url: String,
    /// Peer clock, milliseconds since the epoch.
    pub timestamp: u64,
    /// Navigation id, when the peer tracked one.
    #[serde(default)]
    pub navigation: Option<String>,
}

impl Event for Load {
    const METHOD: &'static str = "browsingContext.load";
}

/// `browsingContext.domContentLoaded` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomContentLoaded {
    /// Context whose DOM became ready.
    pub context: String,
    /// Document URL.
    pub url: String,
    /// Peer clock, milliseconds since the epoch.
    pub timestamp: u64,
    /// Navigation id, when the peer tracked one.
    #[serde(default)]
    pub navigation: Option<String>,
}

impl Event for DomContentLoaded {
    const METHOD: &'static str = "browsingContext.domContentLoaded";
}

// ============================================================================
// LoadListeners
// ============================================================================

/// Fan-out hub for [`Load`] events.
///
/// The transport accepts one dispatcher per event name; this hub is that
/// dispatcher and multiplexes to any number of listeners. Attaching twice
/// replaces the previous hub (last writer wins on the event name).
pub struct LoadListeners {
    subscribers: Arc<Subscribers<Load>>,
}

impl LoadListeners {
    /// Registers the hub as the `browsingContext.load` dispatcher.
    #[must_use]
    pub fn attach(transport: &Transport) -> Self {
        let subscribers = Arc::new(Subscribers::new());

        let fanout = Arc::clone(&subscribers);
        transport.register_event::<Load, _>(move |event| fanout.notify(&event));

        Self { subscribers }
    }

    /// Adds a listener; returns its removal token.
    pub fn add(&self, listener: impl Fn(&Load) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribers.add(listener)
    }

    /// Removes a listener. It will not be invoked again.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    /// Number of attached listeners.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` if nobody is listening.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

// ============================================================================
// BrowsingContextModule
// ============================================================================

/// Facade bundling the `browsingContext.*` commands.
pub struct BrowsingContextModule<'a> {
    transport: &'a Transport,
}

impl Transport {
    /// The `browsingContext` module facade.
    #[inline]
    #[must_use]
    pub fn browsing_context(&self) -> BrowsingContextModule<'_> {
        BrowsingContextModule { transport: self }
    }
}

impl BrowsingContextModule<'_> {
    /// Navigates a context and waits per `wait`.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn navigate(
        &self,
        context: impl Into<String>,
        url: impl Into<String>,
        wait: ReadinessState,
    ) -> Result<NavigateResult> {
        self.transport
            .send_command_and_wait(&Navigate {
                context: context.into(),
                url: url.into(),
                wait,
            })
            .await
    }

    /// Returns the tree of open contexts.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn get_tree(&self) -> Result<GetTreeResult> {
        self.transport.send_command_and_wait(&GetTree {}).await
    }

    /// Opens a new tab or window.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn create(&self, create_type: CreateType) -> Result<CreateResult> {
        self.transport
            .send_command_and_wait(&Create { create_type })
            .await
    }

    /// Closes a context.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send_command_and_wait`].
    pub async fn close(&self, context: impl Into<String>) -> Result<()> {
        self.transport
            .send_command_and_wait(&Close {
                context: context.into(),
            })
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
