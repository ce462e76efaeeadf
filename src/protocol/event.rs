//! Typed event payloads.
//!
//! Events are peer-initiated messages with a `method` name and no id. A
//! type implementing [`Event`] declares the payload schema for one event
//! name; the transport's event registry decodes inbound `params` into it
//! before dispatch.

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;

// ============================================================================
// Event Trait
// ============================================================================

/// A typed event payload bound to one event name.
///
/// # Example
///
/// ```
/// use bidi_webdriver::protocol::Event;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Load {
///     context: String,
///     url: String,
///     timestamp: u64,
/// }
///
/// impl Event for Load {
///     const METHOD: &'static str = "browsingContext.load";
/// }
/// ```
pub trait Event: DeserializeOwned + Send + 'static {
    /// The event name this payload decodes, in `module.eventName` format.
    const METHOD: &'static str;
}
