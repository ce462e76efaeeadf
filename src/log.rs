//! The `log` module: console and script log entries pushed by the peer.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::protocol::Event;

// ============================================================================
// log.entryAdded
// ============================================================================

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    /// Verbose diagnostics.
    Debug,
    /// Informational output.
    Info,
    /// Something looks wrong.
    Warn,
    /// Something is wrong.
    Error,
}

/// `log.entryAdded` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAdded {
    /// Entry severity.
    pub level: Level,
    /// Message text; script entries may carry none.
    #[serde(default)]
    pub text: Option<String>,
    /// Peer clock, milliseconds since the epoch.
    pub timestamp: u64,
}

impl Event for EntryAdded {
    const METHOD: &'static str = "log.entryAdded";
}

// ============================================================================
// Tests
// ============================================================================
