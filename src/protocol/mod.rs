//! Protocol message types.
//!
//! This module defines the wire-level vocabulary spoken over the
//! WebSocket: outgoing command frames, inbound frame classification, and
//! the traits binding typed params/payloads to method names.
//!
//! # Frame Shapes
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | client → peer | `{ "id": <int>, "method": <string>, "params": <object> }` |
//! | peer → client | `{ "id": <int>, "result": <object> }` |
//! | peer → client | `{ "id": <int or null>, "error": <string>, "message": <string> }` |
//! | peer → client | `{ "method": <string>, "params": <object> }` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | [`Command`] trait, [`RawCommand`], outgoing frame |
//! | `event` | [`Event`] trait for typed payloads |
//! | `message` | [`InboundMessage`] classification, [`ErrorResponse`] |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions and the outgoing frame format.
pub mod command;

/// Typed event payloads.
pub mod event;

/// Inbound frame classification.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, EmptyParams, EmptyResult, RawCommand};
pub use event::Event;
pub use message::{ErrorResponse, InboundMessage};

pub(crate) use command::CommandFrame;
