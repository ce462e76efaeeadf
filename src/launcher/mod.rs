//! Browser launcher: driver process supervision.
//!
//! The launcher is an optional collaborator of the transport. It spawns a
//! WebDriver driver binary on a locally acquired port, waits for its HTTP
//! status endpoint, and negotiates a session whose capabilities carry the
//! `webSocketUrl` string the transport connects to.
//!
//! # Launch Flow
//!
//! 1. Acquire a free local port (process-wide lock over find-then-spawn)
//! 2. Spawn the driver binary with `--port=<port>`, stdio suppressed
//! 3. Poll `GET /status` until `value.ready` is true
//! 4. `POST /session` requesting `webSocketUrl: true`
//! 5. Hand the discovered WebSocket URL to the transport
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent launcher configuration |
//! | `core` | Process spawn, readiness, session HTTP calls |
//! | `port` | Free-port acquisition |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent launcher configuration.
pub mod builder;

/// Process spawn and session negotiation.
pub mod core;

/// Free-port acquisition.
pub(crate) mod port;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::LauncherBuilder;
pub use self::core::{DriverProcess, DriverSession, DriverStatus, Launcher};
