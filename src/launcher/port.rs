//! Local port acquisition for spawned drivers.
//!
//! Binding port 0 and reading back the assignment is inherently racy
//! against other local binders: the port is released again before the
//! driver binds it. A process-wide lock narrows the window by serializing
//! find-then-spawn sequences within this process.

// ============================================================================
// Imports
// ============================================================================

use std::net::{Ipv4Addr, TcpListener};

use parking_lot::{Mutex, MutexGuard};

use crate::error::Result;

// ============================================================================
// Spawn Lock
// ============================================================================

static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Serializes the find-port-then-spawn critical section process-wide.
///
/// Hold the guard from port acquisition until the driver process has been
/// spawned.
pub(crate) fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock()
}

// ============================================================================
// Port Acquisition
// ============================================================================

/// Acquires a currently free local port.
///
/// Binds `127.0.0.1:0`, reads the OS assignment, and releases the socket.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if binding fails.
pub(crate) fn free_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_nonzero() {
        let port = free_port().expect("port");
        assert!(port > 0);
    }

    #[test]
    fn test_spawn_lock_is_reentrant_across_calls() {
        {
            let _guard = spawn_lock();
            let _port = free_port().expect("port under lock");
        }
        // Released; a second acquisition must not deadlock.
        let _guard = spawn_lock();
    }
}
