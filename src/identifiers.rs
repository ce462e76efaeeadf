//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Backing | Purpose |
//! |------|---------|---------|
//! | [`CommandId`] | `u64` | Command/response correlation on the wire |
//! | [`SubscriptionId`] | UUID | Subscriber tokens in listener lists |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CommandId
// ============================================================================

/// Identifier correlating a command with its response.
///
/// Ids are assigned by the transport's atomic counter, starting at 1 and
/// strictly increasing for the lifetime of a transport. Id 0 is never
/// issued; [`CommandId::new`] rejects it so a zero id arriving from the
/// peer can never match a pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Creates a command id from a raw value.
    ///
    /// Returns `None` for 0, which is reserved and never issued.
    #[inline]
    #[must_use]
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Creates a command id from a counter value known to be non-zero.
    ///
    /// Only the transport's id counter uses this; the counter starts at 1.
    #[inline]
    #[must_use]
    pub(crate) const fn from_counter(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Token identifying one subscriber in a listener list.
///
/// Returned by [`Subscribers::add`](crate::subscribers::Subscribers::add)
/// and used to remove the subscriber later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a fresh subscription id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
