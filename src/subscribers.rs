//! Listener lists for typed event fan-out.
//!
//! The transport delivers each event name to a single dispatcher. Module
//! layers that want many listeners per event register one dispatcher and
//! multiplex through a [`Subscribers`] list.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;

use crate::identifiers::SubscriptionId;

// ============================================================================
// Types
// ============================================================================

type Callback<E> = Box<dyn Fn(&E) + Send + Sync>;

// ============================================================================
// Subscribers
// ============================================================================

/// A thread-safe list of event callbacks.
///
/// Adding and removing are safe with respect to concurrent dispatch, and a
/// removed subscriber is never invoked afterwards: the list lock is held
/// across [`notify`](Subscribers::notify), so removal either completes
/// before a dispatch round or strictly after it. Callbacks therefore must
/// not block and must not touch the same list reentrantly.
///
/// # Example
///
/// ```
/// use bidi_webdriver::subscribers::Subscribers;
///
/// let subscribers: Subscribers<String> = Subscribers::new();
/// let token = subscribers.add(|url| println!("loaded {url}"));
/// subscribers.notify(&"https://example.com".to_string());
/// subscribers.remove(token);
/// ```
pub struct Subscribers<E> {
    entries: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Subscribers<E> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Adds a subscriber and returns its removal token.
    pub fn add(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.entries.lock().push((id, Box::new(callback)));
        id
    }

    /// Removes a subscriber.
    ///
    /// Returns `false` if the token was already removed. After this call
    /// returns, the callback will not be invoked again.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invokes every current subscriber, in registration order.
    pub fn notify(&self, event: &E) {
        let entries = self.entries.lock();
        for (_, callback) in entries.iter() {
            callback(event);
        }
    }

    /// Number of subscribers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nobody is subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
