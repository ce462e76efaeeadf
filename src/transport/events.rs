//! Event registry: event name to decode-and-dispatch descriptor.
//!
//! Registration normally happens during transport setup, before connect;
//! runtime registration is allowed because the map sits behind a lock
//! shared with the receive loop. Descriptors are never unregistered;
//! they live as long as the transport.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use crate::protocol::Event;

// ============================================================================
// Types
// ============================================================================

/// Erased decoder-plus-dispatcher for one event name.
type DispatchFn = Box<dyn Fn(Value) -> Result<(), serde_json::Error> + Send + Sync>;

/// Outcome of routing one inbound event frame.
pub(crate) enum DispatchOutcome {
    /// Payload decoded and the callback ran.
    Dispatched,
    /// No descriptor registered for this name.
    Unregistered,
    /// The payload did not match the registered schema.
    DecodeFailed(serde_json::Error),
}

// ============================================================================
// EventDescriptor
// ============================================================================

/// Schema descriptor plus dispatch callback for one event name.
struct EventDescriptor {
    dispatch: DispatchFn,
}

// ============================================================================
// EventRegistry
// ============================================================================

/// Mapping from event name to [`EventDescriptor`].
///
/// Dispatch callbacks run synchronously on the receive loop and must not
/// block; hand off to a channel for anything heavier.
pub(crate) struct EventRegistry {
    entries: RwLock<FxHashMap<String, Arc<EventDescriptor>>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Number of registered event names.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Registers a typed dispatcher for `E::METHOD`.
    ///
    /// Last writer wins on name collisions: registering the same event
    /// name again replaces the previous dispatcher.
    pub(crate) fn register<E, F>(&self, dispatch: F)
    where
        E: Event,
        F: Fn(E) + Send + Sync + 'static,
    {
        let erased: DispatchFn = Box::new(move |params| {
            let payload = serde_json::from_value::<E>(params)?;
            dispatch(payload);
            Ok(())
        });

        let descriptor = Arc::new(EventDescriptor { dispatch: erased });
        let previous = self
            .entries
            .write()
            .insert(E::METHOD.to_owned(), descriptor);

        if previous.is_some() {
            debug!(method = E::METHOD, "Replaced event dispatcher");
        }
    }

    /// Looks up `method` and runs its dispatcher against `params`.
    ///
    /// The descriptor is cloned out of the map before the callback runs,
    /// so registrations from inside a callback cannot deadlock.
    pub(crate) fn dispatch(&self, method: &str, params: Value) -> DispatchOutcome {
        let descriptor = {
            let entries = self.entries.read();
            entries.get(method).cloned()
        };

        let Some(descriptor) = descriptor else {
            return DispatchOutcome::Unregistered;
        };

        match (descriptor.dispatch)(params) {
            Ok(()) => DispatchOutcome::Dispatched,
            Err(e) => DispatchOutcome::DecodeFailed(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Load {
        context: String,
        url: String,
        timestamp: u64,
    }

    impl Event for Load {
        const METHOD: &'static str = "browsingContext.load";
    }

    #[test]
    fn test_dispatch_decodes_payload() {
        let registry = EventRegistry::new();
        let seen: Arc<Mutex<Vec<(String, String, u64)>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        registry.register::<Load, _>(move |event| {
            sink.lock()
                .push((event.context, event.url, event.timestamp));
        });

        let outcome = registry.dispatch(
            "browsingContext.load",
            json!({"context": "c1", "url": "https://a", "timestamp": 1700}),
        );

        assert!(matches!(outcome, DispatchOutcome::Dispatched));
        assert_eq!(
            seen.lock().as_slice(),
            [("c1".to_owned(), "https://a".to_owned(), 1700)]
        );
    }

    #[test]
    fn test_unregistered_event() {
        let registry = EventRegistry::new();
        let outcome = registry.dispatch("some.unregistered", json!({}));
        assert!(matches!(outcome, DispatchOutcome::Unregistered));
    }

    #[test]
    fn test_decode_failure() {
        let registry = EventRegistry::new();
        registry.register::<Load, _>(|_| panic!("must not dispatch"));

        let outcome = registry.dispatch("browsingContext.load", json!({"context": 42}));
        assert!(matches!(outcome, DispatchOutcome::DecodeFailed(_)));
    }

    #[test]
    fn test_registration_is_last_writer_wins() {
        let registry = EventRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        registry.register::<Load, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let counter = Arc::clone(&second);
        registry.register::<Load, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.len(), 1);

        registry.dispatch(
            "browsingContext.load",
            json!({"context": "c", "url": "u", "timestamp": 1}),
        );

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
