//! Command registry: in-flight commands keyed by id.
//!
//! One [`PendingCommand`] exists per issued command. The send path inserts
//! it; the receive loop is the only writer of its outcome and signals the
//! one-shot completion exactly once; the caller's collect path is the only
//! remover. Waiters never touch the entry directly; they hold the id and
//! go through the registry.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{Command, ErrorResponse};

// ============================================================================
// Types
// ============================================================================

/// Erased decoder from a raw `result` payload into the command's declared
/// result type. Produced at send time, consumed by the receive loop.
type DecodeFn =
    Box<dyn FnOnce(serde_json::Value) -> Result<Box<dyn Any + Send>> + Send>;

// ============================================================================
// CommandOutcome
// ============================================================================

/// What became of an in-flight command.
///
/// `Pending` until the completion signal fires; never mutated afterwards.
pub(crate) enum CommandOutcome {
    /// No response yet.
    Pending,
    /// Successful response, decoded into the declared result type.
    Completed(Box<dyn Any + Send>),
    /// The peer answered with an error frame.
    PeerError(ErrorResponse),
    /// The response arrived but did not match the declared schema.
    DecodeFailure(Error),
    /// The transport left the connected state before a response arrived.
    Aborted,
}

impl std::fmt::Debug for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutcome::Pending => write!(f, "Pending"),
            CommandOutcome::Completed(_) => write!(f, "Completed(..)"),
            CommandOutcome::PeerError(e) => f.debug_tuple("PeerError").field(e).finish(),
            CommandOutcome::DecodeFailure(e) => {
                f.debug_tuple("DecodeFailure").field(e).finish()
            }
            CommandOutcome::Aborted => write!(f, "Aborted"),
        }
    }
}

// ============================================================================
// PendingCommand
// ============================================================================

/// Registry entry for one in-flight command.
pub(crate) struct PendingCommand {
    method: String,
    decode: Option<DecodeFn>,
    outcome: CommandOutcome,
    completion_tx: Option<oneshot::Sender<()>>,
    completion_rx: Option<oneshot::Receiver<()>>,
}

impl std::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("method", &self.method)
            .field("decode", &self.decode.as_ref().map(|_| "..."))
            .field("outcome", &self.outcome)
            .field("completion_tx", &self.completion_tx)
            .field("completion_rx", &self.completion_rx)
            .finish()
    }
}

impl PendingCommand {
    /// Creates an entry for `command`, capturing its result schema as an
    /// erased decode closure.
    pub(crate) fn new<C: Command>(command: &C) -> Self {
        Self::for_method::<C::Result>(command.method())
    }

    /// Builds an entry whose responses decode into `R`.
    fn for_method<R>(method: &str) -> Self
    where
        R: DeserializeOwned + Send + 'static,
    {
        let method = method.to_owned();
        let decode_method = method.clone();
        let decode: DecodeFn = Box::new(move |raw| {
            serde_json::from_value::<R>(raw)
                .map(|value| Box::new(value) as Box<dyn Any + Send>)
                .map_err(|e| Error::decode(decode_method, e))
        });

        let (completion_tx, completion_rx) = oneshot::channel();

        Self {
            method,
            decode: Some(decode),
            outcome: CommandOutcome::Pending,
            completion_tx: Some(completion_tx),
            completion_rx: Some(completion_rx),
        }
    }

    /// Method name, for diagnostics.
    #[inline]
    pub(crate) fn method(&self) -> &str {
        &self.method
    }

    /// Consumes the entry and yields its outcome.
    pub(crate) fn into_outcome(self) -> CommandOutcome {
        self.outcome
    }

    /// Sets the outcome and fires the completion signal.
    ///
    /// Returns `false` without touching anything if the entry already
    /// completed; the outcome is written at most once.
    fn complete(&mut self, outcome: CommandOutcome) -> bool {
        if !matches!(self.outcome, CommandOutcome::Pending) {
            return false;
        }

        self.outcome = outcome;
        if let Some(tx) = self.completion_tx.take() {
            // A dropped receiver just means nobody is waiting yet.
            let _ = tx.send(());
        }
        true
    }
}

// ============================================================================
// CommandRegistry
// ============================================================================

/// Thread-safe mapping from [`CommandId`] to [`PendingCommand`].
pub(crate) struct CommandRegistry {
    entries: Mutex<FxHashMap<CommandId, PendingCommand>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Number of in-flight commands.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Inserts an entry under a freshly assigned id.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateCommandId`] if the id already exists. The atomic
    /// counter makes this unreachable; the check is mandatory anyway and a
    /// firing is an invariant violation.
    pub(crate) fn insert(&self, id: CommandId, pending: PendingCommand) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(Error::duplicate_command_id(id));
        }
        entries.insert(id, pending);
        Ok(())
    }

    /// Completes an entry with a successful raw result.
    ///
    /// Decodes against the entry's schema: success stores the decoded
    /// value, mismatch stores the decode failure. Either way the waiter is
    /// woken. Returns `false` if no entry matched (late or never-issued
    /// response) or the entry already completed.
    pub(crate) fn complete_response(&self, id: CommandId, result: serde_json::Value) -> bool {
        let mut entries = self.entries.lock();
        let Some(pending) = entries.get_mut(&id) else {
            return false;
        };

        let Some(decode) = pending.decode.take() else {
            // Decoder consumed means the entry already completed once.
            warn!(%id, "Response for already-completed command");
            return false;
        };

        let outcome = match decode(result) {
            Ok(value) => CommandOutcome::Completed(value),
            Err(e) => {
                debug!(%id, method = pending.method(), error = %e, "Response decode failed");
                CommandOutcome::DecodeFailure(e)
            }
        };

        pending.complete(outcome)
    }

    /// Completes an entry with a peer error frame.
    ///
    /// Returns `false` if no entry matched or it already completed.
    pub(crate) fn complete_error(&self, id: CommandId, error: ErrorResponse) -> bool {
        let mut entries = self.entries.lock();
        let Some(pending) = entries.get_mut(&id) else {
            return false;
        };

        pending.complete(CommandOutcome::PeerError(error))
    }

    /// Takes the completion receiver for a waiter.
    ///
    /// Returns `Ok(None)` when the entry already completed (waiting is a
    /// no-op), `Ok(Some(rx))` for a live wait.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommandId`] if the id has no entry
    /// - [`Error::Internal`] if another waiter already holds the receiver
    pub(crate) fn take_completion(&self, id: CommandId) -> Result<Option<oneshot::Receiver<()>>> {
        let mut entries = self.entries.lock();
        let pending = entries
            .get_mut(&id)
            .ok_or_else(|| Error::unknown_command_id(id))?;

        if !matches!(pending.outcome, CommandOutcome::Pending) {
            return Ok(None);
        }

        pending
            .completion_rx
            .take()
            .map(Some)
            .ok_or_else(|| Error::internal(format!("command {id} already has a waiter")))
    }

    /// Puts a completion receiver back after a wait timed out.
    ///
    /// The entry may have been collected meanwhile; that is fine, the
    /// receiver is just dropped.
    pub(crate) fn restore_completion(&self, id: CommandId, rx: oneshot::Receiver<()>) {
        let mut entries = self.entries.lock();
        if let Some(pending) = entries.get_mut(&id) {
            pending.completion_rx = Some(rx);
        }
    }

    /// Removes and returns an entry. Caller-side collect path only.
    pub(crate) fn remove(&self, id: CommandId) -> Option<PendingCommand> {
        self.entries.lock().remove(&id)
    }

    /// Removes a completed entry for the collect path.
    ///
    /// A still-pending entry stays in place so a late response can still
    /// land in it.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommandId`] if the id has no entry
    /// - [`Error::Internal`] if the entry has not completed
    pub(crate) fn take_completed(&self, id: CommandId) -> Result<PendingCommand> {
        use std::collections::hash_map::Entry;

        let mut entries = self.entries.lock();
        match entries.entry(id) {
            Entry::Occupied(entry) => {
                if matches!(entry.get().outcome, CommandOutcome::Pending) {
                    Err(Error::internal(format!(
                        "command {id} collected before completion"
                    )))
                } else {
                    Ok(entry.remove())
                }
            }
            Entry::Vacant(_) => Err(Error::unknown_command_id(id)),
        }
    }

    /// Completes every still-pending entry with [`CommandOutcome::Aborted`].
    ///
    /// Entries stay in the map so callers can still collect the error;
    /// only the caller's collect path removes them. Returns how many
    /// commands were aborted.
    pub(crate) fn abort_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let mut aborted = 0;

        for pending in entries.values_mut() {
            if pending.complete(CommandOutcome::Aborted) {
                aborted += 1;
            }
        }

        if aborted > 0 {
            debug!(count = aborted, "Aborted pending commands");
        }
        aborted
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::{EmptyParams, RawCommand};

    fn id(raw: u64) -> CommandId {
        CommandId::new(raw).unwrap()
    }

    fn raw_entry() -> PendingCommand {
        PendingCommand::new(&RawCommand::new("session.status", json!({})))
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(id(1)).is_some());
        assert_eq!(registry.len(), 0);
        assert!(registry.remove(id(1)).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();

        let err = registry.insert(id(1), raw_entry()).unwrap_err();
        assert!(matches!(err, Error::DuplicateCommandId { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_complete_response_decodes() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();

        assert!(registry.complete_response(id(1), json!({"ready": true})));

        let pending = registry.remove(id(1)).unwrap();
        match pending.into_outcome() {
            CommandOutcome::Completed(boxed) => {
                let value = boxed.downcast::<serde_json::Value>().unwrap();
                assert_eq!(*value, json!({"ready": true}));
            }
            _ => panic!("expected Completed"),
        }
    }

    #[test]
    fn test_complete_unknown_id_is_rejected() {
        let registry = CommandRegistry::new();
        assert!(!registry.complete_response(id(9), json!({})));
        assert!(!registry.complete_error(
            id(9),
            ErrorResponse {
                error: "x".into(),
                message: "y".into(),
                stacktrace: None,
            }
        ));
    }

    #[test]
    fn test_outcome_written_at_most_once() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();

        assert!(registry.complete_response(id(1), json!({"first": true})));
        // A duplicate response for the same id must not overwrite.
        assert!(!registry.complete_response(id(1), json!({"second": true})));
        assert!(!registry.complete_error(
            id(1),
            ErrorResponse {
                error: "late".into(),
                message: "".into(),
                stacktrace: None,
            }
        ));

        let pending = registry.remove(id(1)).unwrap();
        match pending.into_outcome() {
            CommandOutcome::Completed(boxed) => {
                let value = boxed.downcast::<serde_json::Value>().unwrap();
                assert_eq!(*value, json!({"first": true}));
            }
            _ => panic!("expected first outcome to stand"),
        }
    }

    #[tokio::test]
    async fn test_completion_signal_fires_once() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();

        let rx = registry.take_completion(id(1)).unwrap().expect("receiver");
        assert!(registry.complete_response(id(1), json!({})));

        rx.await.expect("signal");
    }

    #[test]
    fn test_take_completion_after_completion_is_noop() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();
        registry.complete_response(id(1), json!({}));

        // Already completed: no need to wait.
        assert!(registry.take_completion(id(1)).unwrap().is_none());
    }

    #[test]
    fn test_take_completion_unknown_id() {
        let registry = CommandRegistry::new();
        let err = registry.take_completion(id(5)).unwrap_err();
        assert!(matches!(err, Error::UnknownCommandId { .. }));
    }

    #[test]
    fn test_second_waiter_is_an_invariant_violation() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();

        let _rx = registry.take_completion(id(1)).unwrap().expect("receiver");
        let err = registry.take_completion(id(1)).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn test_restore_completion_allows_rewait() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();

        let rx = registry.take_completion(id(1)).unwrap().expect("receiver");
        registry.restore_completion(id(1), rx);

        // After restore a fresh wait succeeds.
        assert!(registry.take_completion(id(1)).unwrap().is_some());
    }

    #[test]
    fn test_take_completed_refuses_pending_entry() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();

        let err = registry.take_completed(id(1)).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
        // The entry is retained so a late response can still land.
        assert_eq!(registry.len(), 1);

        registry.complete_response(id(1), json!({}));
        assert!(registry.take_completed(id(1)).is_ok());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_abort_all_completes_pending_only() {
        let registry = CommandRegistry::new();
        registry.insert(id(1), raw_entry()).unwrap();
        registry.insert(id(2), raw_entry()).unwrap();
        registry.complete_response(id(1), json!({}));

        assert_eq!(registry.abort_all(), 1);
        // Entries are retained for the collect path.
        assert_eq!(registry.len(), 2);

        let aborted = registry.remove(id(2)).unwrap();
        assert!(matches!(aborted.into_outcome(), CommandOutcome::Aborted));
    }

    #[test]
    fn test_decode_failure_is_captured() {
        #[derive(Debug, serde::Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            ready: bool,
        }

        struct StrictStatus {}

        impl Command for StrictStatus {
            type Params = EmptyParams;
            type Result = Strict;

            fn method(&self) -> &str {
                "session.status"
            }

            fn params(&self) -> &EmptyParams {
                &EmptyParams {}
            }
        }

        let registry = CommandRegistry::new();
        registry
            .insert(id(1), PendingCommand::new(&StrictStatus {}))
            .unwrap();

        // "ready" is missing, so the declared schema does not match.
        assert!(registry.complete_response(id(1), json!({"unexpected": 1})));

        let pending = registry.remove(id(1)).unwrap();
        match pending.into_outcome() {
            CommandOutcome::DecodeFailure(Error::Decode { method, .. }) => {
                assert_eq!(method, "session.status");
            }
            _ => panic!("expected DecodeFailure"),
        }
    }
}
