//! Pending Operation Registry — the cross-boundary continuation primitive
//!
//! Everything in this system that pauses and resumes — an OAuth flow waiting
//! on a browser callback, a sandboxed page reporting its result — goes
//! through one primitive: an opaque operation id mapped to a write-once
//! result slot. The waiter parks on the slot; the HTTP surface resolves it
//! from whatever thread the callback happens to arrive on.
//!
//! # Resolution across contexts
//!
//! A callback handler runs on an arbitrary runtime worker while the waiter
//! is parked on another. [`OperationSlot::wait`] never reads the cell
//! without re-arming a [`Notify`] listener first, and `resolve` stores the
//! value before waking, so the wake-up is marshalled through the scheduler
//! rather than handed a shared mutable result directly — the waiter always
//! observes the value its wake-up announced.
//!
//! # No timeouts
//!
//! The registry never times an operation out and never resolves one on its
//! own. Callers impose deadlines by racing [`OperationSlot::wait`] against
//! their own timer; an abandoned operation simply becomes unreachable and is
//! removed when (or if) its owner cleans up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Registry errors
#[derive(Error, Debug)]
pub enum PendingError {
    #[error("No pending operation with id '{0}'")]
    NotFound(String),
}

/// Value a pending operation resolves to.
///
/// External failures (denied consent, a sandboxed script raising) arrive
/// here as [`Failed`](OperationOutcome::Failed) — delivered through the slot
/// like any other result, never thrown across the async boundary.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    /// The callback delivered a payload
    Delivered(serde_json::Value),
    /// The external flow reported failure
    Failed(String),
}

impl OperationOutcome {
    pub fn into_result(self) -> Result<serde_json::Value, String> {
        match self {
            OperationOutcome::Delivered(value) => Ok(value),
            OperationOutcome::Failed(message) => Err(message),
        }
    }
}

/// A single not-yet-resolved operation.
///
/// Write-once: the first `resolve` wins, later ones are silent no-ops. The
/// slot is `Arc`-shared so a duplicate `create` can hand back the same
/// handle.
#[derive(Debug)]
pub struct OperationSlot {
    id: String,
    /// Free-form metadata attached at creation (thread, profile, redirect)
    meta: HashMap<String, String>,
    cell: Mutex<Option<OperationOutcome>>,
    notify: Notify,
}

impl OperationSlot {
    fn new(id: String, meta: HashMap<String, String>) -> Self {
        Self {
            id,
            meta,
            cell: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Whether the slot already holds an outcome.
    pub fn is_resolved(&self) -> bool {
        self.cell.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Store the outcome. Returns false (and keeps the first value) if the
    /// slot was already resolved.
    fn set(&self, outcome: OperationOutcome) -> bool {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if cell.is_some() {
            return false;
        }
        *cell = Some(outcome);
        drop(cell);
        self.notify.notify_waiters();
        true
    }

    /// Suspend until the slot is resolved.
    ///
    /// Cooperative: parks only this task. The listener is armed before the
    /// cell is checked, so a resolve landing between the check and the await
    /// still wakes us.
    pub async fn wait(&self) -> OperationOutcome {
        loop {
            let notified = self.notify.notified();
            if let Some(outcome) = self
                .cell
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
            {
                return outcome;
            }
            notified.await;
        }
    }
}

/// In-process map from operation id to result slot.
///
/// Explicitly constructed and injected — there is no process-wide singleton.
/// One instance is shared (via `Arc`) between the orchestrator, the
/// runtimes, and the HTTP callback surface.
#[derive(Debug, Default)]
pub struct PendingOperations {
    /// `std::sync::Mutex`: held only for map insert/remove/lookup, so
    /// blocking the runtime briefly is acceptable and resolution can be
    /// called from non-async contexts.
    slots: Mutex<HashMap<String, Arc<OperationSlot>>>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation and return its slot.
    ///
    /// Creating an id that already exists is a logged no-op that returns the
    /// existing slot — callers retrying a create must not fork the waiters
    /// onto two slots.
    pub fn create(
        &self,
        id: impl Into<String>,
        meta: HashMap<String, String>,
    ) -> Arc<OperationSlot> {
        let id = id.into();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = slots.get(&id) {
            debug!("Pending: duplicate create for '{}', returning existing slot", id);
            return Arc::clone(existing);
        }
        trace!("Pending: created operation '{}'", id);
        let slot = Arc::new(OperationSlot::new(id.clone(), meta));
        slots.insert(id, Arc::clone(&slot));
        slot
    }

    /// Resolve an operation by id.
    ///
    /// Unknown ids are an error (the callback was for an operation this
    /// process never created, or one already cleaned up). Resolving an
    /// already-resolved operation is a silent no-op — a retried callback or
    /// a double-posting sandbox page must not be able to crash the host or
    /// overwrite the first value.
    pub fn resolve(&self, id: &str, outcome: OperationOutcome) -> Result<(), PendingError> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots
                .get(id)
                .cloned()
                .ok_or_else(|| PendingError::NotFound(id.to_string()))?
        };
        if slot.set(outcome) {
            debug!("Pending: resolved operation '{}'", id);
        } else {
            debug!("Pending: operation '{}' already resolved, ignoring", id);
        }
        Ok(())
    }

    /// Look up an operation's slot by id.
    pub fn get(&self, id: &str) -> Option<Arc<OperationSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Drop an operation after its owner consumed the result.
    pub fn remove(&self, id: &str) -> Option<Arc<OperationSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let removed = slots.remove(id);
        if removed.is_some() {
            trace!("Pending: removed operation '{}'", id);
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolve_then_wait() {
        let pending = PendingOperations::new();
        let slot = pending.create("op-1", HashMap::new());

        pending
            .resolve("op-1", OperationOutcome::Delivered(json!("abc")))
            .unwrap();

        match slot.wait().await {
            OperationOutcome::Delivered(value) => assert_eq!(value, json!("abc")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_suspends_until_resolved() {
        let pending = Arc::new(PendingOperations::new());
        let slot = pending.create("op-1", HashMap::new());

        let waiter = tokio::spawn(async move { slot.wait().await });

        // Give the waiter a chance to park before resolving
        tokio::time::sleep(Duration::from_millis(10)).await;
        pending
            .resolve("op-1", OperationOutcome::Delivered(json!(42)))
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter hung")
            .unwrap();
        assert!(matches!(outcome, OperationOutcome::Delivered(v) if v == json!(42)));
    }

    #[tokio::test]
    async fn test_resolve_from_foreign_thread() {
        let pending = Arc::new(PendingOperations::new());
        let slot = pending.create("op-1", HashMap::new());

        let resolver = Arc::clone(&pending);
        std::thread::spawn(move || {
            resolver
                .resolve("op-1", OperationOutcome::Failed("denied".into()))
                .unwrap();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(1), slot.wait())
            .await
            .expect("waiter hung");
        assert!(matches!(outcome, OperationOutcome::Failed(m) if m == "denied"));
    }

    #[tokio::test]
    async fn test_double_resolve_is_noop_and_keeps_first_value() {
        let pending = PendingOperations::new();
        let slot = pending.create("op-1", HashMap::new());

        pending
            .resolve("op-1", OperationOutcome::Delivered(json!("first")))
            .unwrap();
        // Second resolve must neither error nor overwrite
        pending
            .resolve("op-1", OperationOutcome::Delivered(json!("second")))
            .unwrap();

        match slot.wait().await {
            OperationOutcome::Delivered(value) => assert_eq!(value, json!("first")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unknown_id_is_not_found() {
        let pending = PendingOperations::new();
        let result = pending.resolve("ghost", OperationOutcome::Failed("x".into()));
        assert!(matches!(result, Err(PendingError::NotFound(id)) if id == "ghost"));
    }

    #[test]
    fn test_duplicate_create_returns_same_slot() {
        let pending = PendingOperations::new();
        let first = pending.create("op-1", HashMap::new());
        let second = pending.create("op-1", HashMap::new());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_meta_round_trip() {
        let pending = PendingOperations::new();
        let mut meta = HashMap::new();
        meta.insert("thread".to_string(), "t1".to_string());
        let slot = pending.create("op-1", meta);

        assert_eq!(slot.meta("thread"), Some("t1"));
        assert_eq!(slot.meta("missing"), None);
    }

    #[test]
    fn test_remove() {
        let pending = PendingOperations::new();
        pending.create("op-1", HashMap::new());
        assert!(pending.contains("op-1"));

        assert!(pending.remove("op-1").is_some());
        assert!(!pending.contains("op-1"));
        assert!(pending.remove("op-1").is_none());
    }
}
