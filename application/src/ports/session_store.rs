//! Session Store port
//!
//! Durable records of grant flows, keyed by (provider, thread, profile).
//! Backends range from an in-process map to an external cache; the
//! orchestrator only sees this interface, so swapping backends requires no
//! orchestrator changes.
//!
//! Concurrency contract: `put` replaces the whole record for its key
//! atomically at the backend boundary. Read-modify-write sequences in the
//! orchestrator rely on that single-key atomicity, not on cross-key
//! transactions.

use async_trait::async_trait;
use thiserror::Error;
use toolgate_domain::{SessionKey, SessionRecord};

/// Errors surfaced by session store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session store backend error: {0}")]
    Backend(String),

    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Port for session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the record for a triple, if any.
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace the record for its key.
    async fn put(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Delete the record for a triple. Returns whether one existed.
    async fn delete(&self, key: &SessionKey) -> Result<bool, StoreError>;

    /// All records whose thread matches (storage-key prefix scan).
    async fn list_thread(&self, thread: &str) -> Result<Vec<SessionRecord>, StoreError>;
}
