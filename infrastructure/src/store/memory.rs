//! In-memory session store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use toolgate_application::{SessionStore, StoreError};
use toolgate_domain::{SessionKey, SessionRecord};

/// Process-local session store.
///
/// The whole map sits behind one `RwLock`, which makes every per-key
/// read-modify-write atomic at the backend boundary — the only concurrency
/// guarantee the orchestrator relies on.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.read().await.get(&key.storage_key()).cloned())
    }

    async fn put(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.key.storage_key(), record);
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool, StoreError> {
        Ok(self
            .records
            .write()
            .await
            .remove(&key.storage_key())
            .is_some())
    }

    async fn list_thread(&self, thread: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let prefix = SessionKey::thread_prefix(thread);
        let records = self.records.read().await;
        let mut matching: Vec<SessionRecord> = records
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, record)| record.clone())
            .collect();
        matching.sort_by(|a, b| a.key.storage_key().cmp(&b.key.storage_key()));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(provider: &str, thread: &str) -> SessionRecord {
        SessionRecord::pending(
            SessionKey::new(provider, thread, "default"),
            ["scope:a"],
            "op-1",
            false,
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemorySessionStore::new();
        let key = SessionKey::new("slack", "t1", "default");

        assert!(store.get(&key).await.unwrap().is_none());
        store.put(record("slack", "t1")).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_some());

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_record() {
        let store = MemorySessionStore::new();
        let key = SessionKey::new("slack", "t1", "default");

        store.put(record("slack", "t1")).await.unwrap();
        let mut updated = record("slack", "t1");
        updated.reopen(["scope:b"], "op-2");
        store.put(updated).await.unwrap();

        let fetched = store.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched.pending_operation.as_deref(), Some("op-2"));
    }

    #[tokio::test]
    async fn test_list_thread_is_a_prefix_scan() {
        let store = MemorySessionStore::new();
        store.put(record("slack", "t1")).await.unwrap();
        store.put(record("github", "t1")).await.unwrap();
        store.put(record("slack", "t2")).await.unwrap();

        let t1 = store.list_thread("t1").await.unwrap();
        assert_eq!(t1.len(), 2);
        assert!(t1.iter().all(|r| r.key.thread == "t1"));

        assert!(store.list_thread("t3").await.unwrap().is_empty());
    }
}
