//! File-backed session store
//!
//! One JSON document holds every record, keyed by storage key. Each call
//! loads, modifies, and rewrites the document under a `Mutex`, so per-key
//! read-modify-write stays atomic within the process. Stand-in for an
//! external cache backend: same port, durable across restarts.
//!
//! Sessions are stored as the backend receives them — encryption at rest is
//! explicitly not this layer's contract; deployments choose the backend
//! accordingly.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use toolgate_application::{SessionStore, StoreError};
use toolgate_domain::{SessionKey, SessionRecord};
use tracing::debug;

/// JSON-document session store.
pub struct FileSessionStore {
    path: PathBuf,
    /// Serializes every load-modify-store cycle
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Create a store backed by `path`, creating parent directories.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, SessionRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &HashMap<String, SessionRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(&key.storage_key()))
    }

    async fn put(&self, record: SessionRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        records.insert(record.key.storage_key(), record);
        self.save(&records).await?;
        debug!("FileSessionStore: wrote {} record(s)", records.len());
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let removed = records.remove(&key.storage_key()).is_some();
        if removed {
            self.save(&records).await?;
        }
        Ok(removed)
    }

    async fn list_thread(&self, thread: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let prefix = SessionKey::thread_prefix(thread);
        let mut matching: Vec<SessionRecord> = self
            .load()
            .await?
            .into_iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, record)| record)
            .collect();
        matching.sort_by(|a, b| a.key.storage_key().cmp(&b.key.storage_key()));
        Ok(matching)
    }
}
