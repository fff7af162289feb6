//! In-memory session storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use ctera_mcp_core::{BackendSessionId, SessionKey, SessionRecord, SessionStore, StorageError};

/// In-memory storage implementation.
///
/// A single lock guards the whole map; it is never held across an await.
/// Data is lost on restart.
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionKey, SessionRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert(&self, key: SessionKey, record: SessionRecord) -> Result<(), StorageError> {
        self.sessions
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(key, record);
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn remove(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self
            .sessions
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(key))
    }

    async fn remove_if(
        &self,
        key: &SessionKey,
        session_id: &BackendSessionId,
    ) -> Result<bool, StorageError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let current = sessions
            .get(key)
            .is_some_and(|record| &record.backend_session_id == session_id);
        if current {
            sessions.remove(key);
        }
        Ok(current)
    }

    async fn snapshot(&self) -> Result<Vec<(SessionKey, SessionRecord)>, StorageError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        Ok(sessions
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctera_mcp_core::ClientType;

    fn record(username: &str, token: &str) -> SessionRecord {
        SessionRecord {
            host: "h1".to_string(),
            username: username.to_string(),
            client_type: ClientType::Admin,
            tls_verify: false,
            backend_session_id: BackendSessionId::new(token),
            created_at: 1,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = MemoryStore::new();
        let key = SessionKey::derive("h1", ClientType::Admin, "alice");

        store.upsert(key.clone(), record("alice", "first")).await.unwrap();
        store.upsert(key.clone(), record("alice", "second")).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.backend_session_id.expose(), "second");
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        let key = SessionKey::derive("h1", ClientType::Admin, "alice");
        store.upsert(key.clone(), record("alice", "t")).await.unwrap();

        assert!(store.remove(&key).await.unwrap().is_some());
        assert!(store.remove(&key).await.unwrap().is_none());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_if_matches_session_id() {
        let store = MemoryStore::new();
        let key = SessionKey::derive("h1", ClientType::Admin, "alice");
        store.upsert(key.clone(), record("alice", "newer")).await.unwrap();

        let older = BackendSessionId::new("older");
        assert!(!store.remove_if(&key, &older).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 1);

        let newer = BackendSessionId::new("newer");
        assert!(store.remove_if(&key, &newer).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.remove_if(&key, &newer).await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let store = MemoryStore::new();
        let alice = SessionKey::derive("h1", ClientType::Admin, "alice");
        let bob = SessionKey::derive("h1", ClientType::Admin, "bob");
        store.upsert(alice.clone(), record("alice", "a")).await.unwrap();
        store.upsert(bob, record("bob", "b")).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        store.remove(&alice).await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.len().await.unwrap(), 1);
    }
}
