//! In-memory session store
//!
//! Ephemeral session storage for tests, development, and short-lived runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use orcha_kernel::error::EngineResult;
use orcha_kernel::session::{Session, SessionStore};

/// Thread-safe in-memory [`SessionStore`].
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop all stored sessions.
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> EngineResult<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, session: &Session) -> EngineResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> EngineResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> EngineResult<Vec<String>> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions
            .keys()
            .filter(|id| prefix.is_none_or(|p| id.starts_with(p)))
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcha_kernel::session::SessionEvent;

    #[tokio::test]
    async fn save_get_roundtrip() {
        let store = InMemorySessionStore::new();
        let mut session = Session::new();
        session.add_event(SessionEvent::user_message("hello"));
        store.save(&session).await.unwrap();

        let loaded = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.events.len(), 1);

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_and_list() {
        let store = InMemorySessionStore::new();
        let a = Session::new();
        let b = Session::new();
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();
        assert_eq!(store.session_count().await, 2);

        store.delete(&a.id).await.unwrap();
        let ids = store.list(None).await.unwrap();
        assert_eq!(ids, vec![b.id.clone()]);

        let none = store.list(Some("no-such-prefix-")).await.unwrap();
        assert!(none.is_empty());
    }
}
