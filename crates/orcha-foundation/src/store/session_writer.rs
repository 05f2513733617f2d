//! Serialized session writer
//!
//! Concurrent appenders to the same session (parallel steps in a batch, the
//! executor's run bookkeeping) must not lose each other's writes. The writer
//! owns a per-session mutex and funnels every load-modify-save cycle through
//! it, so the session acts as a mutex for its own event list.

use std::sync::Arc;

use tokio::sync::Mutex;

use orcha_kernel::error::{EngineError, EngineResult};
use orcha_kernel::session::{Session, SessionEvent, SessionStore};

/// Serialized write access to one session.
pub struct SessionWriter {
    store: Arc<dyn SessionStore>,
    session_id: String,
    lock: Mutex<()>,
}

impl SessionWriter {
    /// Create a writer for `session_id`.
    pub fn new(store: Arc<dyn SessionStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            lock: Mutex::new(()),
        }
    }

    /// The session id this writer is bound to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Append one event and persist. Returns the event id.
    pub async fn append_event(&self, event: SessionEvent) -> EngineResult<String> {
        let event_id = event.id.clone();
        self.mutate(move |session| session.add_event(event)).await?;
        Ok(event_id)
    }

    /// Run a closure against the loaded session and persist the result.
    pub async fn mutate<F, T>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut Session) -> T,
    {
        let _guard = self.lock.lock().await;
        let mut session = self
            .store
            .get(&self.session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(self.session_id.clone()))?;
        let out = f(&mut session);
        self.store.save(&session).await?;
        Ok(out)
    }

    /// Load a read-only snapshot of the session.
    pub async fn snapshot(&self) -> EngineResult<Session> {
        self.store
            .get(&self.session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(self.session_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let store = InMemorySessionStore::shared();
        let session = Session::new();
        store.save(&session).await.unwrap();

        let writer = Arc::new(SessionWriter::new(
            store.clone() as Arc<dyn SessionStore>,
            session.id.clone(),
        ));

        let mut handles = Vec::new();
        for i in 0..16 {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                writer
                    .append_event(SessionEvent::user_message(format!("msg {i}")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let loaded = writer.snapshot().await.unwrap();
        assert_eq!(loaded.events.len(), 16);

        // Ids unique, timestamps non-decreasing.
        let mut ids: Vec<&str> = loaded.events.iter().map(|e| e.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        for pair in loaded.events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn unknown_session_errors() {
        let store = InMemorySessionStore::shared();
        let writer = SessionWriter::new(store as Arc<dyn SessionStore>, "missing");
        let err = writer
            .append_event(SessionEvent::user_message("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }
}
