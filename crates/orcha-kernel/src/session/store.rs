//! Session store trait
//!
//! The pluggable key → session map. All operations are async; providers
//! (in-memory, file-backed) live in `orcha-foundation`. The store handle is
//! always passed explicitly; there is no process-wide default.

use async_trait::async_trait;
use std::sync::Arc;

use super::Session;
use crate::error::{EngineError, EngineResult};

/// Pluggable session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session by id. `Ok(None)` when the id is unknown.
    async fn get(&self, id: &str) -> EngineResult<Option<Session>>;

    /// Persist a session, replacing any previous value.
    async fn save(&self, session: &Session) -> EngineResult<()>;

    /// Remove a session. Unknown ids are not an error.
    async fn delete(&self, id: &str) -> EngineResult<()>;

    /// List stored session ids, optionally restricted to a prefix.
    async fn list(&self, prefix: Option<&str>) -> EngineResult<Vec<String>>;
}

/// Shared store handle.
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Create a child session under `parent_id`, keeping the hierarchy
/// bidirectionally consistent: the parent's `child_ids` gains the new id and
/// both sessions are saved before the child is returned.
pub async fn spawn_child(store: &dyn SessionStore, parent_id: &str) -> EngineResult<Session> {
    let mut parent = store
        .get(parent_id)
        .await?
        .ok_or_else(|| EngineError::SessionNotFound(parent_id.to_string()))?;

    let child = Session::with_parent(parent_id);
    parent.add_child(child.id.clone());

    store.save(&parent).await?;
    store.save(&child).await?;
    Ok(child)
}

/// Fetch ancestor sessions, nearest first. Stops at the first unresolvable
/// parent id rather than erroring, since a pruned ancestor is not fatal.
pub async fn ancestors(store: &dyn SessionStore, session: &Session) -> EngineResult<Vec<Session>> {
    let mut result = Vec::new();
    let mut current = session.parent_id.clone();
    while let Some(id) = current {
        match store.get(&id).await? {
            Some(parent) => {
                current = parent.parent_id.clone();
                result.push(parent);
            }
            None => break,
        }
    }
    Ok(result)
}

/// Fetch all descendant sessions in depth-first order.
pub async fn descendants(store: &dyn SessionStore, session: &Session) -> EngineResult<Vec<Session>> {
    let mut result = Vec::new();
    let mut stack: Vec<String> = session.child_ids.clone();
    while let Some(id) = stack.pop() {
        if let Some(child) = store.get(&id).await? {
            stack.extend(child.child_ids.iter().cloned());
            result.push(child);
        }
    }
    Ok(result)
}
