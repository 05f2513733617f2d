//! Sessions
//!
//! A session is the root container of one conversational interaction: an
//! ordered event log, a list of runs, an opaque state map, and id-only links
//! to its parent and children. Hierarchy is resolved on demand through the
//! store; sessions never hold live back-references.

mod event;
mod metadata;
mod run;
mod store;

pub use event::{EventSource, EventType, SessionEvent, TokenUsage, estimate_tokens};
pub use metadata::SessionMetadata;
pub use run::{RunStatus, SessionRun};
pub use store::{SessionStore, SharedSessionStore, ancestors, descendants, spawn_child};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A standalone conversation session with hierarchical support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session id.
    pub id: String,

    /// Creation metadata.
    #[serde(default)]
    pub metadata: SessionMetadata,

    /// Parent session id, if this session was spawned from another.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Ids of child sessions spawned from this one.
    #[serde(default)]
    pub child_ids: Vec<String>,

    /// Ids of external tasks associated with this session.
    #[serde(default)]
    pub task_ids: Vec<String>,

    /// Runs executed within this session, in creation order.
    #[serde(default)]
    pub runs: Vec<SessionRun>,

    /// Append-only event log.
    #[serde(default)]
    pub events: Vec<SessionEvent>,

    /// Opaque state map.
    #[serde(default)]
    pub state: Map<String, Value>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an empty session with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metadata: SessionMetadata::default(),
            parent_id: None,
            child_ids: Vec::new(),
            task_ids: Vec::new(),
            runs: Vec::new(),
            events: Vec::new(),
            state: Map::new(),
        }
    }

    /// Create an empty session referencing a parent id.
    ///
    /// This does **not** update the parent's `child_ids`; use
    /// [`spawn_child`] when a store is available so the hierarchy stays
    /// bidirectionally consistent.
    pub fn with_parent(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::new()
        }
    }

    /// Timestamp of the most recent event, or session creation when empty.
    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.events
            .iter()
            .map(|e| e.timestamp)
            .max()
            .unwrap_or(self.metadata.created_at)
    }

    /// The currently running [`SessionRun`], if any.
    pub fn active_run(&self) -> Option<&SessionRun> {
        self.runs
            .iter()
            .rev()
            .find(|run| run.status == RunStatus::Running)
    }

    /// Append an event. Events are never reordered or mutated afterwards.
    pub fn add_event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    /// Register a child session id.
    pub fn add_child(&mut self, child_id: impl Into<String>) {
        let child_id = child_id.into();
        if !self.child_ids.contains(&child_id) {
            self.child_ids.push(child_id);
        }
    }

    /// Unregister a child session id.
    pub fn remove_child(&mut self, child_id: &str) {
        self.child_ids.retain(|id| id != child_id);
    }

    /// Iterate events of a given type, oldest first.
    pub fn events_by_type(&self, kind: EventType) -> impl Iterator<Item = &SessionEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Most recent event of a given type.
    pub fn last_event_of(&self, kind: EventType) -> Option<&SessionEvent> {
        self.events.iter().rev().find(|e| e.kind == kind)
    }

    /// Look up an event by id.
    pub fn event(&self, id: &str) -> Option<&SessionEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Direct children of an event within the in-session tree.
    pub fn child_events(&self, parent_event_id: &str) -> Vec<&SessionEvent> {
        self.events
            .iter()
            .filter(|e| e.parent_event_id() == Some(parent_event_id))
            .collect()
    }

    /// Aggregate token usage across all events.
    pub fn total_token_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for event in &self.events {
            if let Some(usage) = &event.token_usage {
                total.add(usage);
            }
        }
        total
    }
}
