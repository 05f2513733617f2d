//! Session runs
//!
//! A run is the lifecycle wrapper for one unit of work inside a session.
//! Runs move `pending → running → (completed | failed | cancelled)` and
//! freeze once terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Status of a session run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Returns `true` if the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A single execution, or "run", within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRun {
    /// Unique run id.
    pub id: String,

    /// When the run started (set again on `mark_running`).
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Current status.
    pub status: RunStatus,

    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Default for SessionRun {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRun {
    /// Create a new run in `pending` state.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Pending,
            metadata: Map::new(),
        }
    }

    /// Transition to `running`. No-op once terminal.
    pub fn mark_running(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Running;
        self.started_at = Utc::now();
    }

    /// Transition to `completed`. No-op once terminal.
    pub fn mark_completed(&mut self) {
        self.finish(RunStatus::Completed);
    }

    /// Transition to `failed`, recording the reason. No-op once terminal.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.metadata
                .insert("error".into(), Value::String(reason.into()));
        }
        self.finish(RunStatus::Failed);
    }

    /// Transition to `cancelled`. No-op once terminal.
    pub fn mark_cancelled(&mut self) {
        self.finish(RunStatus::Cancelled);
    }

    fn finish(&mut self, status: RunStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// Wall-clock duration, once the run has ended.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let mut run = SessionRun::new();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.ended_at.is_none());

        run.mark_running();
        assert_eq!(run.status, RunStatus::Running);

        run.mark_completed();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.ended_at.is_some());
        assert!(run.duration().is_some());
    }

    #[test]
    fn terminal_states_freeze() {
        let mut run = SessionRun::new();
        run.mark_running();
        run.mark_failed("boom");
        let ended = run.ended_at;

        run.mark_completed();
        run.mark_cancelled();
        run.mark_running();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.ended_at, ended);
        assert_eq!(
            run.metadata.get("error").and_then(|v| v.as_str()),
            Some("boom")
        );
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
