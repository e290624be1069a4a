//! Simulation run and transcript types.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle state of a simulation run.
///
/// Runs move `pending -> running -> completed | failed`. Both `completed`
/// and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Database/API representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Parse the database/API representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    /// Returns true once the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A simulated conversation session.
#[derive(Debug, Clone)]
pub struct SimRun {
    pub id: Uuid,
    pub persona_id: Uuid,
    pub topic: String,
    pub status: RunStatus,
    /// Groups this run's messages; distinct from the run id so cloned
    /// history can share a session with freshly generated turns.
    pub session_id: Uuid,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SimRun {
    /// Create a new pending run for a persona.
    pub fn new(persona_id: Uuid, topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            persona_id,
            topic: topic.into(),
            status: RunStatus::Pending,
            session_id: Uuid::new_v4(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// One line in a run's transcript.
///
/// Role is `user` (the persona) or `assistant` (the coach). Rows are
/// append-only.
#[derive(Debug, Clone)]
pub struct SimMessage {
    pub id: Uuid,
    pub run_id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Run listing row with persona name and transcript size joined in.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub id: Uuid,
    pub persona_id: Uuid,
    pub persona_name: String,
    pub topic: String,
    pub status: RunStatus,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
