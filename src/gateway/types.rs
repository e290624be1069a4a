//! Wire types for the gateway API.
//!
//! Timestamps are RFC 3339 strings; record types carry `From` impls from
//! the domain structs so handlers stay thin.

use serde::Serialize;
use uuid::Uuid;

use crate::sim::{Evaluation, Persona, QuickCheck, RunSummary, SimMessage, SimRun};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ChatSendResponse {
    pub reply: String,
    pub user_message_id: Uuid,
    pub assistant_message_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PersonaInfo {
    pub id: Uuid,
    pub name: String,
    pub prompt: String,
    pub tension_type: Option<String>,
    pub communication_style: Option<String>,
    pub focus_area: Option<String>,
    pub created_at: String,
}

impl From<&Persona> for PersonaInfo {
    fn from(p: &Persona) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            prompt: p.prompt.clone(),
            tension_type: p.tension_type.clone(),
            communication_style: p.communication_style.clone(),
            focus_area: p.focus_area.clone(),
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PersonaListResponse {
    pub personas: Vec<PersonaInfo>,
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub created: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct CloneUserResponse {
    pub persona: PersonaInfo,
    pub run: Option<RunInfo>,
    pub copied_messages: usize,
}

#[derive(Debug, Serialize)]
pub struct RunInfo {
    pub id: Uuid,
    pub persona_id: Uuid,
    pub topic: String,
    pub status: String,
    pub session_id: Uuid,
    pub error_message: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<&SimRun> for RunInfo {
    fn from(r: &SimRun) -> Self {
        Self {
            id: r.id,
            persona_id: r.persona_id,
            topic: r.topic.clone(),
            status: r.status.as_str().to_string(),
            session_id: r.session_id,
            error_message: r.error_message.clone(),
            created_at: r.created_at.to_rfc3339(),
            completed_at: r.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummaryInfo {
    pub id: Uuid,
    pub persona_id: Uuid,
    pub persona_name: String,
    pub topic: String,
    pub status: String,
    pub message_count: i64,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<&RunSummary> for RunSummaryInfo {
    fn from(s: &RunSummary) -> Self {
        Self {
            id: s.id,
            persona_id: s.persona_id,
            persona_name: s.persona_name.clone(),
            topic: s.topic.clone(),
            status: s.status.as_str().to_string(),
            message_count: s.message_count,
            created_at: s.created_at.to_rfc3339(),
            completed_at: s.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunSummaryInfo>,
}

#[derive(Debug, Serialize)]
pub struct MessageInfo {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl From<&SimMessage> for MessageInfo {
    fn from(m: &SimMessage) -> Self {
        Self {
            id: m.id,
            role: m.role.clone(),
            content: m.content.clone(),
            created_at: m.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EvaluationInfo {
    pub run_id: Uuid,
    pub card_worthy: bool,
    pub category: String,
    pub reason: String,
    pub evaluated_at: String,
}

impl From<&Evaluation> for EvaluationInfo {
    fn from(e: &Evaluation) -> Self {
        Self {
            run_id: e.run_id,
            card_worthy: e.card_worthy,
            category: e.category.clone(),
            reason: e.reason.clone(),
            evaluated_at: e.evaluated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    pub run: RunInfo,
    pub messages: Vec<MessageInfo>,
    pub evaluation: Option<EvaluationInfo>,
}

#[derive(Debug, Serialize)]
pub struct QuickCheckInfo {
    pub candidate: bool,
    pub reason: String,
}

impl From<&QuickCheck> for QuickCheckInfo {
    fn from(c: &QuickCheck) -> Self {
        Self {
            candidate: c.candidate,
            reason: c.reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub persona_message: MessageInfo,
    pub coach_message: MessageInfo,
    pub quick_check: QuickCheckInfo,
}

#[derive(Debug, Serialize)]
pub struct EndRunResponse {
    pub run: RunInfo,
    pub evaluation: EvaluationInfo,
}
