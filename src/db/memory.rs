//! In-memory backend for tests and local development.
//!
//! Mirrors the PostgreSQL backend's observable behavior: insertion order
//! stands in for the `seq` column, name uniqueness is enforced on
//! personas, and partial status updates keep stored values the same way
//! the SQL `COALESCE` does.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{ChatStore, Database, EvaluationStore, PersonaStore, ProfileStore, RunStore};
use crate::error::DatabaseError;
use crate::profile::{ChatMessageRecord, CoachingProfile};
use crate::sim::{Evaluation, Persona, RunStatus, RunSummary, SimMessage, SimRun, Verdict};

#[derive(Default)]
struct MemState {
    profiles: HashMap<String, CoachingProfile>,
    chat_messages: Vec<ChatMessageRecord>,
    personas: Vec<Persona>,
    runs: HashMap<Uuid, SimRun>,
    run_messages: Vec<SimMessage>,
    evaluations: HashMap<Uuid, Evaluation>,
}

/// In-memory database backend.
#[derive(Default)]
pub struct MemBackend {
    state: RwLock<MemState>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        // Schema lives in the structs; nothing to migrate.
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemBackend {
    async fn get_profile(&self, user_id: &str) -> Result<Option<CoachingProfile>, DatabaseError> {
        Ok(self.state.read().await.profiles.get(user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &CoachingProfile) -> Result<(), DatabaseError> {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemBackend {
    async fn add_chat_message(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
    ) -> Result<ChatMessageRecord, DatabaseError> {
        let record = ChatMessageRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.state.write().await.chat_messages.push(record.clone());
        Ok(record)
    }

    async fn list_chat_messages(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .chat_messages
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn recent_chat_messages(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError> {
        let messages = self.list_chat_messages(user_id).await?;
        let start = messages.len().saturating_sub(limit.max(0) as usize);
        Ok(messages[start..].to_vec())
    }
}

#[async_trait]
impl PersonaStore for MemBackend {
    async fn create_persona(&self, persona: &Persona) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        if state.personas.iter().any(|p| p.name == persona.name) {
            return Ok(false);
        }
        state.personas.push(persona.clone());
        Ok(true)
    }

    async fn get_persona(&self, id: Uuid) -> Result<Option<Persona>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .personas
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn get_persona_by_name(&self, name: &str) -> Result<Option<Persona>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .personas
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_personas(&self) -> Result<Vec<Persona>, DatabaseError> {
        let mut personas = self.state.read().await.personas.clone();
        personas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(personas)
    }
}

#[async_trait]
impl RunStore for MemBackend {
    async fn insert_run(&self, run: &SimRun) -> Result<(), DatabaseError> {
        self.state.write().await.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<SimRun>, DatabaseError> {
        Ok(self.state.read().await.runs.get(&id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, DatabaseError> {
        let state = self.state.read().await;
        let mut summaries: Vec<RunSummary> = state
            .runs
            .values()
            .filter_map(|run| {
                // Inner join: runs without a persona row are not listed.
                let persona = state.personas.iter().find(|p| p.id == run.persona_id)?;
                let message_count = state
                    .run_messages
                    .iter()
                    .filter(|m| m.run_id == run.id)
                    .count() as i64;
                Some(RunSummary {
                    id: run.id,
                    persona_id: run.persona_id,
                    persona_name: persona.name.clone(),
                    topic: run.topic.clone(),
                    status: run.status,
                    message_count,
                    created_at: run.created_at,
                    completed_at: run.completed_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn update_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if let Some(run) = state.runs.get_mut(&id) {
            run.status = status;
            if let Some(message) = error_message {
                run.error_message = Some(message.to_string());
            }
            if let Some(at) = completed_at {
                run.completed_at = Some(at);
            }
        }
        Ok(())
    }

    async fn add_run_message(
        &self,
        run_id: Uuid,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<SimMessage, DatabaseError> {
        let message = SimMessage {
            id: Uuid::new_v4(),
            run_id,
            session_id,
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.state.write().await.run_messages.push(message.clone());
        Ok(message)
    }

    async fn list_run_messages(&self, run_id: Uuid) -> Result<Vec<SimMessage>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .run_messages
            .iter()
            .filter(|m| m.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EvaluationStore for MemBackend {
    async fn upsert_evaluation(
        &self,
        run_id: Uuid,
        verdict: &Verdict,
    ) -> Result<Evaluation, DatabaseError> {
        let evaluation = Evaluation {
            run_id,
            card_worthy: verdict.card_worthy,
            category: verdict.category.clone(),
            reason: verdict.reason.clone(),
            evaluated_at: Utc::now(),
        };
        self.state
            .write()
            .await
            .evaluations
            .insert(run_id, evaluation.clone());
        Ok(evaluation)
    }

    async fn get_evaluation(&self, run_id: Uuid) -> Result<Option<Evaluation>, DatabaseError> {
        Ok(self.state.read().await.evaluations.get(&run_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn duplicate_persona_name_is_rejected() {
        let db = MemBackend::new();
        let first = Persona::new("Olivia", "prompt one");
        let second = Persona::new("Olivia", "prompt two");

        assert!(db.create_persona(&first).await.unwrap());
        assert!(!db.create_persona(&second).await.unwrap());

        let stored = db.get_persona_by_name("Olivia").await.unwrap().unwrap();
        assert_eq!(stored.prompt, "prompt one");
    }

    #[tokio::test]
    async fn recent_chat_messages_returns_tail_in_order() {
        let db = MemBackend::new();
        for i in 0..5 {
            db.add_chat_message("u1", "user", &format!("m{i}"))
                .await
                .unwrap();
        }

        let recent = db.recent_chat_messages("u1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[1].content, "m4");
    }

    #[tokio::test]
    async fn status_update_keeps_fields_when_none() {
        let db = MemBackend::new();
        let run = SimRun::new(Uuid::new_v4(), "topic");
        db.insert_run(&run).await.unwrap();

        db.update_run_status(run.id, RunStatus::Failed, Some("Manually stopped"), None)
            .await
            .unwrap();
        db.update_run_status(run.id, RunStatus::Failed, None, Some(Utc::now()))
            .await
            .unwrap();

        let stored = db.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some("Manually stopped"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn evaluation_upsert_replaces() {
        let db = MemBackend::new();
        let run_id = Uuid::new_v4();

        let first = Verdict {
            card_worthy: false,
            category: "none".to_string(),
            reason: "too short".to_string(),
        };
        let second = Verdict {
            card_worthy: true,
            category: "boundary".to_string(),
            reason: "clear insight".to_string(),
        };

        db.upsert_evaluation(run_id, &first).await.unwrap();
        db.upsert_evaluation(run_id, &second).await.unwrap();

        let stored = db.get_evaluation(run_id).await.unwrap().unwrap();
        assert!(stored.card_worthy);
        assert_eq!(stored.category, "boundary");
    }
}
