//! PostgreSQL backend for the Database trait.
//!
//! Delegates to [`Store`], which owns the pool and the SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::db::{
    ChatStore, Database, EvaluationStore, PersonaStore, ProfileStore, RunStore, Store,
};
use crate::error::DatabaseError;
use crate::profile::{ChatMessageRecord, CoachingProfile};
use crate::sim::{Evaluation, Persona, RunStatus, RunSummary, SimMessage, SimRun, Verdict};

/// PostgreSQL database backend.
pub struct PgBackend {
    store: Store,
}

impl PgBackend {
    /// Create a new PostgreSQL backend from configuration.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let store = Store::new(config).await?;
        Ok(Self { store })
    }
}

// ==================== Database (supertrait) ====================

#[async_trait]
impl Database for PgBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.store.run_migrations().await
    }
}

// ==================== ProfileStore ====================

#[async_trait]
impl ProfileStore for PgBackend {
    async fn get_profile(&self, user_id: &str) -> Result<Option<CoachingProfile>, DatabaseError> {
        self.store.get_profile(user_id).await
    }

    async fn upsert_profile(&self, profile: &CoachingProfile) -> Result<(), DatabaseError> {
        self.store.upsert_profile(profile).await
    }
}

// ==================== ChatStore ====================

#[async_trait]
impl ChatStore for PgBackend {
    async fn add_chat_message(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
    ) -> Result<ChatMessageRecord, DatabaseError> {
        self.store.add_chat_message(user_id, role, content).await
    }

    async fn list_chat_messages(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError> {
        self.store.list_chat_messages(user_id).await
    }

    async fn recent_chat_messages(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError> {
        self.store.recent_chat_messages(user_id, limit).await
    }
}

// ==================== PersonaStore ====================

#[async_trait]
impl PersonaStore for PgBackend {
    async fn create_persona(&self, persona: &Persona) -> Result<bool, DatabaseError> {
        self.store.create_persona(persona).await
    }

    async fn get_persona(&self, id: Uuid) -> Result<Option<Persona>, DatabaseError> {
        self.store.get_persona(id).await
    }

    async fn get_persona_by_name(&self, name: &str) -> Result<Option<Persona>, DatabaseError> {
        self.store.get_persona_by_name(name).await
    }

    async fn list_personas(&self) -> Result<Vec<Persona>, DatabaseError> {
        self.store.list_personas().await
    }
}

// ==================== RunStore ====================

#[async_trait]
impl RunStore for PgBackend {
    async fn insert_run(&self, run: &SimRun) -> Result<(), DatabaseError> {
        self.store.insert_run(run).await
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<SimRun>, DatabaseError> {
        self.store.get_run(id).await
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, DatabaseError> {
        self.store.list_runs().await
    }

    async fn update_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        self.store
            .update_run_status(id, status, error_message, completed_at)
            .await
    }

    async fn add_run_message(
        &self,
        run_id: Uuid,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<SimMessage, DatabaseError> {
        self.store
            .add_run_message(run_id, session_id, role, content)
            .await
    }

    async fn list_run_messages(&self, run_id: Uuid) -> Result<Vec<SimMessage>, DatabaseError> {
        self.store.list_run_messages(run_id).await
    }
}

// ==================== EvaluationStore ====================

#[async_trait]
impl EvaluationStore for PgBackend {
    async fn upsert_evaluation(
        &self,
        run_id: Uuid,
        verdict: &Verdict,
    ) -> Result<Evaluation, DatabaseError> {
        self.store.upsert_evaluation(run_id, verdict).await
    }

    async fn get_evaluation(&self, run_id: Uuid) -> Result<Option<Evaluation>, DatabaseError> {
        self.store.get_evaluation(run_id).await
    }
}
