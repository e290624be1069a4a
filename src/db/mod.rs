//! Storage abstraction for the compass service.
//!
//! Handlers and services talk to the [`Database`] trait, never to a
//! concrete backend. [`PgBackend`] is the production implementation;
//! [`MemBackend`] backs tests and local development without Postgres.

pub mod memory;
pub mod postgres;
mod store;

pub use memory::MemBackend;
pub use postgres::PgBackend;
pub use store::Store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::profile::{ChatMessageRecord, CoachingProfile};
use crate::sim::{Evaluation, Persona, RunStatus, RunSummary, SimMessage, SimRun, Verdict};

/// User profile storage.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<CoachingProfile>, DatabaseError>;

    /// Insert or update a profile keyed by user id.
    async fn upsert_profile(&self, profile: &CoachingProfile) -> Result<(), DatabaseError>;
}

/// Per-user chat history. Rows are append-only.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn add_chat_message(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
    ) -> Result<ChatMessageRecord, DatabaseError>;

    /// Full history in insertion order.
    async fn list_chat_messages(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError>;

    /// Last `limit` messages, still in insertion order.
    async fn recent_chat_messages(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError>;
}

/// Simulator persona storage.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Insert a persona. Returns false (and changes nothing) when a
    /// persona with the same name already exists.
    async fn create_persona(&self, persona: &Persona) -> Result<bool, DatabaseError>;

    async fn get_persona(&self, id: Uuid) -> Result<Option<Persona>, DatabaseError>;

    async fn get_persona_by_name(&self, name: &str) -> Result<Option<Persona>, DatabaseError>;

    async fn list_personas(&self) -> Result<Vec<Persona>, DatabaseError>;
}

/// Simulation run and transcript storage.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert_run(&self, run: &SimRun) -> Result<(), DatabaseError>;

    async fn get_run(&self, id: Uuid) -> Result<Option<SimRun>, DatabaseError>;

    /// All runs, newest first, with persona name and message count joined.
    async fn list_runs(&self) -> Result<Vec<RunSummary>, DatabaseError>;

    /// Update run status. `error_message` and `completed_at` only
    /// overwrite when `Some`; passing `None` keeps the stored value.
    async fn update_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    async fn add_run_message(
        &self,
        run_id: Uuid,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<SimMessage, DatabaseError>;

    /// Full transcript in insertion order.
    async fn list_run_messages(&self, run_id: Uuid) -> Result<Vec<SimMessage>, DatabaseError>;
}

/// Evaluation verdict storage. One row per run.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Write the verdict for a run, replacing any previous one.
    async fn upsert_evaluation(
        &self,
        run_id: Uuid,
        verdict: &Verdict,
    ) -> Result<Evaluation, DatabaseError>;

    async fn get_evaluation(&self, run_id: Uuid) -> Result<Option<Evaluation>, DatabaseError>;
}

/// Unified database surface.
///
/// Backends implement each store trait plus migrations; everything else
/// takes `Arc<dyn Database>` and stays backend-agnostic.
#[async_trait]
pub trait Database:
    ProfileStore + ChatStore + PersonaStore + RunStore + EvaluationStore + Send + Sync
{
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}
