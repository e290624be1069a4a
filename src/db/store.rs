//! PostgreSQL store for persisting coaching and simulator data.

use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::profile::{ChatMessageRecord, CoachingProfile};
use crate::sim::{Evaluation, Persona, RunStatus, RunSummary, SimMessage, SimRun, Verdict};

/// Database store for the service.
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Create a new store and connect to the database.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Run database migrations (embedded via refinery).
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        use refinery::embed_migrations;
        embed_migrations!("migrations");

        let mut client = self.pool.get().await?;
        migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get a connection from the pool.
    pub async fn conn(&self) -> Result<deadpool_postgres::Object, DatabaseError> {
        Ok(self.pool.get().await?)
    }

    // ==================== Profiles ====================

    /// Fetch a profile by user id.
    pub async fn get_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<CoachingProfile>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT user_id, display_name, tension_type, communication_style,
                       focus_area, created_at, updated_at
                FROM profiles WHERE user_id = $1
                "#,
                &[&user_id],
            )
            .await?;

        Ok(row.map(|r| profile_from_row(&r)))
    }

    /// Insert or update a profile.
    pub async fn upsert_profile(&self, profile: &CoachingProfile) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO profiles (
                user_id, display_name, tension_type, communication_style,
                focus_area, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                tension_type = EXCLUDED.tension_type,
                communication_style = EXCLUDED.communication_style,
                focus_area = EXCLUDED.focus_area,
                updated_at = EXCLUDED.updated_at
            "#,
            &[
                &profile.user_id,
                &profile.display_name,
                &profile.tension_type,
                &profile.communication_style,
                &profile.focus_area,
                &profile.created_at,
                &profile.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    // ==================== Chat messages ====================

    /// Append a message to a user's chat history.
    pub async fn add_chat_message(
        &self,
        user_id: &str,
        role: &str,
        content: &str,
    ) -> Result<ChatMessageRecord, DatabaseError> {
        let conn = self.conn().await?;
        let record = ChatMessageRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        conn.execute(
            r#"
            INSERT INTO chat_messages (id, user_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
            &[
                &record.id,
                &record.user_id,
                &record.role,
                &record.content,
                &record.created_at,
            ],
        )
        .await?;

        Ok(record)
    }

    /// Full chat history for a user, oldest first.
    pub async fn list_chat_messages(
        &self,
        user_id: &str,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT id, user_id, role, content, created_at
                FROM chat_messages WHERE user_id = $1
                ORDER BY seq ASC
                "#,
                &[&user_id],
            )
            .await?;

        Ok(rows.iter().map(chat_message_from_row).collect())
    }

    /// Last `limit` chat messages for a user, oldest first.
    pub async fn recent_chat_messages(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessageRecord>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT id, user_id, role, content, created_at FROM (
                    SELECT id, user_id, role, content, created_at, seq
                    FROM chat_messages WHERE user_id = $1
                    ORDER BY seq DESC LIMIT $2
                ) tail ORDER BY seq ASC
                "#,
                &[&user_id, &limit],
            )
            .await?;

        Ok(rows.iter().map(chat_message_from_row).collect())
    }

    // ==================== Personas ====================

    /// Insert a persona unless one with the same name exists.
    ///
    /// Returns false when the name was already taken (nothing written).
    pub async fn create_persona(&self, persona: &Persona) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;
        let inserted = conn
            .execute(
                r#"
                INSERT INTO sim_personas (
                    id, name, prompt, tension_type, communication_style,
                    focus_area, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (name) DO NOTHING
                "#,
                &[
                    &persona.id,
                    &persona.name,
                    &persona.prompt,
                    &persona.tension_type,
                    &persona.communication_style,
                    &persona.focus_area,
                    &persona.created_at,
                ],
            )
            .await?;

        Ok(inserted > 0)
    }

    /// Get a persona by ID.
    pub async fn get_persona(&self, id: Uuid) -> Result<Option<Persona>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT id, name, prompt, tension_type, communication_style,
                       focus_area, created_at
                FROM sim_personas WHERE id = $1
                "#,
                &[&id],
            )
            .await?;

        Ok(row.map(|r| persona_from_row(&r)))
    }

    /// Get a persona by display name.
    pub async fn get_persona_by_name(&self, name: &str) -> Result<Option<Persona>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT id, name, prompt, tension_type, communication_style,
                       focus_area, created_at
                FROM sim_personas WHERE name = $1
                "#,
                &[&name],
            )
            .await?;

        Ok(row.map(|r| persona_from_row(&r)))
    }

    /// List all personas, alphabetical by name.
    pub async fn list_personas(&self) -> Result<Vec<Persona>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT id, name, prompt, tension_type, communication_style,
                       focus_area, created_at
                FROM sim_personas ORDER BY name ASC
                "#,
                &[],
            )
            .await?;

        Ok(rows.iter().map(|r| persona_from_row(r)).collect())
    }

    // ==================== Runs ====================

    /// Insert a new run.
    pub async fn insert_run(&self, run: &SimRun) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO sim_runs (
                id, persona_id, topic, status, session_id, error_message,
                created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
            &[
                &run.id,
                &run.persona_id,
                &run.topic,
                &run.status.as_str(),
                &run.session_id,
                &run.error_message,
                &run.created_at,
                &run.completed_at,
            ],
        )
        .await?;
        Ok(())
    }

    /// Get a run by ID.
    pub async fn get_run(&self, id: Uuid) -> Result<Option<SimRun>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT id, persona_id, topic, status, session_id, error_message,
                       created_at, completed_at
                FROM sim_runs WHERE id = $1
                "#,
                &[&id],
            )
            .await?;

        row.map(|r| run_from_row(&r)).transpose()
    }

    /// List all runs, newest first, with persona name and message count.
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT r.id, r.persona_id, p.name AS persona_name, r.topic,
                       r.status, r.created_at, r.completed_at,
                       (SELECT COUNT(*) FROM sim_messages m WHERE m.run_id = r.id)
                           AS message_count
                FROM sim_runs r
                JOIN sim_personas p ON p.id = r.persona_id
                ORDER BY r.created_at DESC
                "#,
                &[],
            )
            .await?;

        rows.iter()
            .map(|r| {
                Ok(RunSummary {
                    id: r.get("id"),
                    persona_id: r.get("persona_id"),
                    persona_name: r.get("persona_name"),
                    topic: r.get("topic"),
                    status: parse_status(r.get("status"))?,
                    message_count: r.get("message_count"),
                    created_at: r.get("created_at"),
                    completed_at: r.get("completed_at"),
                })
            })
            .collect()
    }

    /// Update run status and optional error message / completion time.
    ///
    /// `None` keeps the stored value rather than clearing it.
    pub async fn update_run_status(
        &self,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            UPDATE sim_runs SET
                status = $2,
                error_message = COALESCE($3, error_message),
                completed_at = COALESCE($4, completed_at)
            WHERE id = $1
            "#,
            &[&id, &status.as_str(), &error_message, &completed_at],
        )
        .await?;
        Ok(())
    }

    /// Append a message to a run's transcript.
    pub async fn add_run_message(
        &self,
        run_id: Uuid,
        session_id: Uuid,
        role: &str,
        content: &str,
    ) -> Result<SimMessage, DatabaseError> {
        let conn = self.conn().await?;
        let message = SimMessage {
            id: Uuid::new_v4(),
            run_id,
            session_id,
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        conn.execute(
            r#"
            INSERT INTO sim_messages (id, run_id, session_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            &[
                &message.id,
                &message.run_id,
                &message.session_id,
                &message.role,
                &message.content,
                &message.created_at,
            ],
        )
        .await?;

        Ok(message)
    }

    /// Full transcript for a run, oldest first.
    pub async fn list_run_messages(&self, run_id: Uuid) -> Result<Vec<SimMessage>, DatabaseError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT id, run_id, session_id, role, content, created_at
                FROM sim_messages WHERE run_id = $1
                ORDER BY seq ASC
                "#,
                &[&run_id],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| SimMessage {
                id: r.get("id"),
                run_id: r.get("run_id"),
                session_id: r.get("session_id"),
                role: r.get("role"),
                content: r.get("content"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    // ==================== Evaluations ====================

    /// Write the verdict for a run, replacing any previous one.
    pub async fn upsert_evaluation(
        &self,
        run_id: Uuid,
        verdict: &Verdict,
    ) -> Result<Evaluation, DatabaseError> {
        let conn = self.conn().await?;
        let evaluation = Evaluation {
            run_id,
            card_worthy: verdict.card_worthy,
            category: verdict.category.clone(),
            reason: verdict.reason.clone(),
            evaluated_at: Utc::now(),
        };

        conn.execute(
            r#"
            INSERT INTO sim_evaluations (run_id, card_worthy, category, reason, evaluated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (run_id) DO UPDATE SET
                card_worthy = EXCLUDED.card_worthy,
                category = EXCLUDED.category,
                reason = EXCLUDED.reason,
                evaluated_at = EXCLUDED.evaluated_at
            "#,
            &[
                &evaluation.run_id,
                &evaluation.card_worthy,
                &evaluation.category,
                &evaluation.reason,
                &evaluation.evaluated_at,
            ],
        )
        .await?;

        Ok(evaluation)
    }

    /// Get the stored verdict for a run, if any.
    pub async fn get_evaluation(&self, run_id: Uuid) -> Result<Option<Evaluation>, DatabaseError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT run_id, card_worthy, category, reason, evaluated_at
                FROM sim_evaluations WHERE run_id = $1
                "#,
                &[&run_id],
            )
            .await?;

        Ok(row.map(|r| Evaluation {
            run_id: r.get("run_id"),
            card_worthy: r.get("card_worthy"),
            category: r.get("category"),
            reason: r.get("reason"),
            evaluated_at: r.get("evaluated_at"),
        }))
    }
}

// ==================== Row mapping ====================

fn profile_from_row(r: &Row) -> CoachingProfile {
    CoachingProfile {
        user_id: r.get("user_id"),
        display_name: r.get("display_name"),
        tension_type: r.get("tension_type"),
        communication_style: r.get("communication_style"),
        focus_area: r.get("focus_area"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn chat_message_from_row(r: &Row) -> ChatMessageRecord {
    ChatMessageRecord {
        id: r.get("id"),
        user_id: r.get("user_id"),
        role: r.get("role"),
        content: r.get("content"),
        created_at: r.get("created_at"),
    }
}

fn persona_from_row(r: &Row) -> Persona {
    Persona {
        id: r.get("id"),
        name: r.get("name"),
        prompt: r.get("prompt"),
        tension_type: r.get("tension_type"),
        communication_style: r.get("communication_style"),
        focus_area: r.get("focus_area"),
        created_at: r.get("created_at"),
    }
}

fn run_from_row(r: &Row) -> Result<SimRun, DatabaseError> {
    Ok(SimRun {
        id: r.get("id"),
        persona_id: r.get("persona_id"),
        topic: r.get("topic"),
        status: parse_status(r.get("status"))?,
        session_id: r.get("session_id"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    })
}

fn parse_status(s: &str) -> Result<RunStatus, DatabaseError> {
    RunStatus::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown run status '{s}'")))
}
