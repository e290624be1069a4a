//! Persona simulator.
//!
//! Runs are scripted coaching sessions: a persona plays the user, the
//! coach answers, and the transcript is judged for card-worthy moments
//! when the run ends. The [`Simulator`] owns the run lifecycle
//! (pending, running, completed, failed) and serializes mutations per
//! run.

mod evaluator;
mod locks;
mod orchestrator;
mod persona;
mod run;

pub use evaluator::{Evaluation, Evaluator, QuickCheck, Verdict};
pub use locks::RunLocks;
pub use orchestrator::{TurnOrchestrator, TurnOutcome};
pub use persona::{Persona, presets};
pub use run::{RunStatus, RunSummary, SimMessage, SimRun};

use std::sync::Arc;

use chrono::Utc;

use crate::db::{ChatStore, Database, PersonaStore, ProfileStore, RunStore};
use crate::error::{DatabaseError, Result, RunError};
use crate::llm::CompletionProvider;
use crate::profile::CoachingProfile;

/// Error message recorded when an operator stops a run.
const STOPPED_MESSAGE: &str = "Manually stopped";

/// Fallback topic for cloned runs when the profile has no focus area.
const DEFAULT_CLONE_TOPIC: &str = "general";

/// Result of seeding the persona presets.
#[derive(Debug, Clone, Copy)]
pub struct SeedOutcome {
    pub created: usize,
    pub skipped: usize,
}

/// Result of cloning a user into the simulator.
#[derive(Debug, Clone)]
pub struct CloneOutcome {
    pub persona: Persona,
    pub run: Option<SimRun>,
    pub copied_messages: usize,
}

/// Service facade over the run lifecycle.
///
/// Every mutation of an existing run happens under that run's lock, so
/// concurrent calls against the same run serialize instead of racing
/// the status checks.
pub struct Simulator {
    db: Arc<dyn Database>,
    orchestrator: TurnOrchestrator,
    evaluator: Evaluator,
    locks: RunLocks,
}

impl Simulator {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            orchestrator: TurnOrchestrator::new(db.clone(), llm.clone()),
            evaluator: Evaluator::new(db.clone(), llm),
            locks: RunLocks::new(),
            db,
        }
    }

    /// Create a new pending run for a persona.
    pub async fn create_run(&self, persona_id: uuid::Uuid, topic: &str) -> Result<SimRun> {
        self.require_persona(persona_id).await?;

        let run = SimRun::new(persona_id, topic);
        self.db.insert_run(&run).await?;
        tracing::info!(run_id = %run.id, persona_id = %persona_id, topic, "Run created");
        Ok(run)
    }

    /// Move a pending run to running.
    pub async fn start_run(&self, run_id: uuid::Uuid) -> Result<SimRun> {
        let _guard = self.locks.acquire(run_id).await;

        let mut run = self.require_run(run_id).await?;
        if run.status != RunStatus::Pending {
            return Err(invalid_transition(&run, "start"));
        }

        self.db
            .update_run_status(run.id, RunStatus::Running, None, None)
            .await?;
        run.status = RunStatus::Running;
        tracing::info!(run_id = %run.id, "Run started");
        Ok(run)
    }

    /// Take one turn on a running run.
    ///
    /// `manual_message` substitutes the persona's utterance. A failed
    /// turn leaves the run running; the caller decides whether to try
    /// again, end, or stop.
    pub async fn advance_run(
        &self,
        run_id: uuid::Uuid,
        manual_message: Option<String>,
    ) -> Result<TurnOutcome> {
        let _guard = self.locks.acquire(run_id).await;

        let run = self.require_run(run_id).await?;
        if run.status != RunStatus::Running {
            return Err(invalid_transition(&run, "take a turn"));
        }

        let persona = self.require_persona(run.persona_id).await?;
        self.orchestrator.take_turn(&run, &persona, manual_message).await
    }

    /// End a running run: evaluate the transcript, then mark completed.
    ///
    /// Evaluation comes first so a run is only ever completed with its
    /// verdict stored. If evaluation fails the run stays running and the
    /// error propagates.
    pub async fn end_run(&self, run_id: uuid::Uuid) -> Result<(SimRun, Evaluation)> {
        let _guard = self.locks.acquire(run_id).await;

        let mut run = self.require_run(run_id).await?;
        if run.status != RunStatus::Running {
            return Err(invalid_transition(&run, "end"));
        }

        let evaluation = self.evaluator.evaluate_run(&run).await?;

        let completed_at = Utc::now();
        self.db
            .update_run_status(run.id, RunStatus::Completed, None, Some(completed_at))
            .await?;
        run.status = RunStatus::Completed;
        run.completed_at = Some(completed_at);

        tracing::info!(
            run_id = %run.id,
            card_worthy = evaluation.card_worthy,
            "Run ended"
        );
        Ok((run, evaluation))
    }

    /// Abort a pending or running run. Never evaluates.
    pub async fn stop_run(&self, run_id: uuid::Uuid) -> Result<SimRun> {
        let _guard = self.locks.acquire(run_id).await;

        let mut run = self.require_run(run_id).await?;
        if run.status != RunStatus::Running && run.status != RunStatus::Pending {
            return Err(invalid_transition(&run, "stop"));
        }

        let completed_at = Utc::now();
        self.db
            .update_run_status(
                run.id,
                RunStatus::Failed,
                Some(STOPPED_MESSAGE),
                Some(completed_at),
            )
            .await?;
        run.status = RunStatus::Failed;
        run.error_message = Some(STOPPED_MESSAGE.to_string());
        run.completed_at = Some(completed_at);

        tracing::info!(run_id = %run.id, "Run stopped");
        Ok(run)
    }

    /// Evaluate a run's transcript regardless of its state.
    ///
    /// Re-evaluation overwrites the stored verdict.
    pub async fn evaluate_run(&self, run_id: uuid::Uuid) -> Result<Evaluation> {
        let _guard = self.locks.acquire(run_id).await;

        let run = self.require_run(run_id).await?;
        self.evaluator.evaluate_run(&run).await
    }

    /// Insert the persona presets, skipping names that already exist.
    pub async fn seed_personas(&self) -> Result<SeedOutcome> {
        seed_presets(self.db.as_ref()).await
    }

    /// Build a persona from a user's coaching profile, and with
    /// `include_history` also start a run seeded with their chat history.
    ///
    /// Cloning the same user again reuses the existing clone persona
    /// instead of creating a duplicate.
    pub async fn clone_user(&self, user_id: &str, include_history: bool) -> Result<CloneOutcome> {
        let profile = self.db.get_profile(user_id).await?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: user_id.to_string(),
            }
        })?;

        let name = format!("{} (clone)", profile.display_name);
        let persona = match self.db.get_persona_by_name(&name).await? {
            Some(existing) => existing,
            None => {
                let candidate = clone_persona(&profile, &name);
                if self.db.create_persona(&candidate).await? {
                    candidate
                } else {
                    // Lost a name race; use whoever won it.
                    self.db.get_persona_by_name(&name).await?.ok_or_else(|| {
                        DatabaseError::NotFound {
                            entity: "persona".to_string(),
                            id: name.clone(),
                        }
                    })?
                }
            }
        };

        if !include_history {
            tracing::info!(user_id, persona = %persona.name, "User cloned, persona only");
            return Ok(CloneOutcome {
                persona,
                run: None,
                copied_messages: 0,
            });
        }

        let topic = profile
            .focus_area
            .clone()
            .unwrap_or_else(|| DEFAULT_CLONE_TOPIC.to_string());
        let mut run = SimRun::new(persona.id, &topic);
        self.db.insert_run(&run).await?;
        self.db
            .update_run_status(run.id, RunStatus::Running, None, None)
            .await?;
        run.status = RunStatus::Running;

        let history = self.db.list_chat_messages(user_id).await?;
        let copied_messages = history.len();
        for message in &history {
            self.db
                .add_run_message(run.id, run.session_id, &message.role, &message.content)
                .await?;
        }

        tracing::info!(
            user_id,
            run_id = %run.id,
            persona = %persona.name,
            copied_messages,
            "User cloned into run"
        );
        Ok(CloneOutcome {
            persona,
            run: Some(run),
            copied_messages,
        })
    }

    async fn require_run(&self, run_id: uuid::Uuid) -> Result<SimRun> {
        Ok(self
            .db
            .get_run(run_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "run".to_string(),
                id: run_id.to_string(),
            })?)
    }

    async fn require_persona(&self, persona_id: uuid::Uuid) -> Result<Persona> {
        Ok(self
            .db
            .get_persona(persona_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "persona".to_string(),
                id: persona_id.to_string(),
            })?)
    }
}

/// Insert the persona presets, skipping names that already exist.
///
/// A free function so CLI maintenance can seed without building the
/// full simulator (which needs a completion provider).
pub async fn seed_presets(db: &dyn Database) -> Result<SeedOutcome> {
    let mut created = 0;
    let mut skipped = 0;
    for persona in presets() {
        if db.create_persona(&persona).await? {
            created += 1;
        } else {
            skipped += 1;
        }
    }
    tracing::info!(created, skipped, "Persona presets seeded");
    Ok(SeedOutcome { created, skipped })
}

fn invalid_transition(run: &SimRun, action: &str) -> crate::error::Error {
    RunError::InvalidTransition {
        id: run.id,
        status: run.status.as_str().to_string(),
        action: action.to_string(),
    }
    .into()
}

/// Role-play prompt for a persona cloned from a real profile.
fn clone_persona(profile: &CoachingProfile, name: &str) -> Persona {
    let mut prompt = format!(
        "You are a simulated version of {}, rebuilt from their coaching profile.",
        profile.display_name
    );
    if let Some(tension) = &profile.tension_type {
        prompt.push_str(&format!(" The tension you keep running into is {tension}."));
    }
    if let Some(style) = &profile.communication_style {
        prompt.push_str(&format!(" You communicate in a {style} way."));
    }
    if let Some(focus) = &profile.focus_area {
        prompt.push_str(&format!(" Lately you are preoccupied with {focus}."));
    }

    let mut persona = Persona::new(name, prompt);
    persona.tension_type = profile.tension_type.clone();
    persona.communication_style = profile.communication_style.clone();
    persona.focus_area = profile.focus_area.clone();
    persona
}
