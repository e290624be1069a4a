//! Turn engine for simulated runs.
//!
//! A turn is one persona utterance followed by one coach reply. Each side
//! is persisted as soon as it is received, so a failure mid-turn leaves
//! the transcript consistent up to the last persisted message. There are
//! no retries here; errors propagate to the caller and the run stays
//! where it was.

use std::sync::Arc;

use crate::coach::{Coach, ProfileView};
use crate::db::{Database, RunStore};
use crate::error::Error;
use crate::llm::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::sim::{Persona, SimMessage, SimRun};

const MAX_PERSONA_TOKENS: u32 = 256;
const PERSONA_TEMPERATURE: f32 = 0.9;

/// Stand-in user message when the transcript is still empty. Providers
/// reject empty message lists, and the persona needs something to react
/// to. Never persisted.
const OPENING_NUDGE: &str =
    "(The session has just started. Open the conversation with what's on your mind.)";

/// Both halves of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub persona_message: SimMessage,
    pub coach_message: SimMessage,
}

/// Drives one turn of a run: persona speaks, coach answers.
pub struct TurnOrchestrator {
    db: Arc<dyn Database>,
    coach: Coach,
    llm: Arc<dyn CompletionProvider>,
}

impl TurnOrchestrator {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            db,
            coach: Coach::new(llm.clone()),
            llm,
        }
    }

    /// Execute one turn against the run's transcript.
    ///
    /// With `manual_message` set, that text is used verbatim as the
    /// persona's utterance and no persona completion is requested.
    pub async fn take_turn(
        &self,
        run: &SimRun,
        persona: &Persona,
        manual_message: Option<String>,
    ) -> Result<TurnOutcome, Error> {
        let transcript = self.db.list_run_messages(run.id).await?;

        let utterance = match manual_message {
            Some(text) => text,
            None => self.persona_utterance(run, persona, &transcript).await?,
        };

        let persona_message = self
            .db
            .add_run_message(run.id, run.session_id, "user", &utterance)
            .await?;

        let mut history = as_chat_history(&transcript);
        history.push(ChatMessage::user(&persona_message.content));

        let profile = ProfileView::from(persona);
        let reply = self
            .coach
            .reply(&profile, Some(&run.topic), &history)
            .await?;

        let coach_message = self
            .db
            .add_run_message(run.id, run.session_id, "assistant", &reply)
            .await?;

        tracing::debug!(
            run_id = %run.id,
            persona = %persona.name,
            turn_messages = transcript.len() + 2,
            "Turn completed"
        );

        Ok(TurnOutcome {
            persona_message,
            coach_message,
        })
    }

    /// Generate the persona's next utterance.
    ///
    /// The transcript is recast from the persona's perspective: its own
    /// earlier lines become assistant messages, the coach's become user
    /// messages it responds to.
    async fn persona_utterance(
        &self,
        run: &SimRun,
        persona: &Persona,
        transcript: &[SimMessage],
    ) -> Result<String, Error> {
        let mut messages = vec![ChatMessage::system(persona.system_prompt(&run.topic))];
        if transcript.is_empty() {
            messages.push(ChatMessage::user(OPENING_NUDGE));
        } else {
            messages.extend(swap_roles(transcript));
        }

        let request = CompletionRequest::new(messages)
            .with_max_tokens(MAX_PERSONA_TOKENS)
            .with_temperature(PERSONA_TEMPERATURE);

        let response = self.llm.complete(request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Transcript in run perspective: persona lines are user, coach lines
/// are assistant.
fn as_chat_history(transcript: &[SimMessage]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .map(|m| {
            if m.role == "assistant" {
                ChatMessage::assistant(&m.content)
            } else {
                ChatMessage::user(&m.content)
            }
        })
        .collect()
}

/// Transcript in persona perspective, roles swapped.
fn swap_roles(transcript: &[SimMessage]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .map(|m| {
            if m.role == "assistant" {
                ChatMessage::user(&m.content)
            } else {
                ChatMessage::assistant(&m.content)
            }
        })
        .collect()
}
