//! Transcript evaluation for card-worthiness.
//!
//! Two tiers: a free heuristic check that filters out transcripts that
//! obviously cannot contain a card moment, and a full completion-based
//! judgment run when a run ends (or on demand). The verdict is one row
//! per run; re-evaluating overwrites it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{Database, EvaluationStore, RunStore};
use crate::error::{Error, LlmError};
use crate::llm::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::sim::{SimMessage, SimRun};

/// Transcripts shorter than this can't have built up to an insight.
const MIN_MESSAGES: usize = 4;
/// At least one coach reply must carry this much substance.
const MIN_COACH_REPLY_CHARS: usize = 80;

const MAX_VERDICT_TOKENS: u32 = 512;
const VERDICT_TEMPERATURE: f32 = 0.2;

/// Instructions for the full evaluation completion.
const EVALUATION_PROMPT: &str = r#"You are reviewing the transcript of a coaching conversation
between a user and their coach. Decide whether the conversation produced a
"card-worthy" moment: an insight specific enough to the user's situation that
it would be worth surfacing back to them later as a standalone card.

A card-worthy moment names a concrete pattern, reframe, boundary, or
commitment. Generic encouragement, small talk, or unresolved venting is not
card-worthy.

Respond with only a JSON object, no other text:
{"card_worthy": true|false, "category": "<pattern|reframe|boundary|commitment|none>", "reason": "<one sentence>"}"#;

/// Structured judgment about a run's transcript.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub card_worthy: bool,
    pub category: String,
    pub reason: String,
}

/// A stored verdict, one per run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub run_id: Uuid,
    pub card_worthy: bool,
    pub category: String,
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Result of the cheap heuristic check.
#[derive(Debug, Clone)]
pub struct QuickCheck {
    pub candidate: bool,
    pub reason: String,
}

/// Runs evaluations and persists verdicts.
pub struct Evaluator {
    db: Arc<dyn Database>,
    llm: Arc<dyn CompletionProvider>,
}

impl Evaluator {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn CompletionProvider>) -> Self {
        Self { db, llm }
    }

    /// Cheap transcript check. No completion request is made.
    pub fn quick_check(messages: &[SimMessage]) -> QuickCheck {
        if messages.len() < MIN_MESSAGES {
            return QuickCheck {
                candidate: false,
                reason: format!(
                    "transcript has {} messages, below the {} needed",
                    messages.len(),
                    MIN_MESSAGES
                ),
            };
        }

        let has_substantive_reply = messages
            .iter()
            .filter(|m| m.role == "assistant")
            .any(|m| m.content.chars().count() >= MIN_COACH_REPLY_CHARS);

        if !has_substantive_reply {
            return QuickCheck {
                candidate: false,
                reason: format!(
                    "no coach reply reaches {} characters",
                    MIN_COACH_REPLY_CHARS
                ),
            };
        }

        QuickCheck {
            candidate: true,
            reason: "transcript is long enough and has substantive coach replies".to_string(),
        }
    }

    /// Full evaluation of a run's transcript.
    ///
    /// Non-candidates (per [`Self::quick_check`]) get a negative verdict
    /// without a completion request. On completion or parse failure the
    /// error propagates and no verdict is written.
    pub async fn evaluate_run(&self, run: &SimRun) -> Result<Evaluation, Error> {
        let messages = self.db.list_run_messages(run.id).await?;

        let check = Self::quick_check(&messages);
        if !check.candidate {
            tracing::debug!(run_id = %run.id, reason = %check.reason, "Skipping full evaluation");
            let verdict = Verdict {
                card_worthy: false,
                category: "none".to_string(),
                reason: check.reason,
            };
            return Ok(self.db.upsert_evaluation(run.id, &verdict).await?);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(EVALUATION_PROMPT),
            ChatMessage::user(render_transcript(&messages)),
        ])
        .with_max_tokens(MAX_VERDICT_TOKENS)
        .with_temperature(VERDICT_TEMPERATURE);

        let response = self.llm.complete(request).await?;

        let verdict =
            parse_verdict(&response.content).ok_or_else(|| LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: format!(
                    "Unparseable verdict: {}",
                    response.content.chars().take(200).collect::<String>()
                ),
            })?;

        tracing::info!(
            run_id = %run.id,
            card_worthy = verdict.card_worthy,
            category = %verdict.category,
            "Run evaluated"
        );

        Ok(self.db.upsert_evaluation(run.id, &verdict).await?)
    }
}

/// Render a transcript for the evaluation prompt.
fn render_transcript(messages: &[SimMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = if m.role == "assistant" { "Coach" } else { "User" };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    card_worthy: bool,
    category: Option<String>,
    reason: Option<String>,
}

impl From<RawVerdict> for Verdict {
    fn from(raw: RawVerdict) -> Self {
        Verdict {
            card_worthy: raw.card_worthy,
            category: raw.category.unwrap_or_else(|| "none".to_string()),
            reason: raw.reason.unwrap_or_default(),
        }
    }
}

/// Parse a verdict out of model output.
///
/// Models wrap JSON in markdown fences or prose despite instructions, so
/// after a direct parse this strips ``` fences, then falls back to the
/// outermost brace pair.
fn parse_verdict(content: &str) -> Option<Verdict> {
    let trimmed = content.trim();

    if let Ok(raw) = serde_json::from_str::<RawVerdict>(trimmed) {
        return Some(raw.into());
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced
        && let Ok(raw) = serde_json::from_str::<RawVerdict>(inner)
    {
        return Some(raw.into());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<RawVerdict>(&trimmed[start..=end])
        .ok()
        .map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemBackend;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, FinishReason};
    use crate::sim::SimRun;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    fn message(role: &str, content: &str) -> SimMessage {
        SimMessage {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn long_reply() -> String {
        "You keep describing this as a time problem, but every example you gave \
         was about permission."
            .to_string()
    }

    // --- quick_check ---

    #[test]
    fn quick_check_rejects_short_transcripts() {
        let messages = vec![
            message("user", "hi"),
            message("assistant", &long_reply()),
        ];

        let check = Evaluator::quick_check(&messages);
        assert!(!check.candidate);
        assert!(check.reason.contains("2 messages"));
    }

    #[test]
    fn quick_check_rejects_thin_coach_replies() {
        let messages = vec![
            message("user", "hi"),
            message("assistant", "ok"),
            message("user", "I'm stressed"),
            message("assistant", "Tell me more."),
        ];

        let check = Evaluator::quick_check(&messages);
        assert!(!check.candidate);
        assert!(check.reason.contains("characters"));
    }

    #[test]
    fn quick_check_accepts_substantive_transcripts() {
        let messages = vec![
            message("user", "hi"),
            message("assistant", "Tell me more."),
            message("user", "I keep saying yes to everything"),
            message("assistant", &long_reply()),
        ];

        assert!(Evaluator::quick_check(&messages).candidate);
    }

    // --- parse_verdict ---

    #[test]
    fn parse_verdict_plain_json() {
        let verdict = parse_verdict(
            r#"{"card_worthy": true, "category": "boundary", "reason": "named the pattern"}"#,
        )
        .unwrap();
        assert!(verdict.card_worthy);
        assert_eq!(verdict.category, "boundary");
        assert_eq!(verdict.reason, "named the pattern");
    }

    #[test]
    fn parse_verdict_strips_fences() {
        let content = "```json\n{\"card_worthy\": false, \"category\": \"none\", \"reason\": \"small talk\"}\n```";
        let verdict = parse_verdict(content).unwrap();
        assert!(!verdict.card_worthy);
        assert_eq!(verdict.category, "none");
    }

    #[test]
    fn parse_verdict_falls_back_to_braces() {
        let content = "Here is my judgment: {\"card_worthy\": true, \"category\": \"reframe\", \"reason\": \"shifted view\"} Hope that helps!";
        let verdict = parse_verdict(content).unwrap();
        assert!(verdict.card_worthy);
        assert_eq!(verdict.category, "reframe");
    }

    #[test]
    fn parse_verdict_defaults_missing_fields() {
        let verdict = parse_verdict(r#"{"card_worthy": false}"#).unwrap();
        assert_eq!(verdict.category, "none");
        assert_eq!(verdict.reason, "");
    }

    #[test]
    fn parse_verdict_rejects_garbage() {
        assert!(parse_verdict("the conversation was nice").is_none());
        assert!(parse_verdict("").is_none());
    }

    // --- evaluate_run ---

    /// Provider scripted with at most one response; panics on extra calls.
    struct ScriptedProvider {
        response: Mutex<Option<Result<CompletionResponse, LlmError>>>,
    }

    impl ScriptedProvider {
        fn replies(content: &str) -> Self {
            Self {
                response: Mutex::new(Some(Ok(CompletionResponse {
                    content: content.to_string(),
                    input_tokens: 10,
                    output_tokens: 5,
                    finish_reason: FinishReason::Stop,
                }))),
            }
        }

        fn never_called() -> Self {
            Self {
                response: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted-model"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.response
                .lock()
                .await
                .take()
                .expect("unexpected completion request")
        }
    }

    async fn seeded_run(db: &MemBackend, messages: usize) -> SimRun {
        use crate::db::RunStore;

        let run = SimRun::new(Uuid::new_v4(), "boundaries");
        db.insert_run(&run).await.unwrap();
        for i in 0..messages {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            let content = if role == "assistant" {
                long_reply()
            } else {
                format!("message {i}")
            };
            db.add_run_message(run.id, run.session_id, role, &content)
                .await
                .unwrap();
        }
        run
    }

    #[tokio::test]
    async fn non_candidates_skip_the_completion() {
        use crate::db::EvaluationStore;

        let db = Arc::new(MemBackend::new());
        let run = seeded_run(&db, 2).await;
        let evaluator = Evaluator::new(db.clone(), Arc::new(ScriptedProvider::never_called()));

        let evaluation = evaluator.evaluate_run(&run).await.unwrap();
        assert!(!evaluation.card_worthy);
        assert_eq!(evaluation.category, "none");

        // Verdict is persisted even for the short-circuit path.
        assert!(db.get_evaluation(run.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn candidates_get_a_full_verdict() {
        let db = Arc::new(MemBackend::new());
        let run = seeded_run(&db, 4).await;
        let provider = Arc::new(ScriptedProvider::replies(
            r#"{"card_worthy": true, "category": "boundary", "reason": "named the yes pattern"}"#,
        ));
        let evaluator = Evaluator::new(db.clone(), provider);

        let evaluation = evaluator.evaluate_run(&run).await.unwrap();
        assert!(evaluation.card_worthy);
        assert_eq!(evaluation.category, "boundary");
    }

    #[tokio::test]
    async fn parse_failure_stores_nothing() {
        use crate::db::EvaluationStore;

        let db = Arc::new(MemBackend::new());
        let run = seeded_run(&db, 4).await;
        let provider = Arc::new(ScriptedProvider::replies("I liked it"));
        let evaluator = Evaluator::new(db.clone(), provider);

        let result = evaluator.evaluate_run(&run).await;
        assert!(result.is_err());
        assert!(db.get_evaluation(run.id).await.unwrap().is_none());
    }
}
