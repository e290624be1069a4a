//! Coaching reply generation.
//!
//! The coach is stateless between calls: every reply is produced from the
//! profile fields and the transcript handed in, so real chat traffic and
//! simulated runs go through the exact same path.

mod prompt;

pub use prompt::build_system_prompt;

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionProvider, CompletionRequest};
use crate::profile::CoachingProfile;
use crate::sim::Persona;

/// How many trailing transcript messages are replayed into each completion.
pub const HISTORY_WINDOW: usize = 12;

const MAX_REPLY_TOKENS: u32 = 1024;
const REPLY_TEMPERATURE: f32 = 0.7;

/// Profile fields the coach prompt is built from.
///
/// Real users and simulated personas both reduce to this view, which is
/// what keeps simulator transcripts representative of production prompts.
#[derive(Debug, Clone, Default)]
pub struct ProfileView {
    pub display_name: String,
    pub tension_type: Option<String>,
    pub communication_style: Option<String>,
    pub focus_area: Option<String>,
}

impl From<&CoachingProfile> for ProfileView {
    fn from(profile: &CoachingProfile) -> Self {
        Self {
            display_name: profile.display_name.clone(),
            tension_type: profile.tension_type.clone(),
            communication_style: profile.communication_style.clone(),
            focus_area: profile.focus_area.clone(),
        }
    }
}

impl From<&Persona> for ProfileView {
    fn from(persona: &Persona) -> Self {
        Self {
            display_name: persona.name.clone(),
            tension_type: persona.tension_type.clone(),
            communication_style: persona.communication_style.clone(),
            focus_area: persona.focus_area.clone(),
        }
    }
}

/// Generates coach replies from a profile and transcript.
pub struct Coach {
    llm: Arc<dyn CompletionProvider>,
}

impl Coach {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    /// Produce the coach's reply to the latest message in `history`.
    ///
    /// Only the last [`HISTORY_WINDOW`] messages are sent to the model;
    /// the system prompt is rebuilt from the profile every call.
    pub async fn reply(
        &self,
        profile: &ProfileView,
        topic: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let mut messages = vec![ChatMessage::system(build_system_prompt(profile, topic))];
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend_from_slice(&history[start..]);

        let request = CompletionRequest::new(messages)
            .with_max_tokens(MAX_REPLY_TOKENS)
            .with_temperature(REPLY_TEMPERATURE);

        let response = self.llm.complete(request).await?;

        let content = response.content.trim();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "Empty completion content".to_string(),
            });
        }

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionResponse, FinishReason, Role};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Test provider that records every request and returns a canned reply.
    struct CaptureProvider {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl CaptureProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for CaptureProvider {
        fn model_name(&self) -> &str {
            "capture-model"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().await.push(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn profile() -> ProfileView {
        ProfileView {
            display_name: "Olivia".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reply_trims_whitespace() {
        let provider = Arc::new(CaptureProvider::new("  Take a breath.  "));
        let coach = Coach::new(provider);

        let reply = coach
            .reply(&profile(), None, &[ChatMessage::user("I'm drowning in work")])
            .await
            .unwrap();
        assert_eq!(reply, "Take a breath.");
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let provider = Arc::new(CaptureProvider::new("   "));
        let coach = Coach::new(provider);

        let result = coach
            .reply(&profile(), None, &[ChatMessage::user("hi")])
            .await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn history_is_windowed() {
        let provider = Arc::new(CaptureProvider::new("ok"));
        let coach = Coach::new(provider.clone());

        let history: Vec<ChatMessage> = (0..30)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("message {i}"))
                } else {
                    ChatMessage::assistant(format!("message {i}"))
                }
            })
            .collect();

        coach.reply(&profile(), None, &history).await.unwrap();

        let requests = provider.requests.lock().await;
        let sent = &requests[0].messages;
        // One system message plus the window tail.
        assert_eq!(sent.len(), 1 + HISTORY_WINDOW);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent.last().unwrap().content, "message 29");
    }

    #[tokio::test]
    async fn topic_reaches_system_prompt() {
        let provider = Arc::new(CaptureProvider::new("ok"));
        let coach = Coach::new(provider.clone());

        coach
            .reply(&profile(), Some("boundaries"), &[ChatMessage::user("hey")])
            .await
            .unwrap();

        let requests = provider.requests.lock().await;
        assert!(requests[0].messages[0].content.contains("boundaries"));
    }
}
