//! Completion provider integration.
//!
//! Supports two backends:
//! - **Anthropic** (default): Direct Messages API access with your own key
//! - **OpenAI-compatible**: Any endpoint that speaks the OpenAI Chat
//!   Completions API (OpenAI, OpenRouter, local gateways)

mod anthropic;
mod openai_compatible;
mod provider;

pub use anthropic::AnthropicProvider;
pub use openai_compatible::OpenAiCompatibleProvider;
pub use provider::{
    ChatMessage, CompletionProvider, CompletionRequest, CompletionResponse, FinishReason, Role,
};

use std::sync::Arc;

use crate::config::{LlmBackend, LlmConfig};
use crate::error::LlmError;

/// Create a completion provider based on configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAiCompatible => create_openai_compatible_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, LlmError> {
    let anthropic = config
        .anthropic
        .as_ref()
        .ok_or_else(|| LlmError::AuthFailed {
            provider: "anthropic".to_string(),
        })?;

    tracing::info!("Using Anthropic Messages API (model: {})", anthropic.model);
    Ok(Arc::new(AnthropicProvider::new(anthropic.clone())))
}

fn create_openai_compatible_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn CompletionProvider>, LlmError> {
    let compat = config
        .openai_compatible
        .as_ref()
        .ok_or_else(|| LlmError::AuthFailed {
            provider: "openai_compatible".to_string(),
        })?;

    tracing::info!(
        "Using OpenAI-compatible endpoint {} (model: {})",
        compat.base_url,
        compat.model
    );
    Ok(Arc::new(OpenAiCompatibleProvider::new(compat.clone())?))
}
