//! Configuration for the compass service.

use std::net::SocketAddr;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Main configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            server: ServerConfig::from_env()?,
        })
    }

    /// Load only the database section.
    ///
    /// Maintenance commands (migrate, seeding) never talk to a provider,
    /// so they must not fail on missing provider credentials.
    pub fn database_from_env() -> Result<DatabaseConfig, ConfigError> {
        let _ = dotenvy::dotenv();
        DatabaseConfig::from_env()
    }
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = optional_env("DATABASE_URL")?.ok_or_else(|| ConfigError::MissingRequired {
            key: "DATABASE_URL".to_string(),
            hint: "Set DATABASE_URL to a PostgreSQL connection string".to_string(),
        })?;

        let pool_size = parse_optional_env("DATABASE_POOL_SIZE", 10usize)?;

        Ok(Self {
            url: SecretString::from(url),
            pool_size,
        })
    }

    /// Get the database URL (exposes the secret).
    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

/// Which completion backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmBackend {
    #[default]
    Anthropic,
    OpenAiCompatible,
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" | "openai_compatible" | "openai-compatible" | "openrouter" => {
                Ok(Self::OpenAiCompatible)
            }
            _ => Err(format!(
                "invalid backend '{s}', expected 'anthropic' or 'openai_compatible'"
            )),
        }
    }
}

/// Anthropic Messages API configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    /// Model to use (e.g., "claude-sonnet-4-20250514").
    pub model: String,
}

/// OpenAI-compatible chat/completions configuration.
///
/// Works for OpenAI, OpenRouter, and local gateways that speak the same API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Optional: local gateways often accept any key.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
}

/// Completion provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub anthropic: Option<AnthropicConfig>,
    pub openai_compatible: Option<OpenAiCompatConfig>,
}

impl LlmConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend = match optional_env("LLM_BACKEND")? {
            Some(s) => s.parse().map_err(|e| ConfigError::InvalidValue {
                key: "LLM_BACKEND".to_string(),
                message: e,
            })?,
            None => LlmBackend::default(),
        };

        let anthropic = optional_env("ANTHROPIC_API_KEY")?.map(|key| AnthropicConfig {
            api_key: SecretString::from(key),
            model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
        });

        let openai_key = optional_env("OPENAI_API_KEY")?;
        let openai_base = optional_env("OPENAI_BASE_URL")?;
        let openai_compatible = if openai_key.is_some() || openai_base.is_some() {
            Some(OpenAiCompatConfig {
                api_key: openai_key.map(SecretString::from),
                base_url: openai_base.unwrap_or_else(|| "https://api.openai.com".to_string()),
                model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            })
        } else {
            None
        };

        // Fail early if the selected backend has no credentials.
        match backend {
            LlmBackend::Anthropic if anthropic.is_none() => {
                return Err(ConfigError::MissingRequired {
                    key: "ANTHROPIC_API_KEY".to_string(),
                    hint: "Set ANTHROPIC_API_KEY or choose another LLM_BACKEND".to_string(),
                });
            }
            LlmBackend::OpenAiCompatible if openai_compatible.is_none() => {
                return Err(ConfigError::MissingRequired {
                    key: "OPENAI_API_KEY".to_string(),
                    hint: "Set OPENAI_API_KEY (or OPENAI_BASE_URL for a local gateway)"
                        .to_string(),
                });
            }
            _ => {}
        }

        Ok(Self {
            backend,
            anthropic,
            openai_compatible,
        })
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: optional_env("GATEWAY_HOST")?.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_optional_env("GATEWAY_PORT", 8080u16)?,
        })
    }

    /// Socket address to bind the gateway to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "GATEWAY_HOST/GATEWAY_PORT".to_string(),
                message: format!("{e}"),
            })
    }
}

// Helper functions

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
