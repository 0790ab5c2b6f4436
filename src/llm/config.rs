//! Typed LLM configuration read once at startup.
//!
//! The engine runs fine without a provider (heuristic classification, no
//! generation), so every knob here is env-driven and the whole config is
//! optional at the call site.

use super::types::LlmError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    Anthropic,
    OpenAi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: String,
    /// Generation model for chat streaming.
    pub model: String,
    /// Model used for the post-stream classification call. Defaults to the
    /// generation model; a smaller model keeps the call cheap.
    pub classifier_model: String,
    pub openai_base_url: String,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Read LLM settings from the environment.
    ///
    /// `LLM_API_KEY_ENV` is required and names the variable that actually
    /// holds the key, so deployments can point at `ANTHROPIC_API_KEY`,
    /// `OPENAI_API_KEY`, or anything else without renaming secrets.
    ///
    /// Optional overrides:
    /// - `LLM_PROVIDER`: `anthropic` (default) or `openai`
    /// - `LLM_MODEL`: provider default when absent
    /// - `LLM_CLASSIFIER_MODEL`: defaults to `LLM_MODEL`
    /// - `LLM_OPENAI_BASE_URL`: default OpenAI API base URL
    /// - `LLM_REQUEST_TIMEOUT_SECS` / `LLM_CONNECT_TIMEOUT_SECS`
    ///
    /// # Errors
    ///
    /// Returns an error when the key variable is unset or a value fails to
    /// parse.
    pub fn from_env() -> Result<Self, LlmError> {
        let provider = match std::env::var("LLM_PROVIDER").ok().as_deref() {
            None | Some("anthropic") => LlmProviderKind::Anthropic,
            Some("openai") => LlmProviderKind::OpenAi,
            Some(other) => {
                return Err(LlmError::ConfigParse(format!("unknown LLM_PROVIDER: {other}")));
            }
        };

        let key_var =
            std::env::var("LLM_API_KEY_ENV").map_err(|_| LlmError::MissingApiKey { var: "LLM_API_KEY_ENV".into() })?;
        let api_key = std::env::var(&key_var).map_err(|_| LlmError::MissingApiKey { var: key_var.clone() })?;

        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| {
            match provider {
                LlmProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
                LlmProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
            }
            .to_string()
        });
        let classifier_model = std::env::var("LLM_CLASSIFIER_MODEL").unwrap_or_else(|_| model.clone());
        let openai_base_url = std::env::var("LLM_OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeouts = LlmTimeouts {
            request_secs: secs_from_env("LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
            connect_secs: secs_from_env("LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { provider, api_key, model, classifier_model, openai_base_url, timeouts })
    }
}

fn secs_from_env(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
