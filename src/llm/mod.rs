//! LLM — multi-provider adapter for generation and classification.
//!
//! DESIGN
//! ======
//! The `LlmClient` enum dispatches to Anthropic or `OpenAI` based on
//! `LLM_PROVIDER`. Generation always goes through [`LlmStream`] (the engine
//! routes tokens as they arrive); the post-stream classification call uses
//! the one-shot [`LlmChat`] seam, optionally on a cheaper model.

pub mod anthropic;
pub mod config;
pub mod openai;
pub mod sse;
pub mod types;

use config::{LlmConfig, LlmProviderKind};
pub use types::{LlmChat, LlmStream};
use types::{ChatResponse, LlmError, Message, TokenStream};

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client that dispatches to either Anthropic or OpenAI.
///
/// Configured from environment variables by [`LlmClient::from_env`].
#[derive(Clone)]
pub struct LlmClient {
    inner: LlmProvider,
    model: String,
}

#[derive(Clone)]
enum LlmProvider {
    Anthropic(anthropic::AnthropicClient),
    OpenAi(openai::OpenAiClient),
}

impl LlmClient {
    /// Build an LLM client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(&config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client fails to build.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let model = config.model.clone();
        let inner = match config.provider {
            LlmProviderKind::Anthropic => {
                LlmProvider::Anthropic(anthropic::AnthropicClient::new(config.api_key.clone(), config.timeouts)?)
            }
            LlmProviderKind::OpenAi => LlmProvider::OpenAi(openai::OpenAiClient::new(
                config.api_key.clone(),
                config.openai_base_url.clone(),
                config.timeouts,
            )?),
        };
        Ok(Self { inner, model })
    }

    /// Return the configured model name (e.g. `"claude-sonnet-4-5-20250929"`).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Same client, different model. Used to point the classifier at a
    /// cheaper model than generation.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn chat_inner(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        match &self.inner {
            LlmProvider::Anthropic(c) => c.chat(&self.model, max_tokens, system, messages).await,
            LlmProvider::OpenAi(c) => c.chat(&self.model, max_tokens, system, messages).await,
        }
    }

    async fn stream_inner(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<TokenStream, LlmError> {
        match &self.inner {
            LlmProvider::Anthropic(c) => c.stream_chat(&self.model, max_tokens, system, messages).await,
            LlmProvider::OpenAi(c) => c.stream_chat(&self.model, max_tokens, system, messages).await,
        }
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError> {
        self.chat_inner(max_tokens, system, messages).await
    }
}

#[async_trait::async_trait]
impl LlmStream for LlmClient {
    async fn stream_chat(
        &self,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
    ) -> Result<TokenStream, LlmError> {
        self.stream_inner(max_tokens, system, messages).await
    }
}
