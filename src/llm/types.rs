//! LLM types — provider-neutral message and stream types.
//!
//! Provider-neutral types shared by the Anthropic and `OpenAI` clients. The
//! engine consumes two seams: [`LlmChat`] for one-shot calls (classification)
//! and [`LlmStream`] for token-by-token generation.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The required API key environment variable is not set.
    #[error("missing API key: env var {var} not set")]
    MissingApiKey { var: String },

    /// The HTTP request to the LLM provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The LLM provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The LLM provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The event stream broke mid-generation.
    #[error("stream failed: {0}")]
    Stream(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::frame::ErrorCode for LlmError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::MissingApiKey { .. } => "E_MISSING_API_KEY",
            Self::ApiRequest(_) => "E_API_REQUEST",
            Self::ApiResponse { .. } => "E_API_RESPONSE",
            Self::ApiParse(_) => "E_API_PARSE",
            Self::Stream(_) => "E_STREAM",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ApiRequest(_) | Self::Stream(_) | Self::ApiResponse { status: 429 | 500..=599, .. }
        )
    }
}

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// A single message in a conversation, as sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// Response from a one-shot LLM chat call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub stop_reason: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// =============================================================================
// TRAITS
// =============================================================================

/// An ordered sequence of text chunks ending with the stream itself ending.
/// Completion is the stream yielding `None`; an `Err` item is a transport
/// failure, after which no further items arrive.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Provider-neutral async trait for one-shot LLM chat. Enables mocking in tests.
#[async_trait::async_trait]
pub trait LlmChat: Send + Sync {
    /// Send a chat request and wait for the complete response.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request fails, the response is
    /// malformed, or the API key is absent.
    async fn chat(&self, max_tokens: u32, system: &str, messages: &[Message]) -> Result<ChatResponse, LlmError>;
}

/// Provider-neutral async trait for streamed generation.
#[async_trait::async_trait]
pub trait LlmStream: Send + Sync {
    /// Open a generation stream. Chunks arrive in order; the stream ends when
    /// the provider signals completion.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the stream cannot be opened. Mid-stream
    /// failures surface as `Err` items on the returned stream.
    async fn stream_chat(&self, max_tokens: u32, system: &str, messages: &[Message])
    -> Result<TokenStream, LlmError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
