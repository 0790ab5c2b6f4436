//! Anthropic Messages API client.
//!
//! Thin HTTP wrapper for `/v1/messages`, in both one-shot and streamed form.
//! One-shot calls serve classification; generation always streams. Pure
//! parsing functions (`parse_response`, `parse_stream_payload`) keep the wire
//! handling testable without a network.

use std::time::Duration;

use futures::StreamExt;

use super::config::LlmTimeouts;
use super::sse::SseDecoder;
use super::types::{ChatResponse, LlmError, Message, TokenStream};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key })
    }

    async fn send(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = ApiRequest { model, max_tokens, system, messages, stream };
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiResponse { status, body });
        }
        Ok(response)
    }

    pub async fn chat(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
    ) -> Result<ChatResponse, LlmError> {
        let response = self.send(model, max_tokens, system, messages, false).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        parse_response(&text)
    }

    pub async fn stream_chat(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
    ) -> Result<TokenStream, LlmError> {
        let response = self.send(model, max_tokens, system, messages, true).await?;

        let tokens = response
            .bytes_stream()
            .map(|item| item.map_err(|e| LlmError::Stream(e.to_string())))
            .scan(SseDecoder::new(), |decoder, item| {
                let batch: Vec<Result<String, LlmError>> = match item {
                    Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(futures::stream::iter(batch)))
            })
            .flatten()
            .filter_map(|item| {
                futures::future::ready(match item {
                    Ok(payload) => parse_stream_payload(&payload),
                    Err(e) => Some(Err(e)),
                })
            });

        Ok(Box::pin(tokens))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    content: Vec<WireBlock>,
    model: String,
    stop_reason: String,
    usage: Usage,
}

#[derive(serde::Deserialize)]
#[serde(tag = "type")]
enum WireBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(serde::Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str) -> Result<ChatResponse, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let text = api
        .content
        .iter()
        .filter_map(|block| match block {
            WireBlock::Text { text } => Some(text.as_str()),
            WireBlock::Unknown => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ChatResponse {
        text,
        model: api.model,
        stop_reason: api.stop_reason,
        input_tokens: api.usage.input_tokens,
        output_tokens: api.usage.output_tokens,
    })
}

/// Extract the text delta from one stream event payload.
///
/// Returns `None` for events without text (message lifecycle, block starts,
/// ping) and `Some(Err(..))` for provider-reported stream errors.
fn parse_stream_payload(payload: &str) -> Option<Result<String, LlmError>> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    match value.get("type").and_then(|t| t.as_str())? {
        "content_block_delta" => {
            let delta = value.get("delta")?;
            if delta.get("type").and_then(|t| t.as_str()) != Some("text_delta") {
                return None;
            }
            delta
                .get("text")
                .and_then(|t| t.as_str())
                .map(|t| Ok(t.to_string()))
        }
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("provider stream error");
            Some(Err(LlmError::Stream(message.to_string())))
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "anthropic_test.rs"]
mod tests;
