//! OpenAI-compatible chat-completions client.
//!
//! Supports custom base URLs for OpenAI-compatible APIs. Mirrors the
//! Anthropic client: one-shot `chat` for classification, `stream_chat` for
//! generation, pure payload parsing underneath.

use std::time::Duration;

use futures::StreamExt;

use super::config::LlmTimeouts;
use super::sse::SseDecoder;
use super::types::{ChatResponse, LlmError, Message, TokenStream};

/// Chat-completions stream terminator.
const DONE_SENTINEL: &str = "[DONE]";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn send(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let msgs = build_messages(system, messages);
        let body = ApiRequest { model, max_completion_tokens: max_tokens, messages: &msgs, stream };
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
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
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn build_messages<'a>(system: &'a str, messages: &'a [Message]) -> Vec<WireMessage<'a>> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        out.push(WireMessage { role: "system", content: system });
    }
    out.extend(
        messages
            .iter()
            .map(|m| WireMessage { role: &m.role, content: &m.content }),
    );
    out
}

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_completion_tokens: u32,
    messages: &'a [WireMessage<'a>],
    stream: bool,
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<Usage>,
}

#[derive(serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(serde::Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(serde::Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str) -> Result<ChatResponse, LlmError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| LlmError::ApiParse(e.to_string()))?;

    let choice = api
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ApiParse("response contained no choices".into()))?;

    Ok(ChatResponse {
        text: choice.message.content.unwrap_or_default(),
        model: api.model,
        stop_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
        input_tokens: api.usage.as_ref().map_or(0, |u| u.prompt_tokens),
        output_tokens: api.usage.as_ref().map_or(0, |u| u.completion_tokens),
    })
}

/// Extract the text delta from one chat-completions stream payload.
fn parse_stream_payload(payload: &str) -> Option<Result<String, LlmError>> {
    if payload.trim() == DONE_SENTINEL {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| Ok(c.to_string()))
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;
