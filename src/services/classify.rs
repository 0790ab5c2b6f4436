//! Response classification — draft content or clarifying question?
//!
//! DESIGN
//! ======
//! A `draft`/`edit`-intent response streams into the draft panel before
//! anyone knows whether the model actually delivered a post or asked a
//! clarifying question. Classification is the authoritative post-hoc call.
//! It is an external seam (`Classify`): production prompts the chat model for
//! a one-word verdict, while `HeuristicClassifier` wraps a deterministic pure
//! heuristic for no-LLM deployments and tests.
//!
//! ERROR HANDLING
//! ==============
//! A failed classification defaults to `Draft` — the safer failure mode: a
//! misrouted question merely appears in the draft panel instead of being
//! silently lost. Callers apply the fallback via [`classify_with_fallback`];
//! errors are warn-logged, never surfaced.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::warn;

use crate::llm::LlmChat;
use crate::llm::types::{LlmError, Message};
use crate::services::chat::Intent;

/// Only this many leading characters are inspected for classification.
pub const CLASSIFY_WINDOW_CHARS: usize = 1500;

const CLASSIFY_MAX_TOKENS: u32 = 16;

const CLASSIFIER_SYSTEM_PROMPT: &str = "\
You label assistant responses for a social-media drafting tool.\n\
A response is a QUESTION when it is structured as a clarifying ask: numbered \
options to choose from, \"which angle/approach\" prompts, or an explicit \
request for the user's preference.\n\
A response is a DRAFT when it is delivered content: a hook, body, hashtags, \
a call to action, or otherwise ready-to-publish prose.\n\
Reply with exactly one word: \"question\" or \"draft\".";

// =============================================================================
// TYPES
// =============================================================================

/// Authoritative label for a draft/edit-intent response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Deliverable content — route to the draft panel and the version store.
    Draft,
    /// A clarifying ask — belongs in the transcript, never versioned.
    Question,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("unrecognized classifier verdict: {0:?}")]
    Verdict(String),
}

/// The external classifier seam. Must be deterministic for identical input.
#[async_trait::async_trait]
pub trait Classify: Send + Sync {
    async fn classify(&self, content: &str, intent: Intent) -> Result<ResponseKind, ClassifyError>;
}

// =============================================================================
// FALLBACK POLICY
// =============================================================================

/// Classify with the standing failure policy: any error defaults to `Draft`.
pub async fn classify_with_fallback(classifier: &dyn Classify, content: &str, intent: Intent) -> ResponseKind {
    match classifier.classify(content, intent).await {
        Ok(kind) => kind,
        Err(e) => {
            warn!(error = %e, "classify: falling back to draft");
            ResponseKind::Draft
        }
    }
}

// =============================================================================
// LLM CLASSIFIER
// =============================================================================

/// Production classifier: one chat call, one-word verdict.
pub struct LlmClassifier {
    llm: Arc<dyn LlmChat>,
}

impl LlmClassifier {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmChat>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl Classify for LlmClassifier {
    async fn classify(&self, content: &str, intent: Intent) -> Result<ResponseKind, ClassifyError> {
        let window = head(content, CLASSIFY_WINDOW_CHARS);
        let prompt = format!("Declared intent: {}\n\nResponse to label:\n{window}", intent.as_str());
        let messages = [Message::user(prompt)];

        let response = self
            .llm
            .chat(CLASSIFY_MAX_TOKENS, CLASSIFIER_SYSTEM_PROMPT, &messages)
            .await?;
        parse_verdict(&response.text)
    }
}

fn parse_verdict(raw: &str) -> Result<ResponseKind, ClassifyError> {
    let verdict = raw.trim().to_lowercase();
    if verdict.contains("question") {
        Ok(ResponseKind::Question)
    } else if verdict.contains("draft") {
        Ok(ResponseKind::Draft)
    } else {
        Err(ClassifyError::Verdict(raw.trim().to_string()))
    }
}

// =============================================================================
// HEURISTIC CLASSIFIER
// =============================================================================

/// Deterministic classifier for deployments without an LLM and for tests.
pub struct HeuristicClassifier;

#[async_trait::async_trait]
impl Classify for HeuristicClassifier {
    async fn classify(&self, content: &str, _intent: Intent) -> Result<ResponseKind, ClassifyError> {
        Ok(heuristic_kind(content))
    }
}

static INTERROGATIVE_LEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(which|what|who|when|how|do you|would you|should i|are you|can you)\b").expect("static regex")
});

static NUMBERED_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s+").expect("static regex"));

static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("static regex"));

static PREFERENCE_ASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(which (angle|approach|direction|option|one|of these)|do you prefer|would you prefer|would you like|let me know which)\b")
        .expect("static regex")
});

static DELIVERY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(here('|’)s (your|the) post|here is (your|the) post|^hook:|^caption:|^call to action)")
        .expect("static regex")
});

/// Pure decision heuristic over the leading window of a response.
///
/// A response is a question when it is structured as a clarifying ask rather
/// than delivered content. Deterministic for identical input.
#[must_use]
pub fn heuristic_kind(content: &str) -> ResponseKind {
    let window = head(content, CLASSIFY_WINDOW_CHARS);

    // Delivered-content markers win: a post can legitimately end with a
    // question ("What would you add? #launch").
    if DELIVERY_MARKER.is_match(window) || HASHTAG.find_iter(window).count() >= 2 {
        return ResponseKind::Draft;
    }

    let has_question_mark = window.contains('?');
    if !has_question_mark {
        return ResponseKind::Draft;
    }

    if PREFERENCE_ASK.is_match(window) {
        return ResponseKind::Question;
    }

    let first_line = window.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if INTERROGATIVE_LEAD.is_match(first_line.trim_start()) {
        return ResponseKind::Question;
    }

    // Numbered options plus a question mark reads as "pick one".
    if NUMBERED_LINE.find_iter(window).count() >= 2 {
        return ResponseKind::Question;
    }

    ResponseKind::Draft
}

// =============================================================================
// HELPERS
// =============================================================================

/// First `limit` characters, on a char boundary.
fn head(content: &str, limit: usize) -> &str {
    match content.char_indices().nth(limit) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[cfg(test)]
#[path = "classify_test.rs"]
mod tests;
