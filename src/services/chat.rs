//! Chat orchestration — the sendMessage pipeline.
//!
//! DESIGN
//! ======
//! One entry point per user action: `send_message` appends the user message,
//! assembles generator history plus audience context, opens the token stream
//! with the declared intent, and drives the stream router to a resolution.
//! On a confirmed draft the final text is merged into the version store: a
//! `draft` intent spawns a fresh Draft keyed by the assistant message id, a
//! confirmed `edit` parses the response and appends a version to the active
//! draft. `send_range_edit` scopes an instruction to a selected span and
//! re-enters the same pipeline as an edit.
//!
//! Durable writes are fire-and-forget after the terminal notification; the
//! in-memory conversation is the source of truth for the session.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::frame::now_ms;
use crate::llm::types::Message;
use crate::services::draft::{Draft, DraftError};
use crate::services::edit_parse;
use crate::services::range_edit::{self, HighlightSpan};
use crate::services::router::{Resolution, StreamSink, run_stream};
use crate::state::AppState;

const DEFAULT_CHAT_MAX_TOKENS: u32 = 2048;

/// Most recent transcript turns sent back to the generator.
const HISTORY_WINDOW: usize = 20;

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn chat_max_tokens() -> u32 {
    static VALUE: OnceLock<u32> = OnceLock::new();
    *VALUE.get_or_init(|| env_parse("CHAT_MAX_TOKENS", DEFAULT_CHAT_MAX_TOKENS))
}

// =============================================================================
// TYPES
// =============================================================================

/// Declared intent attached to a user message by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Draft,
    Edit,
    Ideate,
    Feedback,
    General,
}

impl Intent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Edit => "edit",
            Self::Ideate => "ideate",
            Self::Feedback => "feedback",
            Self::General => "general",
        }
    }

    /// Lenient parse; unknown labels fall back to `general`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Self::Draft,
            "edit" => Self::Edit,
            "ideate" => Self::Ideate,
            "feedback" => Self::Feedback,
            _ => Self::General,
        }
    }
}

/// One transcript entry.
///
/// `content` is what the transcript shows; `raw_content` (when set) is what
/// the generator sent or received instead — range-edit prompts for user
/// messages, the unparsed edit response for assistant messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_content: Option<String>,
    #[serde(default)]
    pub is_follow_up_question: bool,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>, raw_content: Option<String>, intent: Intent, ts: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: "user".into(),
            content: content.into(),
            raw_content,
            created_at: ts,
            intent: Some(intent),
            draft_content: None,
            is_follow_up_question: false,
        }
    }
}

/// Server-side state for one conversation. Drafts are keyed by the assistant
/// message that spawned them; `active_draft` points at the one edits apply to.
#[derive(Debug, Default)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub drafts: HashMap<Uuid, Draft>,
    pub active_draft: Option<Uuid>,
}

impl Conversation {
    #[must_use]
    pub fn active_draft(&self) -> Option<&Draft> {
        self.active_draft.and_then(|id| self.drafts.get(&id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("empty message")]
    EmptyPrompt,
    #[error("LLM not configured")]
    LlmNotConfigured,
    #[error("no active draft to edit")]
    NoActiveDraft,
    #[error("generation stream failed")]
    StreamFailed,
    #[error("draft error: {0}")]
    Draft(#[from] DraftError),
    #[error("LLM error: {0}")]
    Llm(#[from] crate::llm::types::LlmError),
}

impl crate::frame::ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "E_EMPTY_PROMPT",
            Self::LlmNotConfigured => "E_LLM_NOT_CONFIGURED",
            Self::NoActiveDraft => "E_NO_ACTIVE_DRAFT",
            Self::StreamFailed => "E_STREAM_FAILED",
            Self::Draft(_) => "E_DRAFT",
            Self::Llm(_) => "E_LLM_ERROR",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::StreamFailed) || matches!(self, Self::Llm(e) if e.retryable())
    }
}

/// Result of a resolved send: the final assistant message plus the updated
/// draft value when the resolution committed one.
#[derive(Debug)]
pub struct SendOutcome {
    pub user_message: ChatMessage,
    pub message: ChatMessage,
    pub draft: Option<Draft>,
}

// =============================================================================
// SEND PIPELINE
// =============================================================================

pub async fn send_message(
    state: &AppState,
    conversation_id: Uuid,
    content: &str,
    intent: Intent,
    sink: &mut dyn StreamSink,
) -> Result<SendOutcome, ChatError> {
    send_with(state, conversation_id, content, None, intent, sink).await
}

/// Build a range-scoped edit and re-enter the pipeline as a whole-draft edit.
/// The transcript shows the bare instruction; the generator sees the scoped
/// prompt.
pub async fn send_range_edit(
    state: &AppState,
    conversation_id: Uuid,
    selected_text: &str,
    instruction: &str,
    sink: &mut dyn StreamSink,
) -> Result<(SendOutcome, Option<HighlightSpan>), ChatError> {
    let draft_content = {
        let conversations = state.conversations.read().await;
        let conversation = conversations
            .get(&conversation_id)
            .ok_or(ChatError::NoActiveDraft)?;
        conversation
            .active_draft()
            .map(|d| d.content.clone())
            .ok_or(ChatError::NoActiveDraft)?
    };

    let (request, span) = range_edit::build(&draft_content, selected_text, instruction);
    info!(
        %conversation_id,
        selected_chars = request.selected_text.chars().count(),
        span_found = span.is_some(),
        "chat: range edit"
    );

    let prompt = range_edit_prompt(&request.selected_text, &request.instruction);
    let outcome = send_with(state, conversation_id, instruction, Some(prompt), Intent::Edit, sink).await?;
    Ok((outcome, span))
}

async fn send_with(
    state: &AppState,
    conversation_id: Uuid,
    display_content: &str,
    raw_content: Option<String>,
    intent: Intent,
    sink: &mut dyn StreamSink,
) -> Result<SendOutcome, ChatError> {
    if display_content.trim().is_empty() {
        return Err(ChatError::EmptyPrompt);
    }
    let streamer = state.streamer.clone().ok_or(ChatError::LlmNotConfigured)?;

    info!(%conversation_id, intent = intent.as_str(), chars = display_content.chars().count(), "chat: send");

    // Append the user message and snapshot what the generator needs.
    let (history, active_draft, user_message) = {
        let mut conversations = state.conversations.write().await;
        let conversation = conversations.entry(conversation_id).or_default();
        let message = ChatMessage::user(display_content, raw_content, intent, now_ms());
        conversation.messages.push(message.clone());
        (
            build_history(&conversation.messages),
            conversation.active_draft().cloned(),
            message,
        )
    };

    let context = state.context.supply(conversation_id).await;
    let system = build_system_prompt(intent, active_draft.as_ref(), &context);

    let tokens = streamer
        .stream_chat(chat_max_tokens(), &system, &history)
        .await?;
    let outcome = run_stream(tokens, intent, state.classifier.as_ref(), sink).await;

    let Some(resolution) = outcome.resolution else {
        return Err(ChatError::StreamFailed);
    };

    // A confirmed draft with no usable text has nothing to version. The
    // terminal notification already went out, so land it as a plain chat
    // entry rather than failing the send afterwards.
    let resolution = match resolution {
        Resolution::Draft if outcome.final_text.trim().is_empty() => Resolution::Chat { follow_up: false },
        other => other,
    };

    // Merge the resolution into the conversation and version store.
    let ts = now_ms();
    let (message, committed) = match resolution {
        Resolution::Draft => {
            let message_id = Uuid::new_v4();
            match active_draft.filter(|_| intent == Intent::Edit) {
                Some(base) => {
                    let parsed = edit_parse::parse(&outcome.final_text);
                    let updated =
                        base.create_version(&parsed.content, Some(display_content), parsed.changes.clone(), ts);
                    let message = ChatMessage {
                        id: message_id,
                        role: "assistant".into(),
                        content: edit_summary(parsed.changes.as_deref()),
                        raw_content: Some(outcome.final_text.clone()),
                        created_at: ts,
                        intent: Some(intent),
                        draft_content: Some(parsed.content),
                        is_follow_up_question: false,
                    };
                    (message, Some(updated))
                }
                // A fresh draft, or an edit arriving with nothing to edit.
                None => {
                    let draft = Draft::new(message_id, outcome.final_text.clone(), ts)?;
                    let message = ChatMessage {
                        id: message_id,
                        role: "assistant".into(),
                        content: outcome.final_text.clone(),
                        raw_content: None,
                        created_at: ts,
                        intent: Some(intent),
                        draft_content: Some(outcome.final_text.clone()),
                        is_follow_up_question: false,
                    };
                    (message, Some(draft))
                }
            }
        }
        Resolution::Chat { follow_up } => {
            let message = ChatMessage {
                id: Uuid::new_v4(),
                role: "assistant".into(),
                content: outcome.final_text.clone(),
                raw_content: None,
                created_at: ts,
                intent: if follow_up { None } else { Some(intent) },
                draft_content: None,
                is_follow_up_question: follow_up,
            };
            (message, None)
        }
    };

    {
        let mut conversations = state.conversations.write().await;
        let conversation = conversations.entry(conversation_id).or_default();
        conversation.messages.push(message.clone());
        if let Some(draft) = &committed {
            conversation
                .drafts
                .insert(draft.source_message_id, draft.clone());
            conversation.active_draft = Some(draft.source_message_id);
        }
    }

    info!(
        %conversation_id,
        message_id = %message.id,
        draft_version = committed.as_ref().map(|d| d.current_version),
        follow_up = message.is_follow_up_question,
        "chat: resolved"
    );

    // Durable writes happen off the hot path; the session state is already
    // correct either way.
    crate::services::persistence::spawn_persist_message(&state.pool, conversation_id, &user_message);
    crate::services::persistence::spawn_persist_message(&state.pool, conversation_id, &message);
    if let Some(draft) = &committed {
        crate::services::persistence::spawn_persist_draft_version(&state.pool, conversation_id, draft);
    }

    Ok(SendOutcome { user_message, message, draft: committed })
}

// =============================================================================
// HISTORY & PROMPTS
// =============================================================================

/// Generator history: last [`HISTORY_WINDOW`] turns, raw content preferred
/// over display content, empty entries skipped.
fn build_history(messages: &[ChatMessage]) -> Vec<Message> {
    let start = messages.len().saturating_sub(HISTORY_WINDOW);
    messages[start..]
        .iter()
        .filter_map(|m| {
            let text = m.raw_content.as_deref().unwrap_or(&m.content);
            if text.is_empty() {
                return None;
            }
            Some(match m.role.as_str() {
                "assistant" => Message::assistant(text),
                _ => Message::user(text),
            })
        })
        .collect()
}

pub(crate) fn build_system_prompt(
    intent: Intent,
    active_draft: Option<&Draft>,
    context: &crate::services::context::RetrievalContext,
) -> String {
    let mut prompt = String::from(
        "You are a social-media writing assistant. You help the user write, \
         refine, and plan posts grounded in their audience analytics.\n\n",
    );

    prompt.push_str(match intent {
        Intent::Draft => {
            "The user wants a post drafted. Write the post itself — no preamble, \
             no commentary, no surrounding quotes. If the request is too vague to \
             draft from, ask one specific clarifying question instead.\n"
        }
        Intent::Edit => {
            "The user wants their current draft revised. Apply the instruction to \
             the draft below and respond in exactly this shape:\n\n\
             Revised post:\n<the full revised post>\n\n\
             Changes made:\n- <one bullet per change>\n\n\
             If the instruction is too ambiguous to apply, ask one specific \
             clarifying question instead.\n"
        }
        Intent::Ideate => {
            "The user wants ideas, not a finished post. Offer a handful of \
             distinct angles with a sentence of reasoning each.\n"
        }
        Intent::Feedback => {
            "The user wants feedback on their current draft. Be specific about \
             what works and what to change; do not rewrite the post unasked.\n"
        }
        Intent::General => "Answer conversationally and concisely.\n",
    });

    if matches!(intent, Intent::Edit | Intent::Feedback) {
        if let Some(draft) = active_draft {
            prompt.push_str("\nCurrent draft:\n");
            prompt.push_str(&draft.content);
            prompt.push('\n');
        }
    }

    if !context.is_empty() {
        prompt.push_str("\nAudience context:\n");
        for (label, block) in [
            ("Summary", &context.summary),
            ("Demographics", &context.demographics),
            ("Recent posts", &context.recent_posts),
            ("Engagement patterns", &context.engagement_patterns),
        ] {
            if let Some(text) = block {
                prompt.push_str(label);
                prompt.push_str(": ");
                prompt.push_str(text);
                prompt.push('\n');
            }
        }
    }

    prompt
}

fn range_edit_prompt(selected_text: &str, instruction: &str) -> String {
    format!(
        "Revise only this passage of the current draft, leaving the rest \
         unchanged:\n\n\"{selected_text}\"\n\nInstruction: {instruction}\n\n\
         Respond with the full revised post in the usual Revised post / \
         Changes made shape."
    )
}

fn edit_summary(changes: Option<&[String]>) -> String {
    match changes {
        Some(changes) if !changes.is_empty() => {
            let mut out = String::from("Updated the draft:");
            for change in changes {
                out.push_str("\n• ");
                out.push_str(change);
            }
            out
        }
        _ => "Updated the draft.".into(),
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
