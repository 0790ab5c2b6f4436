//! Stream router — speculative token routing with post-hoc reconciliation.
//!
//! DESIGN
//! ======
//! A generation request declares an intent before any token arrives. The
//! router optimistically routes the live stream: `draft`/`edit` intents go to
//! the draft panel (with a rotating progress placeholder in the transcript),
//! everything else streams straight into the transcript. Once the stream
//! completes, classification makes the authoritative call; if the speculative
//! choice was wrong the router rolls back — the panel is cleared and the text
//! lands in the transcript as a follow-up question.
//!
//! The state machine is a reducer: `step(state, event) -> (state, effects)`.
//! One authoritative transition function per event, no scattered mutation;
//! rollback is a pure transition, not ad hoc cleanup. The async driver
//! (`run_stream`) owns the clock and the I/O: it feeds arrival-ordered events
//! into the reducer, applies effects through a [`StreamSink`], rotates the
//! placeholder at a minimum 1-second cadence, and invokes the classifier
//! exactly once, strictly after the last chunk.
//!
//! ERROR HANDLING
//! ==============
//! A mid-stream failure surfaces as a chat-visible error effect and clears
//! any partial panel payload; no commit or message-complete effect is ever
//! emitted for a failed stream, so partial drafts cannot be persisted.

use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use regex::Regex;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::llm::types::TokenStream;
use crate::services::chat::Intent;
use crate::services::classify::{Classify, ResponseKind, classify_with_fallback};

/// Minimum cadence for advancing the transcript progress placeholder.
pub const PLACEHOLDER_INTERVAL: Duration = Duration::from_secs(1);

/// Rotating progress phrases shown in the transcript while a draft streams
/// into the panel. Keeps the conversation from looking frozen without leaking
/// unfinished draft text into the history.
pub const PLACEHOLDER_PHRASES: &[&str] = &[
    "Drafting your post…",
    "Shaping the hook…",
    "Polishing the wording…",
    "Tightening the message…",
    "Adding finishing touches…",
];

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Where a live stream is being forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    DraftPanel,
    Transcript,
}

impl RouteTarget {
    /// The speculative target for a declared intent.
    #[must_use]
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::Draft | Intent::Edit => Self::DraftPanel,
            Intent::Ideate | Intent::Feedback | Intent::General => Self::Transcript,
        }
    }
}

/// Router lifecycle: `Idle → Streaming → Classifying → Resolved`, with
/// `Failed` as the terminal state for broken streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterState {
    Idle { intent: Intent, target: RouteTarget },
    Streaming { intent: Intent, target: RouteTarget, accumulated: String },
    Classifying { intent: Intent, text: String },
    Resolved { target: RouteTarget },
    Failed,
}

impl RouterState {
    /// Entry point: a new generation request with a declared intent.
    #[must_use]
    pub fn new(intent: Intent) -> Self {
        Self::Idle { intent, target: RouteTarget::for_intent(intent) }
    }

    fn is_panel_bound(&self) -> bool {
        match self {
            Self::Idle { target, .. } | Self::Streaming { target, .. } => *target == RouteTarget::DraftPanel,
            Self::Classifying { .. } => true,
            Self::Resolved { .. } | Self::Failed => false,
        }
    }
}

/// One event in the life of a stream, in arrival order.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    Chunk(String),
    StreamEnd,
    Classified(ResponseKind),
    StreamError(String),
}

/// Observable side effects requested by a transition. The reducer never
/// performs I/O; the driver applies these through a [`StreamSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEffect {
    /// Stream the accumulated text to the draft panel.
    ForwardToPanel { content: String, intent: Intent },
    /// Stream the accumulated text into the transcript message.
    ForwardToTranscript { content: String },
    /// Advance the transcript progress placeholder. Driver-generated.
    AdvancePlaceholder { phrase: String },
    /// Run the classifier over the cleaned final text. Driver-internal.
    RequestClassification { content: String },
    /// Rollback: signal an empty payload so the panel clears partial text.
    ClearPanel,
    /// Confirmed draft content: update the transcript message, attach the
    /// draft content reference, and hand the text to the version store.
    CommitDraft { content: String, intent: Intent },
    /// Final text is ordinary transcript content. `follow_up` marks a
    /// rolled-back clarifying question.
    CommitTranscript { content: String, intent: Option<Intent>, follow_up: bool },
    /// Exactly-once terminal notification, fired after reconciliation.
    /// External persistence hangs off this.
    MessageComplete { content: String, intent: Option<Intent> },
    /// Mid-stream failure, surfaced as a chat-visible error entry.
    SurfaceError { message: String },
}

/// The authoritative transition function. Total: out-of-order events leave
/// the state unchanged with no effects.
#[must_use]
pub fn step(state: RouterState, event: RouterEvent) -> (RouterState, Vec<RouterEffect>) {
    match (state, event) {
        (RouterState::Idle { intent, target }, RouterEvent::Chunk(chunk)) => {
            let accumulated = chunk;
            let effects = vec![forward(target, &accumulated, intent)];
            (RouterState::Streaming { intent, target, accumulated }, effects)
        }
        (RouterState::Streaming { intent, target, mut accumulated }, RouterEvent::Chunk(chunk)) => {
            accumulated.push_str(&chunk);
            let effects = vec![forward(target, &accumulated, intent)];
            (RouterState::Streaming { intent, target, accumulated }, effects)
        }
        (RouterState::Idle { intent, target }, RouterEvent::StreamEnd) => end_stream(intent, target, ""),
        (RouterState::Streaming { intent, target, accumulated }, RouterEvent::StreamEnd) => {
            end_stream(intent, target, &accumulated)
        }
        (RouterState::Classifying { intent, text }, RouterEvent::Classified(ResponseKind::Draft)) => {
            // Commit: the speculative panel routing was right.
            let effects = vec![
                RouterEffect::CommitDraft { content: text.clone(), intent },
                RouterEffect::MessageComplete { content: text, intent: Some(intent) },
            ];
            (RouterState::Resolved { target: RouteTarget::DraftPanel }, effects)
        }
        (RouterState::Classifying { text, .. }, RouterEvent::Classified(ResponseKind::Question)) => {
            // Rollback: the model asked a clarifying question. Clear the
            // panel, drop the intent label, and mark the follow-up.
            let effects = vec![
                RouterEffect::ClearPanel,
                RouterEffect::CommitTranscript { content: text.clone(), intent: None, follow_up: true },
                RouterEffect::MessageComplete { content: text, intent: None },
            ];
            (RouterState::Resolved { target: RouteTarget::Transcript }, effects)
        }
        (state, RouterEvent::StreamError(message))
            if !matches!(state, RouterState::Resolved { .. } | RouterState::Failed) =>
        {
            let mut effects = Vec::new();
            if state.is_panel_bound() {
                effects.push(RouterEffect::ClearPanel);
            }
            effects.push(RouterEffect::SurfaceError { message });
            (RouterState::Failed, effects)
        }
        (state, _) => (state, Vec::new()),
    }
}

fn forward(target: RouteTarget, accumulated: &str, intent: Intent) -> RouterEffect {
    match target {
        RouteTarget::DraftPanel => RouterEffect::ForwardToPanel { content: accumulated.to_string(), intent },
        RouteTarget::Transcript => RouterEffect::ForwardToTranscript { content: accumulated.to_string() },
    }
}

fn end_stream(intent: Intent, target: RouteTarget, accumulated: &str) -> (RouterState, Vec<RouterEffect>) {
    let cleaned = clean_response(accumulated);
    match target {
        RouteTarget::DraftPanel => {
            let effects = vec![RouterEffect::RequestClassification { content: cleaned.clone() }];
            (RouterState::Classifying { intent, text: cleaned }, effects)
        }
        RouteTarget::Transcript => {
            let effects = vec![
                RouterEffect::CommitTranscript { content: cleaned.clone(), intent: Some(intent), follow_up: false },
                RouterEffect::MessageComplete { content: cleaned, intent: Some(intent) },
            ];
            (RouterState::Resolved { target: RouteTarget::Transcript }, effects)
        }
    }
}

// =============================================================================
// HALLUCINATION CLEANUP
// =============================================================================

// Artifact markers the generator occasionally appends: a stray end-of-file
// token or an echo of the conversation history block.
static ARTIFACT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:\[?end of file\]?|<end of file>|conversation history:?)\s*$").expect("static regex")
});

static EXCESS_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Produce the canonical final text: truncate at the earliest artifact
/// marker, collapse excess blank lines, trim the edges.
#[must_use]
pub fn clean_response(raw: &str) -> String {
    let truncated = match ARTIFACT_MARKER.find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    };
    EXCESS_BLANK_LINES
        .replace_all(truncated, "\n\n")
        .trim()
        .to_string()
}

// =============================================================================
// DRIVER
// =============================================================================

/// Applies router effects to the outside world: transcript mutation, panel
/// payloads, error entries. One implementation per surface (WS connection,
/// tests).
#[async_trait::async_trait]
pub trait StreamSink: Send {
    async fn apply(&mut self, effect: RouterEffect);
}

/// How a stream ended, for the caller's draft-store merge step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Confirmed draft content.
    Draft,
    /// Ordinary transcript content; `follow_up` marks a rolled-back question.
    Chat { follow_up: bool },
}

#[derive(Debug)]
pub struct StreamOutcome {
    /// Cleaned canonical final text. Empty when the stream failed.
    pub final_text: String,
    /// `None` when the stream failed before completing.
    pub resolution: Option<Resolution>,
}

/// Consume a token stream to completion, routing through the reducer.
///
/// Chunks are applied strictly in arrival order. The classifier runs at most
/// once, strictly after the last chunk, and only for panel-bound intents;
/// classification failure falls back to `Draft` inside
/// [`classify_with_fallback`].
pub async fn run_stream(
    mut tokens: TokenStream,
    intent: Intent,
    classifier: &dyn Classify,
    sink: &mut dyn StreamSink,
) -> StreamOutcome {
    let mut state = RouterState::new(intent);
    let mut outcome = StreamOutcome { final_text: String::new(), resolution: None };

    let mut phrase_idx = rand::rng().random_range(0..PLACEHOLDER_PHRASES.len());
    let mut ticker = tokio::time::interval(PLACEHOLDER_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut classify_text: Option<String> = None;

    loop {
        tokio::select! {
            maybe = tokens.next() => {
                let event = match maybe {
                    Some(Ok(chunk)) => RouterEvent::Chunk(chunk),
                    Some(Err(e)) => {
                        warn!(error = %e, "router: stream failed mid-generation");
                        RouterEvent::StreamError(e.to_string())
                    }
                    None => RouterEvent::StreamEnd,
                };
                let terminal = !matches!(event, RouterEvent::Chunk(_));
                let (next, effects) = step(state, event);
                state = next;
                apply_effects(effects, sink, &mut classify_text, &mut outcome).await;
                if terminal {
                    break;
                }
            }
            _ = ticker.tick(), if state.is_panel_bound() && classify_text.is_none() => {
                let phrase = PLACEHOLDER_PHRASES[phrase_idx];
                phrase_idx = (phrase_idx + 1) % PLACEHOLDER_PHRASES.len();
                sink.apply(RouterEffect::AdvancePlaceholder { phrase: phrase.to_string() }).await;
            }
        }
    }

    // Classification runs exactly once, strictly after the last chunk.
    if let Some(text) = classify_text {
        let kind = classify_with_fallback(classifier, &text, intent).await;
        info!(?kind, chars = text.chars().count(), "router: classified");
        let (next, effects) = step(state, RouterEvent::Classified(kind));
        state = next;
        apply_effects(effects, sink, &mut None, &mut outcome).await;
    }

    if matches!(state, RouterState::Failed) {
        outcome.resolution = None;
        outcome.final_text.clear();
    }
    outcome
}

async fn apply_effects(
    effects: Vec<RouterEffect>,
    sink: &mut dyn StreamSink,
    classify_text: &mut Option<String>,
    outcome: &mut StreamOutcome,
) {
    for effect in effects {
        match effect {
            RouterEffect::RequestClassification { content } => {
                *classify_text = Some(content);
            }
            RouterEffect::CommitDraft { ref content, .. } => {
                outcome.final_text.clone_from(content);
                outcome.resolution = Some(Resolution::Draft);
                sink.apply(effect).await;
            }
            RouterEffect::CommitTranscript { ref content, follow_up, .. } => {
                outcome.final_text.clone_from(content);
                outcome.resolution = Some(Resolution::Chat { follow_up });
                sink.apply(effect).await;
            }
            other => sink.apply(other).await,
        }
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
