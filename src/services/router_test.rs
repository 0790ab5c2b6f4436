use async_trait::async_trait;
use futures::stream;

use super::*;
use crate::llm::types::LlmError;
use crate::services::classify::ClassifyError;

// ===== REDUCER =====

#[test]
fn draft_and_edit_intents_target_the_panel() {
    assert_eq!(RouteTarget::for_intent(Intent::Draft), RouteTarget::DraftPanel);
    assert_eq!(RouteTarget::for_intent(Intent::Edit), RouteTarget::DraftPanel);
    assert_eq!(RouteTarget::for_intent(Intent::Ideate), RouteTarget::Transcript);
    assert_eq!(RouteTarget::for_intent(Intent::Feedback), RouteTarget::Transcript);
    assert_eq!(RouteTarget::for_intent(Intent::General), RouteTarget::Transcript);
}

#[test]
fn chunks_forward_cumulative_text_to_the_panel() {
    let state = RouterState::new(Intent::Draft);
    let (state, effects) = step(state, RouterEvent::Chunk("Hello ".into()));
    assert_eq!(
        effects,
        vec![RouterEffect::ForwardToPanel { content: "Hello ".into(), intent: Intent::Draft }]
    );
    let (_, effects) = step(state, RouterEvent::Chunk("world".into()));
    assert_eq!(
        effects,
        vec![RouterEffect::ForwardToPanel { content: "Hello world".into(), intent: Intent::Draft }]
    );
}

#[test]
fn transcript_stream_commits_on_end_without_classification() {
    let state = RouterState::new(Intent::Ideate);
    let (state, _) = step(state, RouterEvent::Chunk("Three angles:\n1. Speed".into()));
    let (state, effects) = step(state, RouterEvent::StreamEnd);
    assert_eq!(state, RouterState::Resolved { target: RouteTarget::Transcript });
    assert_eq!(
        effects,
        vec![
            RouterEffect::CommitTranscript {
                content: "Three angles:\n1. Speed".into(),
                intent: Some(Intent::Ideate),
                follow_up: false,
            },
            RouterEffect::MessageComplete {
                content: "Three angles:\n1. Speed".into(),
                intent: Some(Intent::Ideate),
            },
        ]
    );
}

#[test]
fn panel_stream_requests_classification_on_end() {
    let state = RouterState::new(Intent::Draft);
    let (state, _) = step(state, RouterEvent::Chunk("Shipping day! 🚀".into()));
    let (state, effects) = step(state, RouterEvent::StreamEnd);
    assert!(matches!(state, RouterState::Classifying { intent: Intent::Draft, .. }));
    assert_eq!(
        effects,
        vec![RouterEffect::RequestClassification { content: "Shipping day! 🚀".into() }]
    );
}

#[test]
fn classified_draft_commits_to_the_panel() {
    let state = RouterState::Classifying { intent: Intent::Draft, text: "Launch post".into() };
    let (state, effects) = step(state, RouterEvent::Classified(ResponseKind::Draft));
    assert_eq!(state, RouterState::Resolved { target: RouteTarget::DraftPanel });
    assert_eq!(
        effects,
        vec![
            RouterEffect::CommitDraft { content: "Launch post".into(), intent: Intent::Draft },
            RouterEffect::MessageComplete { content: "Launch post".into(), intent: Some(Intent::Draft) },
        ]
    );
}

#[test]
fn classified_question_rolls_back_to_the_transcript() {
    let state = RouterState::Classifying {
        intent: Intent::Draft,
        text: "What tone do you want, playful or formal?".into(),
    };
    let (state, effects) = step(state, RouterEvent::Classified(ResponseKind::Question));
    assert_eq!(state, RouterState::Resolved { target: RouteTarget::Transcript });
    assert_eq!(effects[0], RouterEffect::ClearPanel);
    assert_eq!(
        effects[1],
        RouterEffect::CommitTranscript {
            content: "What tone do you want, playful or formal?".into(),
            intent: None,
            follow_up: true,
        }
    );
    assert_eq!(
        effects[2],
        RouterEffect::MessageComplete {
            content: "What tone do you want, playful or formal?".into(),
            intent: None,
        }
    );
}

#[test]
fn stream_error_clears_panel_and_never_completes() {
    let state = RouterState::new(Intent::Draft);
    let (state, _) = step(state, RouterEvent::Chunk("partial".into()));
    let (state, effects) = step(state, RouterEvent::StreamError("connection reset".into()));
    assert_eq!(state, RouterState::Failed);
    assert_eq!(
        effects,
        vec![
            RouterEffect::ClearPanel,
            RouterEffect::SurfaceError { message: "connection reset".into() },
        ]
    );
    assert!(!effects.iter().any(|e| matches!(e, RouterEffect::MessageComplete { .. })));
}

#[test]
fn stream_error_on_transcript_route_skips_panel_clear() {
    let state = RouterState::new(Intent::General);
    let (state, _) = step(state, RouterEvent::Chunk("so".into()));
    let (_, effects) = step(state, RouterEvent::StreamError("timeout".into()));
    assert_eq!(effects, vec![RouterEffect::SurfaceError { message: "timeout".into() }]);
}

#[test]
fn out_of_order_events_are_no_ops() {
    let resolved = RouterState::Resolved { target: RouteTarget::Transcript };
    let (state, effects) = step(resolved.clone(), RouterEvent::Chunk("late".into()));
    assert_eq!(state, resolved);
    assert!(effects.is_empty());

    let (state, effects) = step(resolved.clone(), RouterEvent::StreamEnd);
    assert_eq!(state, resolved);
    assert!(effects.is_empty());

    // A verdict with no pending classification is dropped.
    let idle = RouterState::new(Intent::Draft);
    let (state, effects) = step(idle.clone(), RouterEvent::Classified(ResponseKind::Draft));
    assert_eq!(state, idle);
    assert!(effects.is_empty());
}

#[test]
fn empty_stream_on_panel_route_still_classifies() {
    let state = RouterState::new(Intent::Edit);
    let (state, effects) = step(state, RouterEvent::StreamEnd);
    assert!(matches!(state, RouterState::Classifying { .. }));
    assert_eq!(effects, vec![RouterEffect::RequestClassification { content: String::new() }]);
}

// ===== CLEANUP =====

#[test]
fn clean_response_truncates_at_end_of_file_marker() {
    let raw = "Great post body here.\n\n[END OF FILE]\nphantom continuation";
    assert_eq!(clean_response(raw), "Great post body here.");
}

#[test]
fn clean_response_truncates_at_conversation_history_echo() {
    let raw = "Launch announcement 🚀\n\nConversation history:\nuser: write me a post";
    assert_eq!(clean_response(raw), "Launch announcement 🚀");
}

#[test]
fn clean_response_ignores_markers_inside_a_line() {
    let raw = "We reached the end of file handling epic today!";
    assert_eq!(clean_response(raw), raw);
}

#[test]
fn clean_response_collapses_excess_blank_lines_and_trims() {
    let raw = "\n\nFirst paragraph.\n\n\n\nSecond paragraph.\n\n";
    assert_eq!(clean_response(raw), "First paragraph.\n\nSecond paragraph.");
}

#[test]
fn clean_response_is_idempotent() {
    let raw = "Body text.\n\n\nend of file\ntail";
    let once = clean_response(raw);
    assert_eq!(clean_response(&once), once);
}

// ===== DRIVER =====

struct FixedVerdict(ResponseKind);

#[async_trait]
impl Classify for FixedVerdict {
    async fn classify(&self, _content: &str, _intent: Intent) -> Result<ResponseKind, ClassifyError> {
        Ok(self.0)
    }
}

struct FailingClassifier;

#[async_trait]
impl Classify for FailingClassifier {
    async fn classify(&self, _content: &str, _intent: Intent) -> Result<ResponseKind, ClassifyError> {
        Err(ClassifyError::Verdict("garbage".into()))
    }
}

#[derive(Default)]
struct RecordingSink {
    effects: Vec<RouterEffect>,
}

#[async_trait]
impl StreamSink for RecordingSink {
    async fn apply(&mut self, effect: RouterEffect) {
        self.effects.push(effect);
    }
}

fn token_stream(chunks: Vec<Result<String, LlmError>>) -> TokenStream {
    Box::pin(stream::iter(chunks))
}

fn without_placeholders(effects: &[RouterEffect]) -> Vec<RouterEffect> {
    effects
        .iter()
        .filter(|e| !matches!(e, RouterEffect::AdvancePlaceholder { .. }))
        .cloned()
        .collect()
}

#[tokio::test(start_paused = true)]
async fn driver_commits_confirmed_draft() {
    let tokens = token_stream(vec![Ok("Big ".into()), Ok("news today!".into())]);
    let mut sink = RecordingSink::default();
    let outcome = run_stream(tokens, Intent::Draft, &FixedVerdict(ResponseKind::Draft), &mut sink).await;

    assert_eq!(outcome.final_text, "Big news today!");
    assert_eq!(outcome.resolution, Some(Resolution::Draft));
    let effects = without_placeholders(&sink.effects);
    assert_eq!(
        effects,
        vec![
            RouterEffect::ForwardToPanel { content: "Big ".into(), intent: Intent::Draft },
            RouterEffect::ForwardToPanel { content: "Big news today!".into(), intent: Intent::Draft },
            RouterEffect::CommitDraft { content: "Big news today!".into(), intent: Intent::Draft },
            RouterEffect::MessageComplete { content: "Big news today!".into(), intent: Some(Intent::Draft) },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn driver_rolls_back_a_clarifying_question() {
    let tokens = token_stream(vec![Ok("Which launch do you mean?".into())]);
    let mut sink = RecordingSink::default();
    let outcome =
        run_stream(tokens, Intent::Draft, &FixedVerdict(ResponseKind::Question), &mut sink).await;

    assert_eq!(outcome.resolution, Some(Resolution::Chat { follow_up: true }));
    let effects = without_placeholders(&sink.effects);
    assert!(effects.contains(&RouterEffect::ClearPanel));
    assert!(effects.contains(&RouterEffect::CommitTranscript {
        content: "Which launch do you mean?".into(),
        intent: None,
        follow_up: true,
    }));
}

#[tokio::test(start_paused = true)]
async fn driver_skips_classification_for_transcript_intents() {
    let tokens = token_stream(vec![Ok("1. Lead with the metric".into())]);
    let mut sink = RecordingSink::default();
    // A classifier that would fail loudly if ever consulted.
    let outcome = run_stream(tokens, Intent::Ideate, &FailingClassifier, &mut sink).await;

    assert_eq!(outcome.resolution, Some(Resolution::Chat { follow_up: false }));
    assert!(sink.effects.iter().all(|e| !matches!(e, RouterEffect::AdvancePlaceholder { .. })));
}

#[tokio::test(start_paused = true)]
async fn driver_falls_back_to_draft_on_classifier_failure() {
    let tokens = token_stream(vec![Ok("Ship it 🚀".into())]);
    let mut sink = RecordingSink::default();
    let outcome = run_stream(tokens, Intent::Draft, &FailingClassifier, &mut sink).await;

    assert_eq!(outcome.resolution, Some(Resolution::Draft));
    assert!(sink.effects.contains(&RouterEffect::CommitDraft {
        content: "Ship it 🚀".into(),
        intent: Intent::Draft,
    }));
}

#[tokio::test(start_paused = true)]
async fn driver_surfaces_mid_stream_failure() {
    let tokens = token_stream(vec![
        Ok("partial dra".into()),
        Err(LlmError::Stream("connection reset".into())),
    ]);
    let mut sink = RecordingSink::default();
    let outcome = run_stream(tokens, Intent::Draft, &FixedVerdict(ResponseKind::Draft), &mut sink).await;

    assert_eq!(outcome.resolution, None);
    assert!(outcome.final_text.is_empty());
    let effects = without_placeholders(&sink.effects);
    assert!(effects.contains(&RouterEffect::ClearPanel));
    assert!(effects.iter().any(|e| matches!(e, RouterEffect::SurfaceError { .. })));
    assert!(!effects.iter().any(|e| matches!(e, RouterEffect::MessageComplete { .. })));
}

#[tokio::test(start_paused = true)]
async fn driver_rotates_placeholder_while_panel_streams() {
    // Hold the stream open long enough for two placeholder ticks.
    let tokens: TokenStream = Box::pin(
        stream::iter(vec![Ok::<_, LlmError>("chunk".to_string())]).chain(
            stream::once(async {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                Ok("tail".to_string())
            }),
        ),
    );
    let mut sink = RecordingSink::default();
    run_stream(tokens, Intent::Draft, &FixedVerdict(ResponseKind::Draft), &mut sink).await;

    let phrases: Vec<&str> = sink
        .effects
        .iter()
        .filter_map(|e| match e {
            RouterEffect::AdvancePlaceholder { phrase } => Some(phrase.as_str()),
            _ => None,
        })
        .collect();
    assert!(phrases.len() >= 2, "expected at least two placeholder rotations, got {}", phrases.len());
    // Sequential rotation: consecutive phrases differ.
    assert_ne!(phrases[0], phrases[1]);
}
