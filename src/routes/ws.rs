//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Outbound frames from in-flight generations → forward to client
//!
//! Generation syscalls (`chat:send`, `chat:range_edit`) run on a spawned task
//! so the socket loop never stalls while tokens stream; the task serializes
//! router effects into item frames on the per-connection channel and ends the
//! exchange with a done or error frame. Draft syscalls are handled inline.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`
//! 2. Client sends frames → dispatch → item* → done | error
//! 3. Close → drop the channel, in-flight sends finish into the void

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame, FRAME_CONTENT, FRAME_INTENT, Status};
use crate::services::chat::{self, Intent};
use crate::services::router::{RouterEffect, StreamSink};
use crate::state::AppState;

const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel; spawned generation tasks write here.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(OUTBOUND_CHANNEL_CAPACITY);

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let frames = process_inbound_text(&state, client_id, &client_tx, &text).await;
                        for frame in frames {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                return;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Separated from the socket loop so tests can exercise dispatch without a
/// live WebSocket.
async fn process_inbound_text(
    state: &AppState,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    text: &str,
) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    info!(%client_id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");

    match req.prefix() {
        "chat" => handle_chat(state, client_tx, req).await,
        "draft" => handle_draft(state, &req).await,
        prefix => vec![req.error(format!("unknown prefix: {prefix}"))],
    }
}

// =============================================================================
// CHAT HANDLERS
// =============================================================================

async fn handle_chat(state: &AppState, client_tx: &mpsc::Sender<Frame>, req: Frame) -> Vec<Frame> {
    let conversation_id = req.conversation_id.unwrap_or_else(Uuid::new_v4);
    let op = req.op().to_string();
    match op.as_str() {
        "send" => {
            let Some(content) = frame_str(&req, FRAME_CONTENT) else {
                return vec![req.error("content required")];
            };
            let intent = Intent::parse(frame_str(&req, FRAME_INTENT).as_deref().unwrap_or(""));

            let state = state.clone();
            let tx = client_tx.clone();
            tokio::spawn(async move {
                let mut sink = FrameSink { req: req.clone().with_conversation_id(conversation_id), tx: tx.clone() };
                let result = chat::send_message(&state, conversation_id, &content, intent, &mut sink).await;
                finish_generation(&tx, &sink.req, result.map(|o| (o, None))).await;
            });
            vec![]
        }
        "range_edit" => {
            let Some(instruction) = frame_str(&req, "instruction") else {
                return vec![req.error("instruction required")];
            };
            let selected_text = frame_str(&req, "selected_text").unwrap_or_default();

            let state = state.clone();
            let tx = client_tx.clone();
            tokio::spawn(async move {
                let mut sink = FrameSink { req: req.clone().with_conversation_id(conversation_id), tx: tx.clone() };
                let result =
                    chat::send_range_edit(&state, conversation_id, &selected_text, &instruction, &mut sink).await;
                finish_generation(&tx, &sink.req, result).await;
            });
            vec![]
        }
        op => vec![req.error(format!("unknown chat op: {op}"))],
    }
}

/// Terminate a generation exchange with a done or structured error frame.
async fn finish_generation(
    tx: &mpsc::Sender<Frame>,
    req: &Frame,
    result: Result<(chat::SendOutcome, Option<crate::services::range_edit::HighlightSpan>), chat::ChatError>,
) {
    let frame = match result {
        Ok((outcome, span)) => {
            let mut data = Data::new();
            data.insert("message".into(), serde_json::to_value(&outcome.message).unwrap_or_default());
            if let Some(draft) = &outcome.draft {
                data.insert("draft".into(), serde_json::to_value(draft).unwrap_or_default());
            }
            if let Some(span) = span {
                data.insert("highlight".into(), serde_json::to_value(span).unwrap_or_default());
            }
            req.done_with(data)
        }
        Err(e) => req.error_from(&e),
    };
    if tx.send(frame).await.is_err() {
        // Client went away mid-generation; the session state is already updated.
    }
}

// =============================================================================
// DRAFT HANDLERS
// =============================================================================

async fn handle_draft(state: &AppState, req: &Frame) -> Vec<Frame> {
    let Some(conversation_id) = req.conversation_id else {
        return vec![req.error("conversation_id required")];
    };

    match req.op() {
        "versions" => {
            let conversations = state.conversations.read().await;
            let Some(draft) = conversations
                .get(&conversation_id)
                .and_then(|c| resolve_draft(c, req))
            else {
                return vec![req.error("no draft found")];
            };

            let mut data = Data::new();
            data.insert("source_message_id".into(), serde_json::json!(draft.source_message_id));
            data.insert("current_version".into(), serde_json::json!(draft.current_version));
            data.insert("versions".into(), serde_json::to_value(&draft.versions).unwrap_or_default());
            vec![req.done_with(data)]
        }
        "revert" => {
            let Some(version) = req
                .data
                .get("version")
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
            else {
                return vec![req.error("version required")];
            };

            let mut conversations = state.conversations.write().await;
            let Some(conversation) = conversations.get_mut(&conversation_id) else {
                return vec![req.error("no draft found")];
            };
            let Some(draft) = resolve_draft(conversation, req).cloned() else {
                return vec![req.error("no draft found")];
            };

            // Unknown targets are a silent no-op; the reply always reflects
            // the current state.
            let reverted = draft.revert_to(version);
            info!(
                %conversation_id,
                source_message_id = %reverted.source_message_id,
                requested = version,
                current = reverted.current_version,
                "ws: draft revert"
            );
            let source_id = reverted.source_message_id;
            conversation.drafts.insert(source_id, reverted.clone());
            conversation.active_draft = Some(source_id);

            let mut data = Data::new();
            data.insert("source_message_id".into(), serde_json::json!(source_id));
            data.insert("current_version".into(), serde_json::json!(reverted.current_version));
            data.insert(FRAME_CONTENT.into(), serde_json::json!(reverted.content));
            vec![req.done_with(data)]
        }
        op => vec![req.error(format!("unknown draft op: {op}"))],
    }
}

/// Draft addressed by `source_message_id`, falling back to the active draft.
fn resolve_draft<'a>(
    conversation: &'a chat::Conversation,
    req: &Frame,
) -> Option<&'a crate::services::draft::Draft> {
    match req
        .data
        .get("source_message_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Uuid>().ok())
    {
        Some(id) => conversation.drafts.get(&id),
        None => conversation.active_draft(),
    }
}

// =============================================================================
// STREAM SINK
// =============================================================================

/// Serializes router effects into item frames on the connection channel.
struct FrameSink {
    req: Frame,
    tx: mpsc::Sender<Frame>,
}

impl FrameSink {
    async fn send_item(&self, data: Data) {
        let frame = self.req.item(data);
        if self.tx.send(frame).await.is_err() {
            // Receiver dropped; nothing to do.
        }
    }
}

#[async_trait::async_trait]
impl StreamSink for FrameSink {
    async fn apply(&mut self, effect: RouterEffect) {
        let mut data = Data::new();
        match effect {
            RouterEffect::ForwardToPanel { content, intent } => {
                data.insert("event".into(), serde_json::json!("draft_stream"));
                data.insert(FRAME_CONTENT.into(), serde_json::json!(content));
                data.insert(FRAME_INTENT.into(), serde_json::json!(intent.as_str()));
            }
            RouterEffect::ForwardToTranscript { content } => {
                data.insert("event".into(), serde_json::json!("message_stream"));
                data.insert(FRAME_CONTENT.into(), serde_json::json!(content));
            }
            RouterEffect::AdvancePlaceholder { phrase } => {
                data.insert("event".into(), serde_json::json!("placeholder"));
                data.insert(FRAME_CONTENT.into(), serde_json::json!(phrase));
            }
            RouterEffect::ClearPanel => {
                // Rollback: an explicit empty panel payload.
                data.insert("event".into(), serde_json::json!("draft_stream"));
                data.insert(FRAME_CONTENT.into(), serde_json::json!(""));
            }
            RouterEffect::CommitDraft { content, intent } => {
                data.insert("event".into(), serde_json::json!("draft_complete"));
                data.insert(FRAME_CONTENT.into(), serde_json::json!(content));
                data.insert(FRAME_INTENT.into(), serde_json::json!(intent.as_str()));
            }
            RouterEffect::CommitTranscript { content, intent, follow_up } => {
                data.insert("event".into(), serde_json::json!("message"));
                data.insert(FRAME_CONTENT.into(), serde_json::json!(content));
                data.insert("follow_up".into(), serde_json::json!(follow_up));
                if let Some(intent) = intent {
                    data.insert(FRAME_INTENT.into(), serde_json::json!(intent.as_str()));
                }
            }
            RouterEffect::MessageComplete { content, intent } => {
                data.insert("event".into(), serde_json::json!("message_complete"));
                data.insert(FRAME_CONTENT.into(), serde_json::json!(content));
                if let Some(intent) = intent {
                    data.insert(FRAME_INTENT.into(), serde_json::json!(intent.as_str()));
                }
            }
            RouterEffect::SurfaceError { message } => {
                data.insert("event".into(), serde_json::json!("error_entry"));
                data.insert("message".into(), serde_json::json!(message));
            }
            RouterEffect::RequestClassification { .. } => return,
        }
        self.send_item(data).await;
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn frame_str(req: &Frame, key: &str) -> Option<String> {
    req.data
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        let message = frame
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
