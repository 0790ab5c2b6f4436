//! Persistence service — fire-and-forget durable writes.
//!
//! DESIGN
//! ======
//! The in-memory conversation is the source of truth for a session; Postgres
//! rows exist for history across restarts. Writes happen on spawned tasks
//! after reconciliation so the websocket path never blocks on I/O.
//!
//! ERROR HANDLING
//! ==============
//! Write failures are logged at warn and dropped. A missed row never affects
//! in-memory correctness.

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::services::chat::ChatMessage;
use crate::services::draft::Draft;

/// Persist a transcript message row.
pub async fn persist_message(
    pool: &PgPool,
    conversation_id: Uuid,
    message: &ChatMessage,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO chat_messages
           (id, conversation_id, role, content, raw_content, intent, draft_content, is_follow_up_question, ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(message.id)
    .bind(conversation_id)
    .bind(&message.role)
    .bind(&message.content)
    .bind(&message.raw_content)
    .bind(message.intent.map(crate::services::chat::Intent::as_str))
    .bind(&message.draft_content)
    .bind(message.is_follow_up_question)
    .bind(message.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist the current version of a draft.
pub async fn persist_draft_version(
    pool: &PgPool,
    conversation_id: Uuid,
    draft: &Draft,
) -> Result<(), sqlx::Error> {
    let Some(version) = draft.version(draft.current_version) else {
        return Ok(());
    };
    sqlx::query(
        "INSERT INTO draft_versions
           (id, conversation_id, source_message_id, version, content, instruction, changes, ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (source_message_id, version) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(draft.source_message_id)
    .bind(i64::from(version.version))
    .bind(&version.content)
    .bind(&version.instruction)
    .bind(version.changes.as_ref().map(|c| serde_json::json!(c)))
    .bind(version.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub fn spawn_persist_message(pool: &PgPool, conversation_id: Uuid, message: &ChatMessage) {
    let pool = pool.clone();
    let message = message.clone();
    tokio::spawn(async move {
        if let Err(e) = persist_message(&pool, conversation_id, &message).await {
            warn!(error = %e, message_id = %message.id, "persist message failed");
        }
    });
}

pub fn spawn_persist_draft_version(pool: &PgPool, conversation_id: Uuid, draft: &Draft) {
    let pool = pool.clone();
    let draft = draft.clone();
    tokio::spawn(async move {
        if let Err(e) = persist_draft_version(&pool, conversation_id, &draft).await {
            warn!(
                error = %e,
                source_message_id = %draft.source_message_id,
                version = draft.current_version,
                "persist draft version failed"
            );
        }
    });
}
