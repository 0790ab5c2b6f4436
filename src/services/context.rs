//! Context supplier — audience analytics folded into generation prompts.
//!
//! The analytics service lives outside this process; the engine only needs a
//! narrow seam that yields free-text context blocks. `EnvContext` serves
//! deployments without the analytics backend by reading static blocks from
//! the environment. `NoContext` is for tests.

use uuid::Uuid;

/// Audience context for one user, all blocks optional free text.
#[derive(Debug, Clone, Default)]
pub struct RetrievalContext {
    pub summary: Option<String>,
    pub demographics: Option<String>,
    pub recent_posts: Option<String>,
    pub engagement_patterns: Option<String>,
}

impl RetrievalContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.demographics.is_none()
            && self.recent_posts.is_none()
            && self.engagement_patterns.is_none()
    }
}

#[async_trait::async_trait]
pub trait SupplyContext: Send + Sync {
    async fn supply(&self, conversation_id: Uuid) -> RetrievalContext;
}

/// Static context from `CONTEXT_*` env vars, shared across conversations.
pub struct EnvContext;

#[async_trait::async_trait]
impl SupplyContext for EnvContext {
    async fn supply(&self, _conversation_id: Uuid) -> RetrievalContext {
        RetrievalContext {
            summary: env_block("CONTEXT_SUMMARY"),
            demographics: env_block("CONTEXT_DEMOGRAPHICS"),
            recent_posts: env_block("CONTEXT_RECENT_POSTS"),
            engagement_patterns: env_block("CONTEXT_ENGAGEMENT_PATTERNS"),
        }
    }
}

fn env_block(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// No context at all.
pub struct NoContext;

#[async_trait::async_trait]
impl SupplyContext for NoContext {
    async fn supply(&self, _conversation_id: Uuid) -> RetrievalContext {
        RetrievalContext::default()
    }
}
