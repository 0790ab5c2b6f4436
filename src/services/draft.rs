//! Draft service — versioned post drafts with append-only history.
//!
//! DESIGN
//! ======
//! A `Draft` owns its full version history in memory: an arena of
//! `DraftVersion` values plus a current-version pointer. Operations are
//! immutable — they return an updated `Draft` value rather than mutating in
//! place, so callers choose their own update propagation. Revert is a pointer
//! move; later versions are never deleted.
//!
//! A fresh draft-classified response always creates a new `Draft`. Only a
//! confirmed edit (whole-draft or range-scoped) appends a version.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("draft content must not be empty")]
    EmptyContent,
}

impl crate::frame::ErrorCode for DraftError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyContent => "E_EMPTY_DRAFT",
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// One immutable point in a draft's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftVersion {
    /// Unique within the draft; starts at 1, +1 per edit.
    pub version: u32,
    pub content: String,
    /// Milliseconds since Unix epoch.
    pub created_at: i64,
    /// Human-readable change bullets extracted from the edit response.
    pub changes: Option<Vec<String>>,
    /// The edit instruction that produced this version.
    pub instruction: Option<String>,
    /// Id assigned by the persistence layer, if it has stored this version.
    pub remote_id: Option<Uuid>,
}

/// A versioned unit of publishable content tied to one assistant message.
///
/// Invariant: `current_version` equals the highest version present in
/// `versions`, unless a revert moved the pointer back — `content` always
/// equals the pointed-at version's content either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    /// The assistant message that spawned this draft. 1:1.
    pub source_message_id: Uuid,
    pub content: String,
    pub current_version: u32,
    pub created_at: i64,
    pub title: Option<String>,
    pub remote_id: Option<Uuid>,
    pub versions: Vec<DraftVersion>,
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl Draft {
    /// Build a draft with a single version 1, created atomically.
    ///
    /// # Errors
    ///
    /// Fails only on empty content — callers must not invoke with empty text.
    pub fn new(source_message_id: Uuid, content: impl Into<String>, ts: i64) -> Result<Self, DraftError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(DraftError::EmptyContent);
        }
        let first = DraftVersion {
            version: 1,
            content: content.clone(),
            created_at: ts,
            changes: None,
            instruction: None,
            remote_id: None,
        };
        Ok(Self {
            source_message_id,
            content,
            current_version: 1,
            created_at: ts,
            title: None,
            remote_id: None,
            versions: vec![first],
        })
    }

    /// Append a new version and make it current.
    #[must_use]
    pub fn create_version(
        &self,
        content: impl Into<String>,
        instruction: Option<&str>,
        changes: Option<Vec<String>>,
        ts: i64,
    ) -> Self {
        let content = content.into();
        let next = self.max_version() + 1;
        let mut updated = self.clone();
        updated.versions.push(DraftVersion {
            version: next,
            content: content.clone(),
            created_at: ts,
            changes,
            instruction: instruction.map(str::to_string),
            remote_id: None,
        });
        updated.current_version = next;
        updated.content = content;
        updated
    }

    /// Look up a version by number.
    #[must_use]
    pub fn version(&self, number: u32) -> Option<&DraftVersion> {
        self.versions.iter().find(|v| v.version == number)
    }

    /// Move the current pointer to an earlier version. History is append-only:
    /// later versions survive the revert. An unknown target is a no-op.
    #[must_use]
    pub fn revert_to(&self, number: u32) -> Self {
        let Some(target) = self.version(number) else {
            return self.clone();
        };
        let mut updated = self.clone();
        updated.current_version = target.version;
        updated.content = target.content.clone();
        updated
    }

    /// Highest version number present. Versions are created contiguously, so
    /// this is also the length, but the pointer may sit below it after revert.
    #[must_use]
    pub fn max_version(&self) -> u32 {
        self.versions.iter().map(|v| v.version).max().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "draft_test.rs"]
mod tests;
