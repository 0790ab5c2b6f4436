//! Range edits — scope an edit instruction to a selected span of a draft.
//!
//! DESIGN
//! ======
//! The panel sends the selected text verbatim plus a free-form instruction.
//! This module only shapes the request and computes a `[start, end)` char
//! span for transient highlight rendering; the generated response re-enters
//! the pipeline exactly like a whole-draft edit. A selection that no longer
//! matches the content (stale panel state) degrades gracefully: no highlight,
//! but the request is still issued with the raw selected text.

use serde::{Deserialize, Serialize};

/// A scoped edit request handed to the generation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEditRequest {
    pub instruction: String,
    pub selected_text: String,
}

/// Character offsets of the selection within the full content, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// Build a scoped edit request and locate the selection's highlight span.
///
/// The span covers the first verbatim occurrence of `selected_text` in
/// `content`, measured in characters (not bytes). `None` when the selection
/// is empty or absent from the content.
#[must_use]
pub fn build(content: &str, selected_text: &str, instruction: &str) -> (RangeEditRequest, Option<HighlightSpan>) {
    let request = RangeEditRequest { instruction: instruction.to_string(), selected_text: selected_text.to_string() };

    if selected_text.is_empty() {
        return (request, None);
    }

    let span = content.find(selected_text).map(|byte_start| {
        let start = content[..byte_start].chars().count();
        let end = start + selected_text.chars().count();
        HighlightSpan { start, end }
    });

    (request, span)
}

#[cfg(test)]
#[path = "range_edit_test.rs"]
mod tests;
