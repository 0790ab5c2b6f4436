//! Edit-response parsing — split generator output into content + change list.
//!
//! DESIGN
//! ======
//! The generator is asked to format an edit response as a content section
//! followed by a changes section, each under a recognizable header — but the
//! format is not contractually guaranteed. This is a best-effort parser with
//! an explicit fallback chain, not a strict grammar:
//!
//! 1. line scan with a section cursor, switching on full-line header matches;
//! 2. no headers → a single trailing split on a looser blank-line + changes
//!    header pattern;
//! 3. that too fails → the entire response is content, no changes.
//!
//! Pure, total (never panics on arbitrary input), and idempotent on
//! already-extracted content.

use std::sync::LazyLock;

use regex::Regex;

/// Result of splitting an edit response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEdit {
    pub content: String,
    pub changes: Option<Vec<String>>,
}

// =============================================================================
// HEADER PATTERNS
// =============================================================================

// Full-line matches only: anchoring both ends keeps body prose like
// "New version drops today" from being mistaken for a header.
static CONTENT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:\d+[.)]\s*|#{1,6}\s*|\*\*\s*)?(?:here(?:'|’)s\s+(?:the\s+|your\s+)?|here\s+is\s+(?:the\s+|your\s+)?)?(?:revised|updated|edited|new|final)\s+(?:post|draft|version|content)\s*:?\s*\*{0,2}\s*$",
    )
    .expect("static regex")
});

static CHANGES_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:\d+[.)]\s*|#{1,6}\s*|\*\*\s*)?(?:changes(?:\s+(?:made|i\s+made))?|improvements(?:\s+made)?|key\s+changes|what\s+(?:i\s+)?changed|summary\s+of\s+changes|edits(?:\s+made)?)\s*:?\s*\*{0,2}\s*$",
    )
    .expect("static regex")
});

// Looser: a changes-style header anywhere after a blank line, used only by
// the trailing-split fallback.
static TRAILING_CHANGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\n\s*\n\s*(?:\*\*|#{1,6}\s*)?(?:changes|improvements|key\s+changes|what\s+changed|edits)\b[^\n]*\n")
        .expect("static regex")
});

// Residual header fragment leaked into the start of content by a malformed
// response (e.g. "Revised post: Hello" on one line).
static LEADING_HEADER_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\d+[.)]\s*)?(?:here(?:'|’)s\s+(?:the\s+|your\s+)?)?(?:revised|updated|edited|final)\s+(?:post|draft|version)\s*:\s*")
        .expect("static regex")
});

static BULLET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]\s+|\d+[.)]\s+)").expect("static regex"));

// =============================================================================
// PARSE
// =============================================================================

#[derive(PartialEq)]
enum Section {
    None,
    Content,
    Changes,
}

/// Split a raw edit response into clean content and change bullets.
#[must_use]
pub fn parse(raw: &str) -> ParsedEdit {
    let mut section = Section::None;
    let mut before_header: Vec<&str> = Vec::new();
    let mut content_lines: Vec<&str> = Vec::new();
    let mut changes: Vec<String> = Vec::new();
    let mut saw_content_header = false;
    let mut saw_changes_header = false;

    for line in raw.lines() {
        if section != Section::Content && CONTENT_HEADER.is_match(line) {
            section = Section::Content;
            saw_content_header = true;
            continue;
        }
        if section != Section::Changes && CHANGES_HEADER.is_match(line) {
            section = Section::Changes;
            saw_changes_header = true;
            continue;
        }
        match section {
            Section::None => before_header.push(line),
            // Preserve original whitespace inside the content section.
            Section::Content => content_lines.push(line),
            Section::Changes => {
                if !line.trim().is_empty() {
                    changes.push(strip_bullet(line));
                }
            }
        }
    }

    if saw_content_header || saw_changes_header {
        // Headers were found; content is either the headed section or, when
        // only a changes header appeared, everything before it.
        let body = if saw_content_header { content_lines } else { before_header };
        return finish(&body.join("\n"), changes);
    }

    if let Some(m) = TRAILING_CHANGES.find_iter(raw).last() {
        let content = &raw[..m.start()];
        let tail_changes: Vec<String> = raw[m.end()..]
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(strip_bullet)
            .collect();
        return finish(content, tail_changes);
    }

    finish(raw, Vec::new())
}

fn finish(content: &str, changes: Vec<String>) -> ParsedEdit {
    let content = LEADING_HEADER_FRAGMENT.replace(content.trim_matches('\n'), "");
    ParsedEdit {
        content: content.trim_matches('\n').to_string(),
        changes: if changes.is_empty() { None } else { Some(changes) },
    }
}

fn strip_bullet(line: impl AsRef<str>) -> String {
    let line = line.as_ref();
    BULLET_MARKER.replace(line, "").trim().to_string()
}

#[cfg(test)]
#[path = "edit_parse_test.rs"]
mod tests;
