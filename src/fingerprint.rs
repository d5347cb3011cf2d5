//! Content fingerprints
//!
//! A fingerprint is the SHA-256 digest of a chunk's kind and normalized
//! content. It ignores the chunk's position, so identical content in two places
//! shares one translation memory entry.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chunk::ChunkKind;
use crate::mt::spans::extract_inline_spans;

/// Canonical hard line break: a backslash ending the line.
pub const HARD_BREAK: &str = "\\\n";

static HARD_BREAK_FORMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?: {2,}|\\)\r?\n").expect("hard break pattern is valid")
});
static SPAN_LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\r?\n[ \t]*").expect("line break pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest `(kind, content)`. Callers pass already-normalized content for
    /// translatable kinds and raw bytes for verbatim kinds.
    pub fn of(kind: ChunkKind, content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.tag().as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Fingerprint(value.to_string())
    }
}

/// Collapse whitespace runs in running text to a single space and trim.
///
/// Protected inline spans keep their bytes, except that a line break inside a
/// span (a code span wrapped across lines) becomes one space. Hard line breaks
/// (`\` or two trailing spaces before a newline) survive in the canonical
/// backslash form.
pub fn normalize_content(text: &str) -> String {
    let text = HARD_BREAK_FORMS.replace_all(text, HARD_BREAK);
    let mut normalized = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut cursor = 0;

    for span in extract_inline_spans(&text) {
        push_collapsed(&mut normalized, &text[cursor..span.range.start], &mut pending_space);
        if span.text == HARD_BREAK {
            if !normalized.is_empty() && !normalized.ends_with('\n') {
                normalized.push_str(HARD_BREAK);
            }
        } else {
            if pending_space && continues_line(&normalized) {
                normalized.push(' ');
            }
            normalized.push_str(&SPAN_LINE_BREAK.replace_all(&span.text, " "));
        }
        pending_space = false;
        cursor = span.range.end;
    }
    push_collapsed(&mut normalized, &text[cursor..], &mut pending_space);

    while normalized.ends_with(HARD_BREAK) {
        normalized.truncate(normalized.len() - HARD_BREAK.len());
    }
    normalized
}

fn push_collapsed(out: &mut String, segment: &str, pending_space: &mut bool) {
    for c in segment.chars() {
        if c.is_whitespace() {
            *pending_space = true;
            continue;
        }
        if *pending_space && continues_line(out) {
            out.push(' ');
        }
        *pending_space = false;
        out.push(c);
    }
}

fn continues_line(out: &str) -> bool {
    !out.is_empty() && !out.ends_with('\n')
}
