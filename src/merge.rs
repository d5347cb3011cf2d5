//! Reassembly of the translated document
//!
//! Output follows new-document chunk order exactly. Each translatable chunk
//! keeps its structural prefix and suffix (`## `, `- `, trailing blank lines)
//! and only the text between them is replaced.

use serde::Serialize;

use crate::chunk::{Chunk, ChunkPath, ChunkedDocument};
use crate::chunker::opens_block;
use crate::fingerprint::normalize_content;

/// How a chunk's output text was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Translation taken from memory.
    Reused(String),
    /// Translation produced in this run.
    Fresh(String),
    /// Non-translatable chunk, emitted as is.
    Verbatim,
    /// No translation available; the source text is emitted.
    Fallback,
}

impl Resolution {
    pub fn translation(&self) -> Option<&str> {
        match self {
            Resolution::Reused(text) | Resolution::Fresh(text) => Some(text),
            Resolution::Verbatim | Resolution::Fallback => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DocumentStatus {
    FullyTranslated,
    PartiallyTranslated { fallback_paths: Vec<ChunkPath> },
}

impl DocumentStatus {
    pub fn is_partial(&self) -> bool {
        matches!(self, DocumentStatus::PartiallyTranslated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDocument {
    pub text: String,
    pub status: DocumentStatus,
}

/// Rebuild `document` with one resolution per chunk. A translatable chunk with
/// no usable resolution falls back to its source text.
pub fn merge_document(document: &ChunkedDocument, resolutions: &[Resolution]) -> MergedDocument {
    let mut text = String::with_capacity(document.iter().map(|c| c.raw_span.len()).sum());
    let mut fallback_paths = Vec::new();

    for (index, chunk) in document.iter().enumerate() {
        let translation = resolutions.get(index).and_then(Resolution::translation);
        match translation {
            Some(translated) if chunk.is_translatable() => {
                text.push_str(chunk.prefix());
                text.push_str(&sanitize(chunk, translated));
                text.push_str(chunk.suffix());
            }
            _ => {
                if chunk.is_translatable() {
                    fallback_paths.push(chunk.path.clone());
                }
                text.push_str(&chunk.raw_span);
            }
        }
    }

    let status = if fallback_paths.is_empty() {
        DocumentStatus::FullyTranslated
    } else {
        DocumentStatus::PartiallyTranslated { fallback_paths }
    };
    MergedDocument { text, status }
}

/// Fit a translation into the chunk's slot. Whitespace is collapsed outside
/// protected spans, lines after a hard break take the indentation of the
/// chunk's first text line, and a line that would be read as block markup is
/// escaped unless the source text opened the same way.
fn sanitize(chunk: &Chunk, translated: &str) -> String {
    let normalized = normalize_content(translated);
    let source_opens_block = opens_block(&chunk.content);
    let prefix = chunk.prefix();
    let indent = " ".repeat(prefix[prefix.rfind('\n').map_or(0, |i| i + 1)..].chars().count());

    let mut text = String::with_capacity(normalized.len());
    for (index, line) in normalized.split('\n').enumerate() {
        if index > 0 {
            text.push('\n');
            text.push_str(&indent);
        }
        if opens_block(line) && !(index == 0 && source_opens_block) {
            text.push('\\');
        }
        text.push_str(line);
    }
    text
}
