//! Context assembly for chunks that need a new translation
//!
//! A request carries the new content and, for MODIFIED chunks, the old source
//! text with its stored translation so the provider can edit the previous
//! phrasing instead of starting over. A bounded window of neighbouring chunks
//! that already have a translation is attached as terminology context only.

use tracing::debug;

use crate::chunk::{ChunkKind, ChunkPath, ChunkedDocument};
use crate::diff::{AlignmentRecord, AlignmentStatus};
use crate::memory::TranslationMemory;
use crate::mt::spans::extract_inline_spans;

/// A source text together with its translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPair {
    pub source: String,
    pub translation: String,
}

/// Payload handed to a [`MachineTranslator`](crate::mt::MachineTranslator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub path: ChunkPath,
    pub kind: ChunkKind,
    pub source_locale: String,
    pub target_locale: String,
    /// Normalized content of the new chunk. The only text to translate.
    pub content: String,
    /// Old source text and its stored translation, for MODIFIED chunks.
    pub previous: Option<TranslatedPair>,
    /// Resolved neighbours before the chunk, nearest last.
    pub context_before: Vec<TranslatedPair>,
    /// Resolved neighbours after the chunk, nearest first.
    pub context_after: Vec<TranslatedPair>,
    /// Inline spans that must be reproduced exactly, in order of appearance.
    pub preserve_spans: Vec<String>,
    /// Set on the retry after a failed integrity check.
    pub strict: bool,
}

impl TranslationRequest {
    pub fn is_edit(&self) -> bool {
        self.previous.is_some()
    }
}

/// Builds translation requests for one document revision
pub struct ContextAssembler<'a> {
    old: Option<&'a ChunkedDocument>,
    new: &'a ChunkedDocument,
    memory: &'a TranslationMemory,
    /// Known translation per new chunk index, if any.
    resolved: &'a [Option<String>],
    window: usize,
    source_locale: &'a str,
    target_locale: &'a str,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(
        old: Option<&'a ChunkedDocument>,
        new: &'a ChunkedDocument,
        memory: &'a TranslationMemory,
        resolved: &'a [Option<String>],
    ) -> Self {
        ContextAssembler {
            old,
            new,
            memory,
            resolved,
            window: 0,
            source_locale: "en",
            target_locale: "",
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_locales(mut self, source_locale: &'a str, target_locale: &'a str) -> Self {
        self.source_locale = source_locale;
        self.target_locale = target_locale;
        self
    }

    /// Request for the chunk of `record`, or `None` when the chunk is not
    /// translatable.
    pub fn assemble(&self, record: &AlignmentRecord) -> Option<TranslationRequest> {
        let chunk = self.new.chunks.get(record.new_index)?;
        if !chunk.is_translatable() {
            return None;
        }

        let previous = match record.status {
            AlignmentStatus::Modified { old_index } => self.previous_translation(old_index),
            _ => None,
        };

        let mut preserve_spans: Vec<String> = Vec::new();
        for span in extract_inline_spans(&chunk.content) {
            if !preserve_spans.contains(&span.text) {
                preserve_spans.push(span.text);
            }
        }

        let (context_before, context_after) = self.neighbours(record.new_index);
        debug!(
            path = %chunk.path,
            edit = previous.is_some(),
            context = context_before.len() + context_after.len(),
            "Assembled translation request"
        );

        Some(TranslationRequest {
            path: chunk.path.clone(),
            kind: chunk.kind,
            source_locale: self.source_locale.to_string(),
            target_locale: self.target_locale.to_string(),
            content: chunk.content.clone(),
            previous,
            context_before,
            context_after,
            preserve_spans,
            strict: false,
        })
    }

    fn previous_translation(&self, old_index: usize) -> Option<TranslatedPair> {
        let old_chunk = self.old?.chunks.get(old_index)?;
        if !old_chunk.is_translatable() {
            return None;
        }
        let entry = self.memory.lookup(old_chunk.fingerprint(), self.target_locale)?;
        Some(TranslatedPair {
            source: old_chunk.content.clone(),
            translation: entry.translated_text,
        })
    }

    fn neighbours(&self, index: usize) -> (Vec<TranslatedPair>, Vec<TranslatedPair>) {
        if self.window == 0 {
            return (Vec::new(), Vec::new());
        }

        let mut before: Vec<TranslatedPair> = (0..index)
            .rev()
            .filter_map(|i| self.resolved_pair(i))
            .take(self.window)
            .collect();
        before.reverse();

        let after = (index + 1..self.new.len())
            .filter_map(|i| self.resolved_pair(i))
            .take(self.window)
            .collect();

        (before, after)
    }

    fn resolved_pair(&self, index: usize) -> Option<TranslatedPair> {
        let chunk = &self.new.chunks[index];
        if !chunk.is_translatable() {
            return None;
        }
        let translation = self.resolved.get(index)?.as_ref()?;
        Some(TranslatedPair {
            source: chunk.content.clone(),
            translation: translation.clone(),
        })
    }
}
