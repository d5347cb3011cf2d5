//! Error types for the revision pipeline
//!
//! Structural errors reject a document before any external call is made.
//! Translation errors are chunk-local: they are recorded on the outcome and the
//! chunk falls back to its source text.

use crate::chunk::ChunkPath;
use thiserror::Error;

/// A byte range of the source document together with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub snippet: String,
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {} (bytes {}..{}): {:?}",
            self.line, self.start, self.end, self.snippet
        )
    }
}

#[derive(Debug, Error)]
pub enum DeltaError {
    /// The document has unbalanced or unterminated structure.
    #[error("Structural parse error at {span}: {message}")]
    StructuralParse { span: SourceSpan, message: String },

    /// The translation dropped or altered protected inline spans, even after a strict retry.
    #[error("Translation of chunk {path} lost protected spans: {missing:?}")]
    TranslationIntegrity {
        path: ChunkPath,
        missing: Vec<String>,
    },

    /// The provider could not be reached after all retries.
    #[error("Translation unavailable for chunk {path} after {attempts} attempt(s): {reason}")]
    TranslationUnavailable {
        path: ChunkPath,
        attempts: u32,
        reason: String,
    },

    /// A machine translation tried to replace a human-confirmed entry.
    #[error("Refused to overwrite human-confirmed translation for {fingerprint} ({locale})")]
    MemoryWriteConflict { fingerprint: String, locale: String },

    #[error("Translation memory error: {0}")]
    Memory(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid locale '{locale}': {reason}")]
    InvalidLocale { locale: String, reason: String },

    #[error("No chunk at path {0} in document")]
    UnknownChunk(ChunkPath),

    #[error("Chunk at path {0} is not translatable")]
    NotTranslatable(ChunkPath),

    #[error("Revision run for '{0}' was cancelled")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeltaError {
    /// Whether the error only affects a single chunk of a document.
    pub fn is_chunk_local(&self) -> bool {
        matches!(
            self,
            DeltaError::TranslationIntegrity { .. } | DeltaError::TranslationUnavailable { .. }
        )
    }
}

impl From<figment::Error> for DeltaError {
    fn from(e: figment::Error) -> Self {
        DeltaError::Config(e.to_string())
    }
}

pub type DeltaResult<T> = Result<T, DeltaError>;
