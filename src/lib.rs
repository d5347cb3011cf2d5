//! Incremental translation of structured documentation.
//!
//! A document is split into chunks, the chunks of two revisions are aligned,
//! and only chunks whose content changed are sent to a machine translator.
//! Everything else comes from a persistent translation memory, in which
//! human corrections take precedence over machine output.
//!
//! ```ignore
//! use std::sync::Arc;
//! use delta_i18n::{CancellationToken, EngineConfig, RevisionJob, RevisionOrchestrator, TranslationMemory};
//! use delta_i18n::mt::ChatTranslationProvider;
//!
//! let memory = Arc::new(TranslationMemory::load(Path::new("memory.json"))?);
//! let provider = Arc::new(ChatTranslationProvider::from_env()?);
//! let orchestrator = RevisionOrchestrator::new(EngineConfig::load()?, memory.clone(), provider)?;
//!
//! let outcome = orchestrator.run(&job, &CancellationToken::new()).await?;
//! memory.save(Path::new("memory.json"))?;
//! ```

pub mod chunk;
pub mod chunker;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod memory;
pub mod merge;
pub mod mt;
pub mod orchestrator;

#[cfg(test)]
mod integration_tests;

pub use chunk::{Chunk, ChunkKind, ChunkPath, ChunkedDocument};
pub use chunker::chunk_document;
pub use config::{EngineConfig, RetryPolicy};
pub use context::{ContextAssembler, TranslatedPair, TranslationRequest};
pub use diff::{AlignmentRecord, AlignmentStatus, DiffCounts, DiffReport, diff_documents};
pub use error::{DeltaError, DeltaResult, SourceSpan};
pub use fingerprint::{Fingerprint, normalize_content};
pub use memory::{
    CommitSummary, MemoryEntry, MemoryRecord, MemoryWrite, PendingWrite, Provenance,
    TranslationMemory, WriteOutcome,
};
pub use merge::{DocumentStatus, MergedDocument, Resolution, merge_document};
pub use orchestrator::{
    BatchReport, CancellationToken, ChunkFailure, RejectedDocument, RevisionJob,
    RevisionOrchestrator, RevisionOutcome, RunStats,
};
