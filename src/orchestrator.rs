//! Revision orchestrator
//!
//! Drives one document across one revision transition:
//!
//! 1. chunk the old and new sources (structural errors reject the document)
//! 2. align the chunk sequences
//! 3. reuse stored translations for every chunk whose fingerprint is known
//! 4. translate the rest in parallel through the invoker
//! 5. merge, then commit all memory updates for the document at once
//!
//! Nothing is written to the translation memory when the run is cancelled or
//! rejected, and chunks that fell back to source text are never stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkPath, ChunkedDocument};
use crate::chunker::chunk_document;
use crate::config::EngineConfig;
use crate::context::ContextAssembler;
use crate::diff::{AlignmentStatus, diff_documents};
use crate::error::{DeltaError, DeltaResult};
use crate::fingerprint::Fingerprint;
use crate::memory::{MemoryWrite, PendingWrite, Provenance, TranslationMemory};
use crate::merge::{MergedDocument, Resolution, merge_document};
use crate::mt::{MachineTranslator, TranslationInvoker, canonical_locale};

/// Cooperative cancellation flag shared with a running revision
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One document at one revision transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionJob {
    pub document_id: String,
    /// Previous revision of the source, absent on first translation.
    pub old_source: Option<String>,
    pub new_source: String,
    pub source_locale: String,
    pub target_locale: String,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub unchanged: usize,
    pub modified: usize,
    pub added: usize,
    pub removed: usize,
    /// Chunks served from translation memory.
    pub reused: usize,
    /// Chunks translated in this run.
    pub translated: usize,
    pub fallbacks: usize,
    pub external_calls: usize,
    pub memory_conflicts: usize,
}

/// A chunk that fell back to its source text
#[derive(Debug)]
pub struct ChunkFailure {
    pub path: ChunkPath,
    pub error: DeltaError,
}

#[derive(Debug)]
pub struct RevisionOutcome {
    pub document_id: String,
    pub document: MergedDocument,
    pub stats: RunStats,
    pub failures: Vec<ChunkFailure>,
}

impl RevisionOutcome {
    pub fn is_partial(&self) -> bool {
        self.document.status.is_partial()
    }
}

#[derive(Debug)]
pub struct RejectedDocument {
    pub document_id: String,
    pub error: DeltaError,
}

/// Outcome of a batch, sorted by document id
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<RevisionOutcome>,
    pub rejected: Vec<RejectedDocument>,
}

impl BatchReport {
    pub fn fully_translated(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_partial())
            .map(|o| o.document_id.as_str())
            .collect()
    }

    pub fn partially_translated(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_partial())
            .map(|o| o.document_id.as_str())
            .collect()
    }
}

/// Chunks sharing one fingerprint that need a translation
struct PendingChunk {
    /// Occurrence the request is built from: the first MODIFIED one if any.
    request_index: usize,
    indices: Vec<usize>,
    source_fingerprint: Option<Fingerprint>,
}

#[derive(Clone)]
pub struct RevisionOrchestrator {
    config: EngineConfig,
    memory: Arc<TranslationMemory>,
    invoker: Arc<TranslationInvoker>,
}

impl RevisionOrchestrator {
    pub fn new(
        config: EngineConfig,
        memory: Arc<TranslationMemory>,
        provider: Arc<dyn MachineTranslator>,
    ) -> DeltaResult<Self> {
        config.validate()?;
        let invoker = TranslationInvoker::new(provider, config.concurrency_limit, config.retry_policy());
        Ok(Self {
            config,
            memory,
            invoker: Arc::new(invoker),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<TranslationMemory> {
        &self.memory
    }

    /// Translate one revision of a document.
    ///
    /// # Errors
    ///
    /// * `StructuralParse` - either source is malformed; no provider call was made
    /// * `InvalidLocale` - a locale code cannot be parsed
    /// * `Cancelled` - `cancel` fired before the memory commit
    ///
    /// Chunk translation failures are not errors: they are listed in
    /// [`RevisionOutcome::failures`] and the document is marked partial.
    pub async fn run(&self, job: &RevisionJob, cancel: &CancellationToken) -> DeltaResult<RevisionOutcome> {
        let source_locale = locale(&job.source_locale)?;
        let target_locale = locale(&job.target_locale)?;

        let old = job.old_source.as_deref().map(chunk_document).transpose()?;
        let new = chunk_document(&job.new_source)?;
        let empty = ChunkedDocument::default();
        let report = diff_documents(old.as_ref().unwrap_or(&empty), &new);
        ensure_active(cancel, &job.document_id)?;

        let counts = report.counts();
        let mut stats = RunStats {
            unchanged: counts.unchanged,
            modified: counts.modified,
            added: counts.added,
            removed: counts.removed,
            ..RunStats::default()
        };

        let mut resolutions: Vec<Option<Resolution>> = vec![None; new.len()];
        let mut pending_writes = Vec::new();
        let mut pending: HashMap<Fingerprint, PendingChunk> = HashMap::new();
        let mut pending_order = Vec::new();

        for record in &report.records {
            let chunk = &new.chunks[record.new_index];
            if !chunk.is_translatable() {
                resolutions[record.new_index] = Some(Resolution::Verbatim);
                continue;
            }

            if let Some(entry) = self.memory.lookup(chunk.fingerprint(), &target_locale) {
                debug!(path = %chunk.path, fingerprint = chunk.fingerprint().short(), "Reusing stored translation");
                resolutions[record.new_index] = Some(Resolution::Reused(entry.translated_text));
                pending_writes.push(PendingWrite::Touch {
                    fingerprint: chunk.fingerprint().clone(),
                    locale: target_locale.clone(),
                    revision: job.revision,
                });
                stats.reused += 1;
                continue;
            }

            let source_fingerprint = match (record.status, old.as_ref()) {
                (AlignmentStatus::Modified { old_index }, Some(old)) => {
                    Some(old.chunks[old_index].fingerprint().clone())
                }
                _ => None,
            };
            let slot = pending.entry(chunk.fingerprint().clone()).or_insert_with(|| {
                pending_order.push(chunk.fingerprint().clone());
                PendingChunk {
                    request_index: record.new_index,
                    indices: Vec::new(),
                    source_fingerprint: None,
                }
            });
            slot.indices.push(record.new_index);
            if slot.source_fingerprint.is_none() && source_fingerprint.is_some() {
                slot.request_index = record.new_index;
                slot.source_fingerprint = source_fingerprint;
            }
        }

        let resolved: Vec<Option<String>> = resolutions
            .iter()
            .map(|r| r.as_ref().and_then(Resolution::translation).map(str::to_string))
            .collect();
        let assembler = ContextAssembler::new(old.as_ref(), &new, &self.memory, &resolved)
            .with_window(self.config.context_window_size)
            .with_locales(&source_locale, &target_locale);

        let mut tasks = JoinSet::new();
        for fingerprint in &pending_order {
            let Some(index) = pending.get(fingerprint).map(|slot| slot.request_index) else {
                continue;
            };
            let Some(request) = assembler.assemble(&report.records[index]) else {
                continue;
            };
            let invoker = self.invoker.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                if cancel.is_cancelled() {
                    return (index, None);
                }
                (index, Some(invoker.translate(&request).await))
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if cancel.is_cancelled() {
                tasks.abort_all();
                break;
            }
            let (index, invocation) = match joined {
                Ok((index, Some(invocation))) => (index, invocation),
                Ok((_, None)) => continue,
                Err(e) => {
                    warn!(document = %job.document_id, error = %e, "Translation task failed");
                    continue;
                }
            };
            stats.external_calls += invocation.calls as usize;

            let chunk = &new.chunks[index];
            let Some(slot) = pending.get(chunk.fingerprint()) else {
                continue;
            };
            match invocation.result {
                Ok(text) => {
                    for &i in &slot.indices {
                        resolutions[i] = Some(Resolution::Fresh(text.clone()));
                    }
                    stats.translated += slot.indices.len();
                    pending_writes.push(PendingWrite::Store(MemoryWrite {
                        fingerprint: chunk.fingerprint().clone(),
                        locale: target_locale.clone(),
                        text,
                        provenance: Provenance::MachineGenerated,
                        source_fingerprint: slot.source_fingerprint.clone(),
                        revision: job.revision,
                    }));
                }
                Err(error) => {
                    warn!(document = %job.document_id, path = %chunk.path, error = %error, "Falling back to source text");
                    failures.push(ChunkFailure {
                        path: chunk.path.clone(),
                        error,
                    });
                }
            }
        }
        ensure_active(cancel, &job.document_id)?;

        let resolutions: Vec<Resolution> = resolutions
            .into_iter()
            .map(|r| r.unwrap_or(Resolution::Fallback))
            .collect();
        stats.fallbacks = resolutions
            .iter()
            .filter(|r| matches!(r, Resolution::Fallback))
            .count();
        let document = merge_document(&new, &resolutions);

        let summary = self
            .memory
            .commit(pending_writes, self.config.allow_provenance_override);
        stats.memory_conflicts = summary.conflicts;

        info!(
            document = %job.document_id,
            revision = job.revision,
            locale = %target_locale,
            unchanged = stats.unchanged,
            modified = stats.modified,
            added = stats.added,
            removed = stats.removed,
            reused = stats.reused,
            translated = stats.translated,
            fallbacks = stats.fallbacks,
            calls = stats.external_calls,
            "Revision processed"
        );

        Ok(RevisionOutcome {
            document_id: job.document_id.clone(),
            document,
            stats,
            failures,
        })
    }

    /// Record a human correction for the chunk at `path` of `document_source`.
    /// Returns the fingerprint the correction was stored under.
    pub fn ingest_human_edit(
        &self,
        document_source: &str,
        path: &ChunkPath,
        locale_code: &str,
        text: &str,
        revision: u64,
    ) -> DeltaResult<Fingerprint> {
        let target_locale = locale(locale_code)?;
        let document = chunk_document(document_source)?;
        let chunk = document
            .find_by_path(path)
            .ok_or_else(|| DeltaError::UnknownChunk(path.clone()))?;
        if !chunk.is_translatable() {
            return Err(DeltaError::NotTranslatable(path.clone()));
        }

        self.memory
            .ingest_human_edit(chunk.fingerprint(), &target_locale, text.trim(), revision);
        info!(path = %path, locale = %target_locale, "Human edit recorded");
        Ok(chunk.fingerprint().clone())
    }

    /// Run several documents concurrently. Each document commits on its own;
    /// a rejected document does not affect the others.
    pub async fn run_batch(&self, jobs: Vec<RevisionJob>, cancel: &CancellationToken) -> BatchReport {
        let mut tasks = JoinSet::new();
        for job in jobs {
            let orchestrator = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = orchestrator.run(&job, &cancel).await;
                (job.document_id, result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.outcomes.push(outcome),
                Ok((document_id, Err(error))) => {
                    warn!(document = %document_id, error = %error, "Document rejected");
                    report.rejected.push(RejectedDocument { document_id, error });
                }
                Err(e) => warn!(error = %e, "Document task failed"),
            }
        }

        report.outcomes.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        report.rejected.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        info!(
            translated = report.fully_translated().len(),
            partial = report.partially_translated().len(),
            rejected = report.rejected.len(),
            "Batch finished"
        );
        report
    }

    /// Drop memory entries unseen for more than `prune_after_revisions` revisions.
    pub fn prune_memory(&self) -> usize {
        let removed = self.memory.prune(self.config.prune_after_revisions);
        info!(removed, "Pruned translation memory");
        removed
    }
}

fn locale(code: &str) -> DeltaResult<String> {
    canonical_locale(code).map_err(|e| DeltaError::InvalidLocale {
        locale: code.to_string(),
        reason: e.to_string(),
    })
}

fn ensure_active(cancel: &CancellationToken, document_id: &str) -> DeltaResult<()> {
    if cancel.is_cancelled() {
        warn!(document = %document_id, "Revision cancelled, nothing committed");
        return Err(DeltaError::Cancelled(document_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkKind;
    use crate::mt::{MockMode, MockTranslator};

    fn orchestrator(mode: MockMode) -> (RevisionOrchestrator, Arc<MockTranslator>) {
        let mock = Arc::new(MockTranslator::new(mode));
        let config = EngineConfig {
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 2,
            ..EngineConfig::default()
        };
        let orchestrator =
            RevisionOrchestrator::new(config, Arc::new(TranslationMemory::new()), mock.clone()).unwrap();
        (orchestrator, mock)
    }

    fn job(old: Option<&str>, new: &str, revision: u64) -> RevisionJob {
        RevisionJob {
            document_id: "reference/grid".to_string(),
            old_source: old.map(str::to_string),
            new_source: new.to_string(),
            source_locale: "en".to_string(),
            target_locale: "fr".to_string(),
            revision,
        }
    }

    // ========== Cancellation Tests ==========

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let (orchestrator, mock) = orchestrator(MockMode::Suffix);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator.run(&job(None, "# Intro\n\nText.\n", 1), &cancel).await;
        assert!(matches!(result, Err(DeltaError::Cancelled(_))));
        assert!(orchestrator.memory().is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    // ========== Rejection Tests ==========

    #[tokio::test]
    async fn test_structural_error_makes_no_calls() {
        let (orchestrator, mock) = orchestrator(MockMode::Suffix);
        let result = orchestrator
            .run(&job(None, "# Intro\n\n```\nunterminated\n", 1), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(DeltaError::StructuralParse { .. })));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_locale_is_rejected() {
        let (orchestrator, _) = orchestrator(MockMode::Suffix);
        let mut bad = job(None, "Text.\n", 1);
        bad.target_locale = "fr@@".to_string();
        assert!(matches!(
            orchestrator.run(&bad, &CancellationToken::new()).await,
            Err(DeltaError::InvalidLocale { .. })
        ));
    }

    // ========== Reuse Tests ==========

    #[tokio::test]
    async fn test_duplicate_chunks_translate_once() {
        let (orchestrator, mock) = orchestrator(MockMode::Suffix);
        let outcome = orchestrator
            .run(&job(None, "Note.\n\nBody.\n\nNote.\n", 1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.document.text, "Note._fr\n\nBody._fr\n\nNote._fr\n");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(outcome.stats.translated, 3);
        assert_eq!(orchestrator.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_request_prefers_modified_occurrence() {
        let (orchestrator, mock) = orchestrator(MockMode::Suffix);
        let old = "# Intro\n\nTypst is fast.\n";
        // The first copy is ADDED, the second is the edited old paragraph.
        let new = "Typst is fast and safe.\n\n# Intro\n\nTypst is fast and safe.\n";
        orchestrator.run(&job(None, old, 1), &CancellationToken::new()).await.unwrap();
        let outcome = orchestrator
            .run(&job(Some(old), new, 2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.added, 1);
        assert_eq!(outcome.stats.modified, 1);
        assert_eq!(mock.call_count(), 3);
        let request = mock.requests().pop().unwrap();
        assert_eq!(request.path, ChunkPath::root(2));
        let previous = request.previous.expect("edit carries the old pair");
        assert_eq!(previous.source, "Typst is fast.");
        assert_eq!(previous.translation, "Typst is fast._fr");

        let stored = orchestrator
            .memory()
            .lookup(&Fingerprint::of(ChunkKind::Paragraph, "Typst is fast and safe."), "fr")
            .unwrap();
        assert_eq!(
            stored.source_fingerprint_at_write,
            Some(Fingerprint::of(ChunkKind::Paragraph, "Typst is fast."))
        );
    }

    #[tokio::test]
    async fn test_locale_is_canonicalised_for_memory() {
        let (orchestrator, mock) = orchestrator(MockMode::Suffix);
        let mut first = job(None, "Text.\n", 1);
        first.target_locale = "zh-hans".to_string();
        orchestrator.run(&first, &CancellationToken::new()).await.unwrap();

        let mut second = first.clone();
        second.target_locale = "zh_Hans".to_string();
        second.revision = 2;
        orchestrator.run(&second, &CancellationToken::new()).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(orchestrator.memory().records()[0].locale, "zh-Hans");
    }

    // ========== Human Edit Tests ==========

    #[test]
    fn test_ingest_unknown_and_verbatim_paths() {
        let (orchestrator, _) = orchestrator(MockMode::Suffix);
        let source = "# Intro\n\n```\ncode\n```\n";
        assert!(matches!(
            orchestrator.ingest_human_edit(source, &ChunkPath::root(7), "fr", "x", 1),
            Err(DeltaError::UnknownChunk(_))
        ));
        assert!(matches!(
            orchestrator.ingest_human_edit(source, &ChunkPath::root(1), "fr", "x", 1),
            Err(DeltaError::NotTranslatable(_))
        ));
        assert!(orchestrator.memory().is_empty());
    }

    // ========== Batch Tests ==========

    #[tokio::test]
    async fn test_batch_reports_each_document() {
        let (orchestrator, _) = orchestrator(MockMode::Suffix);
        let mut good = job(None, "# Intro\n", 1);
        good.document_id = "a/good".to_string();
        let mut broken = job(None, "<Callout>\nnever closed\n", 1);
        broken.document_id = "b/broken".to_string();

        let report = orchestrator.run_batch(vec![broken, good], &CancellationToken::new()).await;
        assert_eq!(report.fully_translated(), vec!["a/good"]);
        assert!(report.partially_translated().is_empty());
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].document_id, "b/broken");
    }
}
