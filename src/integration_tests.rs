//! End-to-end tests for the revision pipeline
//!
//! Every test drives `RevisionOrchestrator` with the mock translator, so no
//! network access or API key is needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::mt::{MockMode, MockTranslator};
use crate::*;

const PAGE: &str = r#"---
title: "Grid"
description: "Arranges content in a grid."
---

import { TypstPreview } from '@/components/typst/preview';

Arranges content in a grid. Use `grid{:typst}` for layouts.

## Parameters

```typst
#grid(
  columns: 2,
)
```

- First item
- Second item
  continues here
  - Nested item

<Callout>
Tables are grids with [semantics](reference/table).
</Callout>

<TypstPreview
  code={`
  #grid(columns: 2)[a][b]
  `}
  image='/assets/grid.png'
  alt='grid => preview'
  editable={true}
/>

| Symbol | Name |
| --- | --- |
| \| | pipe symbol |

See the footnote[^1].

[^1]: Footnotes are paragraphs too.
"#;

fn test_config() -> EngineConfig {
    EngineConfig {
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        ..EngineConfig::default()
    }
}

fn setup(mock: MockTranslator, config: EngineConfig) -> (RevisionOrchestrator, Arc<MockTranslator>) {
    let mock = Arc::new(mock);
    let orchestrator =
        RevisionOrchestrator::new(config, Arc::new(TranslationMemory::new()), mock.clone())
            .expect("valid config");
    (orchestrator, mock)
}

fn job(old: Option<&str>, new: &str, revision: u64) -> RevisionJob {
    RevisionJob {
        document_id: "reference/layout/grid".to_string(),
        old_source: old.map(str::to_string),
        new_source: new.to_string(),
        source_locale: "en".to_string(),
        target_locale: "fr".to_string(),
        revision,
    }
}

fn shape(document: &ChunkedDocument) -> Vec<(ChunkKind, String)> {
    document
        .iter()
        .map(|chunk| (chunk.kind, chunk.path.to_string()))
        .collect()
}

fn mappings(pairs: &[(&str, &str)]) -> MockMode {
    let map: HashMap<(String, String), String> = pairs
        .iter()
        .map(|(source, target)| ((source.to_string(), "fr".to_string()), target.to_string()))
        .collect();
    MockMode::Mappings(map)
}

// ========== Idempotence Tests ==========

#[tokio::test]
async fn test_second_run_is_identical_and_free() {
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let cancel = CancellationToken::new();

    let first = orchestrator.run(&job(None, PAGE, 1), &cancel).await.unwrap();
    let calls_after_first = mock.call_count();
    assert!(calls_after_first > 0);

    let second = orchestrator.run(&job(Some(PAGE), PAGE, 2), &cancel).await.unwrap();
    assert_eq!(second.document.text, first.document.text);
    assert_eq!(mock.call_count(), calls_after_first);
    assert_eq!(second.stats.external_calls, 0);
    assert_eq!(second.stats.modified + second.stats.added + second.stats.removed, 0);
}

#[tokio::test]
async fn test_memory_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.json");

    let (orchestrator, _) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let first = orchestrator
        .run(&job(None, PAGE, 1), &CancellationToken::new())
        .await
        .unwrap();
    orchestrator.memory().save(&path).unwrap();

    let mock = Arc::new(MockTranslator::new(MockMode::Suffix));
    let restored = Arc::new(TranslationMemory::load(&path).unwrap());
    let orchestrator = RevisionOrchestrator::new(test_config(), restored, mock.clone()).unwrap();
    let second = orchestrator
        .run(&job(Some(PAGE), PAGE, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.document.text, first.document.text);
    assert_eq!(mock.call_count(), 0);
}

// ========== Classification Tests ==========

#[test]
fn test_page_diffed_against_itself_is_unchanged() {
    let document = chunk_document(PAGE).unwrap();
    let report = diff_documents(&document, &document);
    let counts = report.counts();
    assert_eq!(counts.unchanged, document.len());
    assert_eq!(counts.modified + counts.added + counts.removed, 0);
}

#[tokio::test]
async fn test_whitespace_reformat_needs_no_translation() {
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let old = "# Intro\n\nTypst is fast.\n";
    let new = "# Intro\n\nTypst   is\nfast.\n";

    orchestrator.run(&job(None, old, 1), &CancellationToken::new()).await.unwrap();
    let outcome = orchestrator
        .run(&job(Some(old), new, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 2);
    assert_eq!(outcome.stats.unchanged, 2);
    assert_eq!(outcome.document.text, "# Intro_fr\n\nTypst is fast._fr\n");
}

#[tokio::test]
async fn test_code_span_spacing_survives_a_run() {
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let source = "Write `#set text(  red)` first.\nThen  `wrap( a )`.\n";

    let outcome = orchestrator
        .run(&job(None, source, 1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.requests()[0].content, "Write `#set text(  red)` first. Then `wrap( a )`.");
    assert_eq!(
        outcome.document.text,
        "Write `#set text(  red)` first. Then `wrap( a )`._fr\n"
    );
    assert_eq!(outcome.document.status, DocumentStatus::FullyTranslated);
}

// ========== Editor Scenario Tests ==========

#[tokio::test]
async fn test_modified_paragraph_reuses_heading_and_edits_paragraph() {
    let mode = mappings(&[
        ("Intro", "Introduction"),
        ("Typst is fast.", "Typst est rapide."),
        ("Typst is fast and safe.", "Typst est rapide et sûr."),
    ]);
    let (orchestrator, mock) = setup(MockTranslator::new(mode), test_config());
    let old = "# Intro\n\nTypst is fast.\n";
    let new = "# Intro\n\nTypst is fast and safe.\n";

    orchestrator.run(&job(None, old, 1), &CancellationToken::new()).await.unwrap();
    let outcome = orchestrator
        .run(&job(Some(old), new, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.document.text, "# Introduction\n\nTypst est rapide et sûr.\n");
    assert_eq!(outcome.document.status, DocumentStatus::FullyTranslated);
    assert_eq!(outcome.stats.unchanged, 1);
    assert_eq!(outcome.stats.modified, 1);
    assert_eq!(outcome.stats.reused, 1);
    assert_eq!(outcome.stats.translated, 1);

    // Only the paragraph went out, carrying the old text and translation
    assert_eq!(mock.call_count(), 3);
    let request = mock.requests().pop().unwrap();
    assert_eq!(request.content, "Typst is fast and safe.");
    assert_eq!(
        request.previous,
        Some(TranslatedPair {
            source: "Typst is fast.".to_string(),
            translation: "Typst est rapide.".to_string(),
        })
    );
    assert_eq!(request.context_before[0].translation, "Introduction");

    // The new entry records which old chunk it was derived from
    let new_doc = chunk_document(new).unwrap();
    let old_doc = chunk_document(old).unwrap();
    let entry = orchestrator
        .memory()
        .lookup(new_doc.chunks[1].fingerprint(), "fr")
        .unwrap();
    assert_eq!(entry.translated_text, "Typst est rapide et sûr.");
    assert_eq!(
        entry.source_fingerprint_at_write.as_ref(),
        Some(old_doc.chunks[1].fingerprint())
    );
    assert_eq!(entry.last_seen_revision, 2);
}

#[tokio::test]
async fn test_kind_change_offers_old_translation() {
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let old = "Intro\n\nBody.\n";
    let new = "# Intro\n\nBody.\n";

    orchestrator.run(&job(None, old, 1), &CancellationToken::new()).await.unwrap();
    let outcome = orchestrator
        .run(&job(Some(old), new, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.stats.modified, 1);
    let request = mock.requests().pop().unwrap();
    assert_eq!(request.kind, ChunkKind::Heading);
    assert_eq!(
        request.previous.map(|p| p.translation),
        Some("Intro_fr".to_string())
    );
}

#[tokio::test]
async fn test_reverted_content_comes_back_from_memory() {
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let v1 = "Typst is fast.\n";
    let v2 = "Typst is very fast.\n";

    orchestrator.run(&job(None, v1, 1), &CancellationToken::new()).await.unwrap();
    orchestrator.run(&job(Some(v1), v2, 2), &CancellationToken::new()).await.unwrap();
    let outcome = orchestrator
        .run(&job(Some(v2), v1, 3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.stats.modified, 1);
    assert_eq!(outcome.stats.reused, 1);
    assert_eq!(mock.call_count(), 2);
}

// ========== Human Edit Tests ==========

#[tokio::test]
async fn test_human_edit_wins_over_machine_output() {
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let source = "# Intro\n\nTypst is fast.\n";
    orchestrator.run(&job(None, source, 1), &CancellationToken::new()).await.unwrap();

    let fingerprint = orchestrator
        .ingest_human_edit(source, &ChunkPath::root(1), "fr", "Typst est vraiment rapide.", 1)
        .unwrap();

    // A later machine write for the same fingerprint is refused
    let outcome = orchestrator.memory().write(
        MemoryWrite {
            fingerprint: fingerprint.clone(),
            locale: "fr".to_string(),
            text: "Typst est rapide.".to_string(),
            provenance: Provenance::MachineGenerated,
            source_fingerprint: None,
            revision: 2,
        },
        false,
    );
    assert_eq!(outcome, WriteOutcome::Conflict);

    let rerun = orchestrator
        .run(&job(Some(source), source, 2), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(rerun.document.text, "# Intro_fr\n\nTypst est vraiment rapide.\n");
    assert_eq!(mock.call_count(), 2);

    let entry = orchestrator.memory().lookup(&fingerprint, "fr").unwrap();
    assert_eq!(entry.provenance, Provenance::HumanConfirmed);
    assert_eq!(entry.last_seen_revision, 2);
}

#[tokio::test]
async fn test_human_edit_is_offered_when_paragraph_changes() {
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let old = "Typst is fast.\n";
    let new = "Typst is fast and safe.\n";
    orchestrator.run(&job(None, old, 1), &CancellationToken::new()).await.unwrap();
    orchestrator
        .ingest_human_edit(old, &ChunkPath::root(0), "fr", "Typst est rapide !", 1)
        .unwrap();

    orchestrator.run(&job(Some(old), new, 2), &CancellationToken::new()).await.unwrap();
    let request = mock.requests().pop().unwrap();
    assert_eq!(
        request.previous.map(|p| p.translation),
        Some("Typst est rapide !".to_string())
    );
}

// ========== Failure Isolation Tests ==========

#[tokio::test]
async fn test_transport_failures_fall_back_without_memory_write() {
    let config = EngineConfig {
        retry_limit: 2,
        ..test_config()
    };
    let (orchestrator, mock) = setup(MockTranslator::new(MockMode::FailTimes(2)), config);
    let new = "# Intro\n\nTypst is fast and safe.\n";
    let new_doc = chunk_document(new).unwrap();
    orchestrator.memory().write(
        MemoryWrite {
            fingerprint: new_doc.chunks[0].fingerprint().clone(),
            locale: "fr".to_string(),
            text: "Introduction".to_string(),
            provenance: Provenance::MachineGenerated,
            source_fingerprint: None,
            revision: 1,
        },
        false,
    );

    let outcome = orchestrator
        .run(&job(None, new, 2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.document.text, "# Introduction\n\nTypst is fast and safe.\n");
    assert_eq!(
        outcome.document.status,
        DocumentStatus::PartiallyTranslated {
            fallback_paths: vec![ChunkPath::root(1)]
        }
    );
    assert_eq!(mock.call_count(), 2);
    assert_eq!(outcome.stats.fallbacks, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(
        outcome.failures[0].error,
        DeltaError::TranslationUnavailable { attempts: 2, .. }
    ));
    assert!(
        orchestrator
            .memory()
            .lookup(new_doc.chunks[1].fingerprint(), "fr")
            .is_none()
    );
}

#[tokio::test]
async fn test_integrity_failure_is_chunk_local() {
    let (orchestrator, _) = setup(MockTranslator::new(MockMode::DropSpans), test_config());
    let source = "# Intro\n\nUse `grid{:typst}` for layouts.\n";
    let outcome = orchestrator
        .run(&job(None, source, 1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.document.text, "# Intro_fr\n\nUse `grid{:typst}` for layouts.\n");
    assert!(outcome.is_partial());
    assert!(matches!(
        outcome.failures[0].error,
        DeltaError::TranslationIntegrity { .. }
    ));
    assert_eq!(orchestrator.memory().len(), 1);
}

// ========== Structural Fidelity Tests ==========

#[tokio::test]
async fn test_translated_page_keeps_structure() {
    let (orchestrator, _) = setup(MockTranslator::new(MockMode::Suffix), test_config());
    let outcome = orchestrator
        .run(&job(None, PAGE, 1), &CancellationToken::new())
        .await
        .unwrap();

    let source_doc = chunk_document(PAGE).unwrap();
    let output_doc = chunk_document(&outcome.document.text).unwrap();
    assert_eq!(shape(&output_doc), shape(&source_doc));
    assert_eq!(outcome.document.status, DocumentStatus::FullyTranslated);

    // Verbatim material is byte-identical
    assert!(outcome.document.text.starts_with("---\ntitle: \"Grid\""));
    assert!(outcome.document.text.contains("```typst\n#grid(\n  columns: 2,\n)\n```\n"));
    assert!(outcome.document.text.contains("  alt='grid => preview'\n"));
    assert!(outcome.document.text.contains("| --- | --- |\n"));
}

// ========== Cancellation Tests ==========

#[tokio::test]
async fn test_cancel_mid_document_commits_nothing() {
    let (orchestrator, mock) = setup(MockTranslator::with_delay(MockMode::Suffix, 200), test_config());
    let cancel = CancellationToken::new();

    let running = {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run(&job(None, PAGE, 1), &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = running.await.unwrap();
    assert!(matches!(result, Err(DeltaError::Cancelled(_))));
    assert!(mock.call_count() > 0);
    assert!(orchestrator.memory().is_empty());
}

// ========== Pruning Tests ==========

#[tokio::test]
async fn test_prune_drops_long_unseen_translations() {
    let config = EngineConfig {
        prune_after_revisions: 5,
        ..test_config()
    };
    let (orchestrator, _) = setup(MockTranslator::new(MockMode::Suffix), config);
    let v1 = "# Intro\n\nOld paragraph.\n";
    let v2 = "# Intro\n\nNew paragraph.\n";
    let old_paragraph = chunk_document(v1).unwrap().chunks[1].fingerprint().clone();

    orchestrator.run(&job(None, v1, 1), &CancellationToken::new()).await.unwrap();
    orchestrator.run(&job(Some(v1), v2, 3), &CancellationToken::new()).await.unwrap();
    assert_eq!(orchestrator.prune_memory(), 0);

    orchestrator.run(&job(Some(v2), v2, 7), &CancellationToken::new()).await.unwrap();
    assert_eq!(orchestrator.prune_memory(), 1);
    assert!(orchestrator.memory().lookup(&old_paragraph, "fr").is_none());
    assert_eq!(orchestrator.memory().len(), 2);
}

// ========== Batch Tests ==========

#[tokio::test]
async fn test_batch_flags_partial_pages() {
    let (orchestrator, _) = setup(MockTranslator::new(MockMode::DropSpans), test_config());
    let mut plain = job(None, "# Overview\n\nPlain text.\n", 1);
    plain.document_id = "overview".to_string();
    let mut with_code = job(None, "Call `grid{:typst}` here.\n", 1);
    with_code.document_id = "reference/grid".to_string();

    let report = orchestrator
        .run_batch(vec![with_code, plain], &CancellationToken::new())
        .await;
    assert_eq!(report.fully_translated(), vec!["overview"]);
    assert_eq!(report.partially_translated(), vec!["reference/grid"]);
    assert!(report.rejected.is_empty());
}
