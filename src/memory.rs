//! Translation memory
//!
//! A content-addressed store mapping `(fingerprint, locale)` to a translation
//! and its provenance. The store is an explicit handle shared by reference;
//! every mutation of one key happens under a single write lock, so the
//! provenance check and the write are atomic.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DeltaError, DeltaResult};
use crate::fingerprint::Fingerprint;

/// Who produced a stored translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    MachineGenerated,
    HumanConfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub translated_text: String,
    pub provenance: Provenance,
    /// Fingerprint of the old chunk the translation was derived from, if any.
    pub source_fingerprint_at_write: Option<Fingerprint>,
    pub last_seen_revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoryKey {
    fingerprint: Fingerprint,
    locale: String,
}

impl MemoryKey {
    fn new(fingerprint: &Fingerprint, locale: &str) -> Self {
        MemoryKey {
            fingerprint: fingerprint.clone(),
            locale: locale.to_string(),
        }
    }
}

/// A single write request against the memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWrite {
    pub fingerprint: Fingerprint,
    pub locale: String,
    pub text: String,
    pub provenance: Provenance,
    pub source_fingerprint: Option<Fingerprint>,
    pub revision: u64,
}

/// One entry of a document-level commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Store a translation.
    Store(MemoryWrite),
    /// Mark an existing entry as seen at `revision` without changing its text.
    Touch {
        fingerprint: Fingerprint,
        locale: String,
        revision: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Skipped because a human-confirmed entry would have been downgraded.
    Conflict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub written: usize,
    pub touched: usize,
    pub conflicts: usize,
}

/// One persisted record per `(fingerprint, locale)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub fingerprint: Fingerprint,
    pub locale: String,
    pub translated_text: String,
    pub provenance: Provenance,
    pub source_fingerprint_at_write: Option<Fingerprint>,
    pub last_seen_revision: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    latest_revision: u64,
    records: Vec<MemoryRecord>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<MemoryKey, MemoryEntry>,
    latest_revision: u64,
}

impl Inner {
    fn apply(&mut self, write: MemoryWrite, allow_override: bool) -> WriteOutcome {
        let key = MemoryKey::new(&write.fingerprint, &write.locale);
        if let Some(existing) = self.entries.get(&key) {
            if existing.provenance == Provenance::HumanConfirmed
                && write.provenance == Provenance::MachineGenerated
                && !allow_override
            {
                let conflict = DeltaError::MemoryWriteConflict {
                    fingerprint: write.fingerprint.to_string(),
                    locale: write.locale.clone(),
                };
                warn!("{}", conflict);
                return WriteOutcome::Conflict;
            }
        }

        self.latest_revision = self.latest_revision.max(write.revision);
        self.entries.insert(
            key,
            MemoryEntry {
                translated_text: write.text,
                provenance: write.provenance,
                source_fingerprint_at_write: write.source_fingerprint,
                last_seen_revision: write.revision,
            },
        );
        WriteOutcome::Written
    }

    fn touch(&mut self, fingerprint: &Fingerprint, locale: &str, revision: u64) -> bool {
        self.latest_revision = self.latest_revision.max(revision);
        match self.entries.get_mut(&MemoryKey::new(fingerprint, locale)) {
            Some(entry) => {
                entry.last_seen_revision = entry.last_seen_revision.max(revision);
                true
            }
            None => false,
        }
    }
}

/// Persistent keyed store of prior translations
#[derive(Debug, Default)]
pub struct TranslationMemory {
    inner: RwLock<Inner>,
}

impl TranslationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, fingerprint: &Fingerprint, locale: &str) -> Option<MemoryEntry> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(&MemoryKey::new(fingerprint, locale))
            .cloned()
    }

    /// Store a translation unless it would replace a human-confirmed entry with
    /// machine output. Such writes are skipped and logged, not failed.
    pub fn write(&self, write: MemoryWrite, allow_override: bool) -> WriteOutcome {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.apply(write, allow_override)
    }

    /// Record a human correction. Always accepted.
    pub fn ingest_human_edit(
        &self,
        fingerprint: &Fingerprint,
        locale: &str,
        text: &str,
        revision: u64,
    ) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let source_fingerprint = inner
            .entries
            .get(&MemoryKey::new(fingerprint, locale))
            .and_then(|entry| entry.source_fingerprint_at_write.clone());
        inner.apply(
            MemoryWrite {
                fingerprint: fingerprint.clone(),
                locale: locale.to_string(),
                text: text.to_string(),
                provenance: Provenance::HumanConfirmed,
                source_fingerprint,
                revision,
            },
            true,
        );
        debug!(fingerprint = fingerprint.short(), locale, "Ingested human edit");
    }

    /// Apply all writes of one document under a single lock.
    pub fn commit(&self, writes: Vec<PendingWrite>, allow_override: bool) -> CommitSummary {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut summary = CommitSummary::default();
        for pending in writes {
            match pending {
                PendingWrite::Store(write) => match inner.apply(write, allow_override) {
                    WriteOutcome::Written => summary.written += 1,
                    WriteOutcome::Conflict => summary.conflicts += 1,
                },
                PendingWrite::Touch {
                    fingerprint,
                    locale,
                    revision,
                } => {
                    if inner.touch(&fingerprint, &locale, revision) {
                        summary.touched += 1;
                    }
                }
            }
        }
        summary
    }

    /// Remove entries not seen within the last `older_than_n_revisions`
    /// revisions. Returns the number of removed entries.
    pub fn prune(&self, older_than_n_revisions: u64) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let latest = inner.latest_revision;
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| latest.saturating_sub(entry.last_seen_revision) <= older_than_n_revisions);
        before - inner.entries.len()
    }

    pub fn latest_revision(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .latest_revision
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records, sorted by fingerprint then locale.
    pub fn records(&self) -> Vec<MemoryRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<MemoryRecord> = inner
            .entries
            .iter()
            .map(|(key, entry)| MemoryRecord {
                fingerprint: key.fingerprint.clone(),
                locale: key.locale.clone(),
                translated_text: entry.translated_text.clone(),
                provenance: entry.provenance,
                source_fingerprint_at_write: entry.source_fingerprint_at_write.clone(),
                last_seen_revision: entry.last_seen_revision,
            })
            .collect();
        records.sort_by(|a, b| {
            a.fingerprint
                .cmp(&b.fingerprint)
                .then_with(|| a.locale.cmp(&b.locale))
        });
        records
    }

    /// Write a JSON snapshot, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> DeltaResult<()> {
        let snapshot = Snapshot {
            latest_revision: self.latest_revision(),
            records: self.records(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| {
            DeltaError::Memory(format!("Failed to serialize translation memory: {}", e))
        })?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), records = snapshot.records.len(), "Saved translation memory");
        Ok(())
    }

    /// Load a snapshot written by [`TranslationMemory::save`]. A missing file
    /// yields an empty memory.
    pub fn load(path: &Path) -> DeltaResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            DeltaError::Memory(format!(
                "Failed to parse translation memory '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut inner = Inner {
            entries: HashMap::with_capacity(snapshot.records.len()),
            latest_revision: snapshot.latest_revision,
        };
        for record in snapshot.records {
            inner.entries.insert(
                MemoryKey::new(&record.fingerprint, &record.locale),
                MemoryEntry {
                    translated_text: record.translated_text,
                    provenance: record.provenance,
                    source_fingerprint_at_write: record.source_fingerprint_at_write,
                    last_seen_revision: record.last_seen_revision,
                },
            );
        }
        Ok(TranslationMemory {
            inner: RwLock::new(inner),
        })
    }
}
