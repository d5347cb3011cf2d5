//! Chunk alignment across two revisions
//!
//! Alignment runs in three passes over chunk fingerprints:
//!
//! 1. A longest common subsequence fixes the in-order UNCHANGED anchors. When a
//!    fingerprint occurs several times the earliest old occurrence is taken.
//! 2. Leftover new chunks whose fingerprint still exists among leftover old
//!    chunks were moved; they are UNCHANGED against the nearest such old chunk.
//! 3. Inside each gap between anchors, leftover chunks are paired in order as
//!    MODIFIED. A pairing always beats an ADDED plus a REMOVED record, so the
//!    gap is paired to the maximum count and ties are broken by word overlap.
//!
//! Whatever is left is ADDED (new side) or REMOVED (old side).

use std::collections::HashSet;

use crate::chunk::{Chunk, ChunkedDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentStatus {
    /// Identical fingerprint in the old revision.
    Unchanged { old_index: usize },
    /// Paired with an old chunk whose content or kind differs.
    Modified { old_index: usize },
    Added,
}

impl AlignmentStatus {
    pub fn old_index(self) -> Option<usize> {
        match self {
            AlignmentStatus::Unchanged { old_index } | AlignmentStatus::Modified { old_index } => {
                Some(old_index)
            }
            AlignmentStatus::Added => None,
        }
    }
}

/// Classification of one new chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub new_index: usize,
    pub status: AlignmentStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub unchanged: usize,
    pub modified: usize,
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// One record per new chunk, in new-document order.
    pub records: Vec<AlignmentRecord>,
    /// Old chunk indices with no counterpart, ascending.
    pub removed: Vec<usize>,
}

impl DiffReport {
    pub fn counts(&self) -> DiffCounts {
        let mut counts = DiffCounts {
            removed: self.removed.len(),
            ..DiffCounts::default()
        };
        for record in &self.records {
            match record.status {
                AlignmentStatus::Unchanged { .. } => counts.unchanged += 1,
                AlignmentStatus::Modified { .. } => counts.modified += 1,
                AlignmentStatus::Added => counts.added += 1,
            }
        }
        counts
    }
}

/// Align `old` against `new`, producing one record per new chunk.
pub fn diff_documents(old: &ChunkedDocument, new: &ChunkedDocument) -> DiffReport {
    Differencer::new(&old.chunks, &new.chunks).run()
}

struct Differencer<'a> {
    old: &'a [Chunk],
    new: &'a [Chunk],
    /// Matched old index per new chunk.
    new_to_old: Vec<Option<(usize, bool)>>,
    old_taken: Vec<bool>,
}

impl<'a> Differencer<'a> {
    fn new(old: &'a [Chunk], new: &'a [Chunk]) -> Self {
        Differencer {
            old,
            new,
            new_to_old: vec![None; new.len()],
            old_taken: vec![false; old.len()],
        }
    }

    fn run(mut self) -> DiffReport {
        let anchors = self.common_subsequence();
        for &(i, j) in &anchors {
            self.link(i, j, true);
        }
        self.match_moved(&anchors);
        self.pair_gaps(&anchors);

        let records = self
            .new_to_old
            .iter()
            .enumerate()
            .map(|(new_index, matched)| AlignmentRecord {
                new_index,
                status: match *matched {
                    Some((old_index, true)) => AlignmentStatus::Unchanged { old_index },
                    Some((old_index, false)) => AlignmentStatus::Modified { old_index },
                    None => AlignmentStatus::Added,
                },
            })
            .collect();
        let removed = self
            .old_taken
            .iter()
            .enumerate()
            .filter(|(_, taken)| !**taken)
            .map(|(index, _)| index)
            .collect();

        DiffReport { records, removed }
    }

    fn link(&mut self, old_index: usize, new_index: usize, identical: bool) {
        self.old_taken[old_index] = true;
        self.new_to_old[new_index] = Some((old_index, identical));
    }

    /// Pairs `(old_index, new_index)` of one longest common subsequence of
    /// fingerprints, ascending on both sides.
    fn common_subsequence(&self) -> Vec<(usize, usize)> {
        let (n, m) = (self.old.len(), self.new.len());
        // suffix[i][j] = LCS length of old[i..] and new[j..]
        let mut suffix = vec![vec![0u32; m + 1]; n + 1];
        for i in (0..n).rev() {
            for j in (0..m).rev() {
                suffix[i][j] = if self.old[i].fingerprint() == self.new[j].fingerprint() {
                    suffix[i + 1][j + 1] + 1
                } else {
                    suffix[i + 1][j].max(suffix[i][j + 1])
                };
            }
        }

        let mut anchors = Vec::with_capacity(suffix[0][0] as usize);
        let (mut i, mut j) = (0, 0);
        while i < n && j < m {
            if self.old[i].fingerprint() == self.new[j].fingerprint()
                && suffix[i][j] == suffix[i + 1][j + 1] + 1
            {
                anchors.push((i, j));
                i += 1;
                j += 1;
            } else if suffix[i + 1][j] >= suffix[i][j + 1] {
                i += 1;
            } else {
                j += 1;
            }
        }
        anchors
    }

    fn match_moved(&mut self, anchors: &[(usize, usize)]) {
        for j in 0..self.new.len() {
            if self.new_to_old[j].is_some() {
                continue;
            }
            // Where this chunk would sit in the old document if nothing moved
            let expected = anchors
                .iter()
                .rev()
                .find(|(_, new_index)| *new_index < j)
                .map(|&(old_index, new_index)| old_index + (j - new_index))
                .unwrap_or(j);

            let fingerprint = self.new[j].fingerprint();
            let nearest = (0..self.old.len())
                .filter(|&i| !self.old_taken[i] && self.old[i].fingerprint() == fingerprint)
                .min_by_key(|&i| i.abs_diff(expected));
            if let Some(i) = nearest {
                self.link(i, j, true);
            }
        }
    }

    fn pair_gaps(&mut self, anchors: &[(usize, usize)]) {
        let mut bounds = Vec::with_capacity(anchors.len() + 2);
        bounds.push((None, None));
        bounds.extend(anchors.iter().map(|&(i, j)| (Some(i), Some(j))));
        bounds.push((None, None));

        for window in bounds.windows(2) {
            let (old_lo, new_lo) = window[0];
            let (old_hi, new_hi) = window[1];
            let old_range = old_lo.map_or(0, |i| i + 1)..old_hi.unwrap_or(self.old.len());
            let new_range = new_lo.map_or(0, |j| j + 1)..new_hi.unwrap_or(self.new.len());

            let old_free: Vec<usize> = old_range.filter(|&i| !self.old_taken[i]).collect();
            let new_free: Vec<usize> = new_range.filter(|&j| self.new_to_old[j].is_none()).collect();
            if old_free.is_empty() || new_free.is_empty() {
                continue;
            }
            for (i, j) in self.best_pairing(&old_free, &new_free) {
                self.link(i, j, false);
            }
        }
    }

    /// Order-preserving pairing of two candidate lists that maximizes the
    /// number of pairs, then the summed similarity.
    fn best_pairing(&self, old_free: &[usize], new_free: &[usize]) -> Vec<(usize, usize)> {
        let (n, m) = (old_free.len(), new_free.len());
        let mut best = vec![vec![(0usize, 0.0f64); m + 1]; n + 1];
        for a in 1..=n {
            for b in 1..=m {
                let mut cell = better(best[a - 1][b], best[a][b - 1]);
                let (old_chunk, new_chunk) = (&self.old[old_free[a - 1]], &self.new[new_free[b - 1]]);
                if pairable(old_chunk, new_chunk) {
                    let (pairs, score) = best[a - 1][b - 1];
                    cell = better(cell, (pairs + 1, score + similarity(old_chunk, new_chunk)));
                }
                best[a][b] = cell;
            }
        }

        let mut pairs = Vec::new();
        let (mut a, mut b) = (n, m);
        while a > 0 && b > 0 {
            if best[a][b] == best[a - 1][b] {
                a -= 1;
            } else if best[a][b] == best[a][b - 1] {
                b -= 1;
            } else {
                pairs.push((old_free[a - 1], new_free[b - 1]));
                a -= 1;
                b -= 1;
            }
        }
        pairs.reverse();
        pairs
    }
}

fn better(x: (usize, f64), y: (usize, f64)) -> (usize, f64) {
    if y.0 > x.0 || (y.0 == x.0 && y.1 > x.1) { y } else { x }
}

/// Verbatim chunks only pair with verbatim chunks.
fn pairable(old: &Chunk, new: &Chunk) -> bool {
    old.is_translatable() == new.is_translatable()
}

/// Word-set Jaccard similarity, with a bonus for keeping the same kind.
fn similarity(old: &Chunk, new: &Chunk) -> f64 {
    let words = |chunk: &Chunk| -> HashSet<String> {
        chunk
            .content
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect()
    };
    let (a, b) = (words(old), words(new));
    let union = a.union(&b).count();
    let jaccard = if union == 0 {
        1.0
    } else {
        a.intersection(&b).count() as f64 / union as f64
    };
    if old.kind == new.kind { jaccard + 0.5 } else { jaccard }
}
