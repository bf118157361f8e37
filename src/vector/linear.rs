//! Linear-scan similarity index over solution snapshots.
//!
//! Three lookup paths, cheapest first:
//!
//! ```text
//! find_exact     question → snapshot                 HashMap, O(1)
//! find_synonym   synonym  → (canonical, score)       HashMap, O(1)
//! scan_*         query embedding vs every snapshot   O(n · dim)
//! ```
//!
//! Snapshot embeddings are normalized once on insert, so a scan is one dot
//! product per snapshot. The synonym table is derived from every snapshot's
//! `synonymous_questions` and is rebuilt whenever a snapshot changes.
//!
//! The scan has no index structure. That is fine for hundreds of snapshots;
//! past that, `benches/resolve.rs` shows where it stops being cheap.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{unit, unit_score};
use crate::search::ScoredSnapshot;
use crate::snapshot::SolutionSnapshot;

/// A snapshot with its unit-length embeddings.
#[derive(Clone, Debug)]
struct IndexedSnapshot {
    snapshot: SolutionSnapshot,
    question_unit: Option<Vec<f32>>,
    code_unit: Option<Vec<f32>>,
}

impl IndexedSnapshot {
    fn new(snapshot: SolutionSnapshot) -> Self {
        Self {
            question_unit: unit(&snapshot.question_embedding),
            code_unit: unit(&snapshot.code_embedding),
            snapshot,
        }
    }
}

/// Flattened synonym table entry.
#[derive(Clone, Debug, PartialEq)]
struct SynonymEntry {
    canonical: String,
    score: f32,
}

/// In-memory index of every snapshot in a store.
///
/// Not internally synchronized; the [`SnapshotStore`](crate::SnapshotStore)
/// guards it with a `RwLock`.
#[derive(Clone, Debug)]
pub struct SimilarityIndex {
    dimension: usize,
    snapshots: HashMap<String, IndexedSnapshot>,
    synonyms: HashMap<String, SynonymEntry>,
}

impl SimilarityIndex {
    /// Creates an empty index for embeddings of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            snapshots: HashMap::new(),
            synonyms: HashMap::new(),
        }
    }

    /// Builds an index from loaded snapshots.
    ///
    /// Later snapshots with the same question replace earlier ones.
    pub fn from_snapshots(
        dimension: usize,
        snapshots: impl IntoIterator<Item = SolutionSnapshot>,
    ) -> Self {
        let mut index = Self::new(dimension);
        for snapshot in snapshots {
            index
                .snapshots
                .insert(snapshot.question.clone(), IndexedSnapshot::new(snapshot));
        }
        index.rebuild_synonyms();
        index
    }

    /// Inserts or replaces a snapshot, returning the previous version.
    pub fn insert(&mut self, snapshot: SolutionSnapshot) -> Option<SolutionSnapshot> {
        let previous = self
            .snapshots
            .insert(snapshot.question.clone(), IndexedSnapshot::new(snapshot))
            .map(|entry| entry.snapshot);
        self.rebuild_synonyms();
        previous
    }

    /// Returns the snapshot whose question is exactly `question`.
    pub fn find_exact(&self, question: &str) -> Option<&SolutionSnapshot> {
        self.snapshots.get(question).map(|entry| &entry.snapshot)
    }

    /// Returns the snapshot that lists `question` as a synonym, with the
    /// score it was accepted at.
    pub fn find_synonym(&self, question: &str) -> Option<(&SolutionSnapshot, f32)> {
        let entry = self.synonyms.get(question)?;
        let snapshot = &self.snapshots.get(&entry.canonical)?.snapshot;
        if snapshot.is_blacklisted(question) {
            return None;
        }
        Some((snapshot, entry.score))
    }

    /// Scores `query` against every snapshot's question embedding.
    ///
    /// Snapshots that blacklist `question` are skipped before scoring.
    /// Results have `score >= threshold`, best first, at most `limit`.
    pub fn scan_questions(
        &self,
        question: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Vec<ScoredSnapshot> {
        self.scan(query, threshold, limit, |entry| {
            if entry.snapshot.is_blacklisted(question) {
                None
            } else {
                entry.question_unit.as_deref()
            }
        })
    }

    /// Scores `query` against every snapshot's code embedding.
    pub fn scan_code(&self, query: &[f32], threshold: f32, limit: usize) -> Vec<ScoredSnapshot> {
        self.scan(query, threshold, limit, |entry| entry.code_unit.as_deref())
    }

    fn scan<'a>(
        &'a self,
        query: &[f32],
        threshold: f32,
        limit: usize,
        target: impl Fn(&'a IndexedSnapshot) -> Option<&'a [f32]>,
    ) -> Vec<ScoredSnapshot> {
        if limit == 0 || query.len() != self.dimension {
            return Vec::new();
        }
        let Some(query) = unit(query) else {
            return Vec::new();
        };

        let mut hits: Vec<(f32, &IndexedSnapshot)> = self
            .snapshots
            .values()
            .filter_map(|entry| {
                let embedding = target(entry)?;
                let score = unit_score(&query, embedding)?;
                (score >= threshold).then_some((score, entry))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.snapshot.question.cmp(&b.1.snapshot.question))
        });
        hits.truncate(limit);

        debug!(
            candidates = self.snapshots.len(),
            hits = hits.len(),
            threshold = threshold,
            "Linear scan complete"
        );

        hits.into_iter()
            .map(|(score, entry)| ScoredSnapshot {
                score,
                snapshot: entry.snapshot.clone(),
            })
            .collect()
    }

    /// Rebuilds the flattened synonym table from every snapshot.
    ///
    /// A synonym that its own snapshot blacklists is left out. When two
    /// snapshots claim the same synonym, the higher score wins.
    pub fn rebuild_synonyms(&mut self) {
        let mut synonyms: HashMap<String, SynonymEntry> = HashMap::new();

        let mut canonicals: Vec<&String> = self.snapshots.keys().collect();
        canonicals.sort();

        for canonical in canonicals {
            let snapshot = &self.snapshots[canonical].snapshot;
            for (question, &score) in &snapshot.synonymous_questions {
                if snapshot.is_blacklisted(question) || self.snapshots.contains_key(question) {
                    continue;
                }
                match synonyms.get(question) {
                    Some(existing) if existing.score >= score => {
                        warn!(
                            synonym = %question,
                            kept = %existing.canonical,
                            dropped = %canonical,
                            "Synonym claimed by two snapshots"
                        );
                    }
                    Some(existing) => {
                        warn!(
                            synonym = %question,
                            kept = %canonical,
                            dropped = %existing.canonical,
                            "Synonym claimed by two snapshots"
                        );
                        synonyms.insert(
                            question.clone(),
                            SynonymEntry {
                                canonical: canonical.clone(),
                                score,
                            },
                        );
                    }
                    None => {
                        synonyms.insert(
                            question.clone(),
                            SynonymEntry {
                                canonical: canonical.clone(),
                                score,
                            },
                        );
                    }
                }
            }
        }

        self.synonyms = synonyms;
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if the index holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Number of entries in the synonym table.
    pub fn synonym_count(&self) -> usize {
        self.synonyms.len()
    }

    /// All canonical questions, sorted.
    pub fn questions(&self) -> Vec<String> {
        let mut questions: Vec<String> = self.snapshots.keys().cloned().collect();
        questions.sort();
        questions
    }

    /// Embedding dimension this index accepts.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}
