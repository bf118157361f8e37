//! Type definitions for solution snapshots.
//!
//! A **snapshot** is the unit of caching: one normalized question, the code
//! that answered it, both embeddings, and the bookkeeping that decides which
//! *other* questions may reuse that code.
//!
//! # Synonyms and Blacklist
//!
//! ```text
//! synonymous_questions      question → score at which it was accepted
//! non_synonymous_questions  questions rejected despite high similarity
//! ```
//!
//! The two sets are disjoint. Blacklisting a synonym moves it across; a
//! blacklisted question cannot be re-added as a synonym.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;
use crate::types::{Embedding, Timestamp};

// ============================================================================
// GeneratedCode
// ============================================================================

/// A generated program: its statements, a one-line invocation example, and
/// the declared return type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// Ordered program statements (one source line each).
    pub statements: Vec<String>,

    /// One-line invocation, appended after the statements when run.
    pub example: String,

    /// Declared return type tag (e.g. "pandas.DataFrame", "str").
    pub return_type: String,
}

impl GeneratedCode {
    /// Creates generated code from its parts.
    pub fn new(
        statements: Vec<String>,
        example: impl Into<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            statements,
            example: example.into(),
            return_type: return_type.into(),
        }
    }

    /// Full program text: statements followed by the invocation example.
    ///
    /// This is also the text whose embedding becomes the snapshot's
    /// `code_embedding`.
    pub fn source(&self) -> String {
        let mut source = self.statements.join("\n");
        if !self.example.is_empty() {
            if !source.is_empty() {
                source.push('\n');
            }
            source.push_str(&self.example);
        }
        source
    }

    /// Returns true if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.statements.iter().all(|s| s.trim().is_empty()) && self.example.trim().is_empty()
    }
}

// ============================================================================
// RuntimeStats
// ============================================================================

/// Execution history of a snapshot's code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Latency of the most recent run in milliseconds.
    pub last_latency_ms: u64,

    /// Whether the most recent run succeeded.
    pub last_success: bool,

    /// When the code last ran.
    pub last_run_at: Option<Timestamp>,

    /// Successful runs since creation.
    pub success_count: u32,

    /// Failed runs since creation.
    pub failure_count: u32,
}

// ============================================================================
// SolutionSnapshot
// ============================================================================

/// A cached (question → code → outcome) record.
///
/// Fields are public for reading and for building snapshots in tests and
/// offline tooling. Changes made to a stored snapshot go through the
/// mutation methods ([`add_synonym`](Self::add_synonym),
/// [`blacklist`](Self::blacklist), [`replace_code`](Self::replace_code),
/// [`record_run`](Self::record_run)) via the
/// [`SnapshotStore`](crate::SnapshotStore), which persists the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionSnapshot {
    /// Canonical normalized question (unique within a store).
    pub question: String,

    /// Embedding of `question`.
    pub question_embedding: Embedding,

    /// The generated program.
    pub code: GeneratedCode,

    /// Embedding of `code.source()`.
    pub code_embedding: Embedding,

    /// Questions accepted as equivalent, with the score they were accepted at.
    #[serde(default)]
    pub synonymous_questions: BTreeMap<String, f32>,

    /// Questions explicitly rejected as equivalent.
    #[serde(default)]
    pub non_synonymous_questions: BTreeSet<String>,

    /// Agent that produced the code; also formats replayed output.
    pub agent: AgentKind,

    /// When the snapshot was first created.
    pub created_at: Timestamp,

    /// Last explicit mutation.
    pub updated_at: Timestamp,

    /// Number of times the code has been executed.
    pub run_counter: u32,

    /// Identifier derived from `run_counter` and the last run/mutation time.
    pub id_hash: String,

    /// Execution history.
    #[serde(default)]
    pub runtime_stats: RuntimeStats,

    /// Formatted answer from the most recent successful run.
    #[serde(default)]
    pub last_answer: Option<String>,
}

impl SolutionSnapshot {
    /// Creates a snapshot for a freshly solved question.
    pub fn new(
        question: impl Into<String>,
        question_embedding: Embedding,
        code: GeneratedCode,
        code_embedding: Embedding,
        agent: AgentKind,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            question: question.into(),
            question_embedding,
            code,
            code_embedding,
            synonymous_questions: BTreeMap::new(),
            non_synonymous_questions: BTreeSet::new(),
            agent,
            created_at: now,
            updated_at: now,
            run_counter: 0,
            id_hash: id_hash(0, now),
            runtime_stats: RuntimeStats::default(),
            last_answer: None,
        }
    }

    /// Returns true if `question` has been rejected for this snapshot.
    pub fn is_blacklisted(&self, question: &str) -> bool {
        self.non_synonymous_questions.contains(question)
    }

    /// Returns the acceptance score of a synonym, if recorded.
    pub fn synonym_score(&self, question: &str) -> Option<f32> {
        self.synonymous_questions.get(question).copied()
    }

    /// Records `question` as equivalent to this snapshot.
    ///
    /// Returns `false` (and changes nothing) if the question is the
    /// canonical question itself or is blacklisted. Re-adding an existing
    /// synonym keeps the higher score.
    pub fn add_synonym(&mut self, question: &str, score: f32) -> bool {
        if question == self.question || self.is_blacklisted(question) {
            return false;
        }
        let entry = self
            .synonymous_questions
            .entry(question.to_string())
            .or_insert(score);
        if score > *entry {
            *entry = score;
        }
        self.touch();
        true
    }

    /// Rejects `question` for this snapshot, removing it from the synonyms.
    ///
    /// Returns `false` if it was already blacklisted or is the canonical
    /// question.
    pub fn blacklist(&mut self, question: &str) -> bool {
        if question == self.question {
            return false;
        }
        self.synonymous_questions.remove(question);
        let inserted = self.non_synonymous_questions.insert(question.to_string());
        if inserted {
            self.touch();
        }
        inserted
    }

    /// Replaces the code and its embedding.
    ///
    /// The caller supplies the embedding of `code.source()`; the store
    /// computes it before calling this, so the two never diverge. When
    /// `invalidate_synonyms` is set, all recorded synonyms are dropped.
    pub fn replace_code(
        &mut self,
        code: GeneratedCode,
        code_embedding: Embedding,
        invalidate_synonyms: bool,
    ) {
        self.code = code;
        self.code_embedding = code_embedding;
        if invalidate_synonyms {
            self.synonymous_questions.clear();
        }
        self.touch();
    }

    /// Records the outcome of one execution of this snapshot's code.
    pub fn record_run(&mut self, success: bool, latency: Duration, answer: Option<String>) {
        let now = Timestamp::now();
        self.run_counter = self.run_counter.saturating_add(1);
        self.runtime_stats.last_latency_ms = latency.as_millis() as u64;
        self.runtime_stats.last_success = success;
        self.runtime_stats.last_run_at = Some(now);
        if success {
            self.runtime_stats.success_count = self.runtime_stats.success_count.saturating_add(1);
            if answer.is_some() {
                self.last_answer = answer;
            }
        } else {
            self.runtime_stats.failure_count = self.runtime_stats.failure_count.saturating_add(1);
        }
        self.id_hash = id_hash(self.run_counter, now);
    }

    /// Removes questions that appear in both sets, keeping them blacklisted.
    ///
    /// Returns the questions that were removed from the synonyms.
    pub fn reconcile(&mut self) -> Vec<String> {
        let conflicts: Vec<String> = self
            .synonymous_questions
            .keys()
            .filter(|q| self.non_synonymous_questions.contains(*q))
            .cloned()
            .collect();
        for question in &conflicts {
            self.synonymous_questions.remove(question);
        }
        conflicts
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
        self.id_hash = id_hash(self.run_counter, self.updated_at);
    }
}

/// Derives the snapshot identifier from its run counter and a timestamp.
fn id_hash(run_counter: u32, at: Timestamp) -> String {
    format!("{:08x}{:012x}", run_counter, at.as_millis())
}
