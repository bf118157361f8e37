//! Match results returned by snapshot lookups.
//!
//! A lookup either finds a snapshot (and says *how* it matched) or misses.
//! A miss is an ordinary outcome, not an error.

use crate::snapshot::SolutionSnapshot;

/// How a question was matched to a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// The normalized question equals the snapshot's question.
    Exact,

    /// The question is a recorded synonym of the snapshot.
    Synonym,

    /// The question's embedding scored at or above the threshold.
    Similar,
}

impl MatchKind {
    /// Returns true for [`MatchKind::Exact`].
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact)
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exact => "exact",
            Self::Synonym => "synonym",
            Self::Similar => "similar",
        };
        f.write_str(s)
    }
}

/// A snapshot paired with its similarity score (0–100).
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredSnapshot {
    /// Similarity score, 0–100.
    pub score: f32,

    /// The matching snapshot.
    pub snapshot: SolutionSnapshot,
}

/// A successful lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotMatch {
    /// How the question matched.
    pub kind: MatchKind,

    /// Score of the match. Always 100 for [`MatchKind::Exact`].
    pub score: f32,

    /// The matching snapshot.
    pub snapshot: SolutionSnapshot,
}

/// Outcome of [`SnapshotStore::resolve`](crate::SnapshotStore::resolve).
#[derive(Clone, Debug, PartialEq)]
pub enum MatchResult {
    /// A cached solution applies to the question.
    Found(SnapshotMatch),

    /// Nothing cached applies; the question needs a fresh solution.
    NotFound,
}

impl MatchResult {
    /// Returns the match, if any.
    pub fn found(self) -> Option<SnapshotMatch> {
        match self {
            Self::Found(m) => Some(m),
            Self::NotFound => None,
        }
    }

    /// Returns true if nothing matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
