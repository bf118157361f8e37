//! Solution snapshot module.
//!
//! A **snapshot** is a cached (question → code → outcome) record. Snapshots
//! are created on the first successful agent run for an unseen question and
//! are mutated only through the [`SnapshotStore`](crate::SnapshotStore):
//!
//! - [`add_synonym(snapshot, question, score)`](crate::SnapshotStore::add_synonym)
//! - [`blacklist(snapshot, question)`](crate::SnapshotStore::blacklist)
//! - [`replace_code(snapshot, code)`](crate::SnapshotStore::replace_code)
//! - [`record_run(snapshot, success, latency, answer)`](crate::SnapshotStore::record_run)
//!
//! The pipeline never deletes snapshots; removing a file is an operator action.

pub mod types;

pub use types::{GeneratedCode, RuntimeStats, SolutionSnapshot};

use crate::error::{SolveCacheError, ValidationError};
use crate::storage::schema::{MAX_CODE_STATEMENTS, MAX_QUESTION_SIZE};

/// Validates a snapshot before it is persisted.
///
/// # Rules
///
/// - `question`: non-empty, max 4 KB
/// - `question_embedding`, `code_embedding`: length equals `dimension`
/// - `code`: not empty, at most 10 000 statements
/// - synonym scores: finite, 0–100
/// - synonym and blacklist sets: disjoint
pub(crate) fn validate_snapshot(
    snapshot: &SolutionSnapshot,
    dimension: usize,
) -> Result<(), SolveCacheError> {
    if snapshot.question.is_empty() {
        return Err(ValidationError::required_field("question").into());
    }

    if snapshot.question.len() > MAX_QUESTION_SIZE {
        return Err(
            ValidationError::content_too_large(snapshot.question.len(), MAX_QUESTION_SIZE).into(),
        );
    }

    if snapshot.question_embedding.len() != dimension {
        return Err(
            ValidationError::dimension_mismatch(dimension, snapshot.question_embedding.len())
                .into(),
        );
    }

    if snapshot.code_embedding.len() != dimension {
        return Err(
            ValidationError::dimension_mismatch(dimension, snapshot.code_embedding.len()).into(),
        );
    }

    if snapshot.code.is_empty() {
        return Err(ValidationError::required_field("code").into());
    }

    if snapshot.code.statements.len() > MAX_CODE_STATEMENTS {
        return Err(ValidationError::invalid_field(
            "code",
            format!(
                "at most {} statements allowed, got {}",
                MAX_CODE_STATEMENTS,
                snapshot.code.statements.len()
            ),
        )
        .into());
    }

    for (question, score) in &snapshot.synonymous_questions {
        if !score.is_finite() || !(0.0..=100.0).contains(score) {
            return Err(ValidationError::invalid_field(
                "synonymous_questions",
                format!("score for '{}' must be between 0 and 100, got {}", question, score),
            )
            .into());
        }
        if snapshot.non_synonymous_questions.contains(question) {
            return Err(ValidationError::blacklist_conflict(question, &snapshot.question).into());
        }
    }

    Ok(())
}
