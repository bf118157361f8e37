//! Error types for SolveCache.
//!
//! SolveCache uses a hierarchical error system:
//! - `SolveCacheError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `ValidationError`,
//!   `GenerationError`) provide detail
//!
//! Two outcomes are deliberately *not* errors: a cache miss is
//! [`MatchResult::NotFound`](crate::MatchResult::NotFound), and a single
//! failed model attempt is recovered inside the
//! [`RetryEscalator`](crate::RetryEscalator).
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use solvecache::{Config, Result, SnapshotStore};
//!
//! fn example(embedder: Box<dyn solvecache::EmbeddingService>) -> Result<()> {
//!     let store = SnapshotStore::open("./cache", Config::default(), embedder)?;
//!     // ... operations that may fail ...
//!     store.close()?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SolveCache operations.
pub type Result<T> = std::result::Result<T, SolveCacheError>;

/// Top-level error enum for all SolveCache operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum SolveCacheError {
    /// Storage layer error (I/O, corruption, transactions).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Requested entity not found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The embedding provider could not produce a vector.
    ///
    /// Callers on the submission path treat this as a cache miss.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// In-memory similarity index error (e.g. a poisoned lock).
    #[error("Similarity index error: {0}")]
    Index(String),

    /// An agent failed outside of code generation proper.
    #[error("Agent error: {0}")]
    Agent(String),

    /// Code generation or execution failed.
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// Another thread is already draining the Todo queue.
    #[error("A consumer loop is already running")]
    ConsumerBusy,
}

impl SolveCacheError {
    /// Creates an embedding-unavailable error with the given message.
    pub fn embedding_unavailable(msg: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(msg.into())
    }

    /// Creates a similarity index error with the given message.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Creates an agent error with the given message.
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the embedding provider was unavailable.
    pub fn is_embedding_unavailable(&self) -> bool {
        matches!(self, Self::EmbeddingUnavailable(_))
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the snapshot directory or the
/// embedding cache database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Stored data is corrupted.
    #[error("Storage corrupted: {0}")]
    Corrupted(String),

    /// A single snapshot file could not be decoded.
    ///
    /// Raised per file during load; the store skips the file and continues.
    #[error("Corrupt snapshot file {path}: {reason}")]
    CorruptSnapshotFile {
        /// Path of the offending file.
        path: PathBuf,
        /// Why it could not be loaded.
        reason: String,
    },

    /// Two snapshot files hold the same question; the older one is ignored.
    #[error("Duplicate snapshot file {path}: superseded by {kept}")]
    DuplicateSnapshotFile {
        /// Path of the ignored file.
        path: PathBuf,
        /// Path of the file that was loaded instead.
        kept: PathBuf,
    },

    /// The snapshot directory is locked by another process.
    #[error("Snapshot directory is locked by another writer: {0}")]
    DirectoryLocked(PathBuf),

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// Stored schema version doesn't match the expected version.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version.
        expected: u32,
        /// Actual schema version found in storage.
        found: u32,
    },
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a corrupt snapshot file error.
    pub fn corrupt_snapshot(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptSnapshotFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a duplicate snapshot file error.
    pub fn duplicate_snapshot(path: impl Into<PathBuf>, kept: impl Into<PathBuf>) -> Self {
        Self::DuplicateSnapshotFile {
            path: path.into(),
            kept: kept.into(),
        }
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Redb(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("Storage error: {}", err))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to SolveCacheError for convenience
impl From<redb::Error> for SolveCacheError {
    fn from(err: redb::Error) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for SolveCacheError {
    fn from(err: redb::DatabaseError) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for SolveCacheError {
    fn from(err: redb::TransactionError) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for SolveCacheError {
    fn from(err: redb::CommitError) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for SolveCacheError {
    fn from(err: redb::TableError) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for SolveCacheError {
    fn from(err: redb::StorageError) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for SolveCacheError {
    fn from(err: bincode::Error) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

impl From<serde_json::Error> for SolveCacheError {
    fn from(err: serde_json::Error) -> Self {
        SolveCacheError::Storage(StorageError::from(err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Embedding dimension doesn't match the configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension from configuration.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// Content exceeds maximum allowed size.
    #[error("Content too large: {size} bytes (max: {max} bytes)")]
    ContentTooLarge {
        /// Actual content size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// A question is both a synonym and blacklisted on the same snapshot.
    #[error("Question '{question}' is both synonym and blacklisted on snapshot '{snapshot}'")]
    BlacklistConflict {
        /// The conflicting question.
        question: String,
        /// The snapshot's canonical question.
        snapshot: String,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a content too large error.
    pub fn content_too_large(size: usize, max: usize) -> Self {
        Self::ContentTooLarge { size, max }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a blacklist conflict error.
    pub fn blacklist_conflict(question: impl Into<String>, snapshot: impl Into<String>) -> Self {
        Self::BlacklistConflict {
            question: question.into(),
            snapshot: snapshot.into(),
        }
    }
}

/// Not found errors for specific entity types.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// No snapshot is stored under the given question.
    #[error("Snapshot not found: {0}")]
    Snapshot(String),
}

impl NotFoundError {
    /// Creates a snapshot not found error.
    pub fn snapshot(question: impl ToString) -> Self {
        Self::Snapshot(question.to_string())
    }
}

/// Failures inside the generate → run cycle.
///
/// The first two variants are per-attempt and are recovered by trying the
/// next fallback model. Only `AllModelsExhausted` leaves the escalator,
/// and the consumer dead-letters the job.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The agent could not produce code with this model.
    #[error("Code generation failed with model '{model}': {reason}")]
    CodeGenerationFailed {
        /// Model that was asked.
        model: String,
        /// Error reported by the agent.
        reason: String,
    },

    /// Generated code ran but exited unsuccessfully.
    #[error("Code execution failed with model '{model}' (exit code {exit_code})")]
    CodeExecutionFailed {
        /// Model that produced the code.
        model: String,
        /// Process exit code.
        exit_code: i32,
        /// Captured stdout/stderr.
        output: String,
    },

    /// Every configured model was tried once and none succeeded.
    #[error("All models exhausted after {attempts} attempt(s): {last_error}")]
    AllModelsExhausted {
        /// Number of generate/run cycles performed.
        attempts: usize,
        /// Description of the final failure.
        last_error: String,
        /// Program output captured from the final attempt.
        last_output: String,
    },
}

impl GenerationError {
    /// Returns the captured program output, if this error carries any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::CodeExecutionFailed { output, .. } => Some(output),
            Self::AllModelsExhausted { last_output, .. } => Some(last_output),
            Self::CodeGenerationFailed { .. } => None,
        }
    }
}
