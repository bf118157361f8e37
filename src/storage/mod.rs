//! Storage layer abstractions for SolveCache.
//!
//! Persistence is split in two traits so each concern can be swapped or
//! mocked independently:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SnapshotStore                            │
//! │                    │             │                           │
//! │                    ▼             ▼                           │
//! │      ┌─────────────────┐  ┌──────────────────┐              │
//! │      │ SnapshotStorage │  │ EmbeddingStorage │  ← Traits     │
//! │      └─────────────────┘  └──────────────────┘              │
//! │               ▲                    ▲                         │
//! │               │                    │                         │
//! │   ┌───────────┴─────────┐  ┌───────┴──────────────┐         │
//! │   │ FileSnapshotStorage │  │ RedbEmbeddingStorage │         │
//! │   └─────────────────────┘  └──────────────────────┘         │
//! │      snapshots/*.json          embeddings.redb              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod files;
pub mod redb;
pub mod schema;

pub use self::files::FileSnapshotStorage;
pub use self::redb::RedbEmbeddingStorage;
pub use schema::{StoreMetadata, SCHEMA_VERSION};

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::snapshot::SolutionSnapshot;
use crate::types::Embedding;

/// Outcome of loading every snapshot file at startup.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Snapshots that decoded successfully, one per question.
    pub snapshots: Vec<SolutionSnapshot>,

    /// Files that were skipped: [`StorageError::CorruptSnapshotFile`] or
    /// [`StorageError::DuplicateSnapshotFile`].
    pub skipped: Vec<StorageError>,
}

impl LoadReport {
    /// Number of files skipped during load.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Durable storage for solution snapshots.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the store calls `save_snapshot`
/// while holding its own write lock, so implementations only need to guard
/// their internal bookkeeping.
pub trait SnapshotStorage: Send + Sync {
    /// Reads every snapshot record, skipping files that cannot be decoded
    /// or whose embeddings are not `dimension` long.
    ///
    /// Records whose synonym and blacklist sets overlap are reconciled with
    /// the blacklist winning. When two files carry the same question, the
    /// one with the newer `updated_at` is kept.
    fn load_all(&self, dimension: usize) -> Result<LoadReport>;

    /// Writes a snapshot, replacing any earlier record for its question.
    ///
    /// Returns the path the record was written to.
    fn save_snapshot(&self, snapshot: &SolutionSnapshot) -> Result<PathBuf>;

    /// Returns the snapshot directory, if applicable.
    fn path(&self) -> Option<&Path>;

    /// Releases the storage, including any directory lock.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Durable question → embedding cache.
///
/// Keys are the exact text that was embedded.
pub trait EmbeddingStorage: Send + Sync {
    /// Returns the cache metadata.
    fn metadata(&self) -> &StoreMetadata;

    /// Reads every cached embedding.
    fn load_embeddings(&self) -> Result<Vec<(String, Embedding)>>;

    /// Writes one embedding, overwriting any earlier value for `text`.
    fn save_embedding(&self, text: &str, embedding: &[f32]) -> Result<()>;

    /// Returns the database file path, if applicable.
    fn path(&self) -> Option<&Path>;

    /// Closes the storage, flushing pending writes.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens both storages under a store root directory.
///
/// # Errors
///
/// Returns an error if:
/// - The snapshot directory is locked by another process
/// - The embedding database is corrupted or locked
/// - Schema version doesn't match
/// - Embedding dimension doesn't match (for an existing database)
pub fn open_storage(
    root: impl AsRef<Path>,
    config: &Config,
) -> Result<(Box<dyn SnapshotStorage>, Box<dyn EmbeddingStorage>)> {
    let root = root.as_ref();
    let snapshots = FileSnapshotStorage::open(root.join(schema::SNAPSHOT_DIR))?;
    let embeddings = RedbEmbeddingStorage::open(root.join(schema::EMBEDDING_DB_FILE), config)?;
    Ok((Box::new(snapshots), Box::new(embeddings)))
}
