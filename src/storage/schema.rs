//! On-disk layout, table definitions and versioning.
//!
//! A store root directory contains:
//!
//! ```text
//! <root>/
//! ├── snapshots/
//! │   ├── .lock                                 advisory writer lock (fs2)
//! │   ├── what-concerts-do-i-have-this-week-0.json
//! │   └── ...                                   one JSON record per snapshot
//! ├── embeddings.redb                           question → embedding cache
//! └── transcripts/                              escalation attempt logs
//! ```
//!
//! # Embedding Cache Tables
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                               │
//! │   Key: &str                                                  │
//! │   Value: &[u8] (bincode)                                     │
//! │   Entries: "store_metadata" -> StoreMetadata                 │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ QUESTION_EMBEDDINGS_TABLE                                    │
//! │   Key: &str (exact text that was embedded)                   │
//! │   Value: &[u8] (little-endian f32 bytes, dimension * 4)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata table and in every snapshot
//! file. A mismatched embedding database refuses to open; a mismatched
//! snapshot file is skipped like any other corrupt file.

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingDimension;
use crate::error::StorageError;
use crate::types::Timestamp;

/// Current schema version.
///
/// Increment this when making breaking changes to either on-disk format.
pub const SCHEMA_VERSION: u32 = 1;

/// Subdirectory holding snapshot files.
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Extension of snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "json";

/// Advisory lock file inside the snapshot directory.
pub const LOCK_FILE: &str = ".lock";

/// File name of the embedding cache database.
pub const EMBEDDING_DB_FILE: &str = "embeddings.redb";

/// Subdirectory for escalation transcripts.
pub const TRANSCRIPT_DIR: &str = "transcripts";

/// Maximum number of characters of a question used in a file name.
pub const MAX_SLUG_LENGTH: usize = 64;

/// Maximum question size in bytes (4 KB).
pub const MAX_QUESTION_SIZE: usize = 4 * 1024;

/// Maximum number of statements in a generated program.
pub const MAX_CODE_STATEMENTS: usize = 10_000;

/// Metadata key in the metadata table.
pub const METADATA_KEY: &str = "store_metadata";

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for store-level information.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Question → embedding cache.
///
/// Key: the exact text passed to the embedding provider
/// Value: raw little-endian f32 bytes
pub const QUESTION_EMBEDDINGS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("question_embeddings");

// ============================================================================
// Store Metadata
// ============================================================================

/// Embedding cache metadata stored in the metadata table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Embedding dimension this store was created with.
    ///
    /// Once set, this cannot be changed without recreating the store.
    pub embedding_dimension: EmbeddingDimension,

    /// Timestamp when the store was created.
    pub created_at: Timestamp,

    /// Last time the store was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl StoreMetadata {
    /// Creates new metadata for a fresh store.
    pub fn new(embedding_dimension: EmbeddingDimension) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            embedding_dimension,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Checks if this metadata is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

// ============================================================================
// Vector Encoding Helpers
// ============================================================================

/// Encodes an embedding as little-endian f32 bytes.
#[inline]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decodes little-endian f32 bytes back into an embedding.
///
/// # Errors
///
/// Returns `StorageError::Corrupted` if the byte length is not a multiple of 4.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, StorageError> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::corrupted(format!(
            "embedding byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
