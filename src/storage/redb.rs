//! redb embedding cache implementation.
//!
//! Persists the question → embedding cache using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery
//!
//! Every insert commits its own write transaction, so an embedding that was
//! paid for survives a crash immediately after.

use std::path::{Path, PathBuf};

use ::redb::{Database, ReadableTable};
use tracing::{debug, info, instrument, warn};

use super::schema::{
    decode_embedding, encode_embedding, StoreMetadata, METADATA_KEY, METADATA_TABLE,
    QUESTION_EMBEDDINGS_TABLE, SCHEMA_VERSION,
};
use super::EmbeddingStorage;
use crate::config::{Config, EmbeddingDimension};
use crate::error::{Result, SolveCacheError, StorageError, ValidationError};
use crate::types::Embedding;

/// redb-backed question → embedding cache.
///
/// # Thread Safety
///
/// `RedbEmbeddingStorage` is `Send + Sync`. redb handles internal
/// synchronization using MVCC for readers and exclusive locking for writers.
#[derive(Debug)]
pub struct RedbEmbeddingStorage {
    /// The redb database handle.
    db: Database,

    /// Cached store metadata.
    metadata: StoreMetadata,

    /// Path to the database file.
    path: PathBuf,
}

impl RedbEmbeddingStorage {
    /// Opens or creates the embedding database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database file is corrupted
    /// - The database is locked by another process
    /// - Schema version doesn't match
    /// - Embedding dimension doesn't match (for existing databases)
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let db_exists = path.exists();

        debug!(db_exists = db_exists, "Opening embedding cache");

        let db = Self::create_database(path)?;

        if db_exists {
            Self::open_existing(db, path.to_path_buf(), config)
        } else {
            Self::initialize_new(db, path.to_path_buf(), config)
        }
    }

    fn create_database(path: &Path) -> Result<Database> {
        // redb has no typed variant for lock conflicts; match on the message.
        let db = Database::builder().create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                StorageError::DirectoryLocked(path.to_path_buf())
            } else {
                StorageError::Redb(e.to_string())
            }
        })?;

        debug!("Embedding database file opened");
        Ok(db)
    }

    #[instrument(skip(db, config), fields(path = %path.display()))]
    fn initialize_new(db: Database, path: PathBuf, config: &Config) -> Result<Self> {
        info!("Initializing new embedding cache");

        let metadata = StoreMetadata::new(config.embedding_dimension);

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;

            let _ = write_txn.open_table(QUESTION_EMBEDDINGS_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = SCHEMA_VERSION,
            dimension = config.embedding_dimension.size(),
            "Embedding cache initialized"
        );

        Ok(Self { db, metadata, path })
    }

    #[instrument(skip(db, config), fields(path = %path.display()))]
    fn open_existing(db: Database, path: PathBuf, config: &Config) -> Result<Self> {
        info!("Opening existing embedding cache");

        let read_txn = db.begin_read().map_err(StorageError::from)?;
        let mut metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let metadata_bytes = meta_table
                .get(METADATA_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("Missing store metadata"))?;

            bincode::deserialize::<StoreMetadata>(metadata_bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?
        };
        drop(read_txn);

        if !metadata.is_compatible() {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "Schema version mismatch"
            );
            return Err(SolveCacheError::Storage(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }));
        }

        if metadata.embedding_dimension.size() != config.embedding_dimension.size() {
            warn!(
                expected = config.embedding_dimension.size(),
                found = metadata.embedding_dimension.size(),
                "Embedding dimension mismatch"
            );
            return Err(SolveCacheError::Validation(
                ValidationError::DimensionMismatch {
                    expected: config.embedding_dimension.size(),
                    got: metadata.embedding_dimension.size(),
                },
            ));
        }

        metadata.touch();
        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
            let _ = write_txn.open_table(QUESTION_EMBEDDINGS_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = metadata.schema_version,
            dimension = metadata.embedding_dimension.size(),
            "Embedding cache opened"
        );

        Ok(Self { db, metadata, path })
    }

    /// Returns the embedding dimension this cache was created with.
    #[inline]
    pub fn embedding_dimension(&self) -> EmbeddingDimension {
        self.metadata.embedding_dimension
    }

    #[cfg(test)]
    pub(crate) fn database(&self) -> &Database {
        &self.db
    }
}

impl EmbeddingStorage for RedbEmbeddingStorage {
    fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    fn load_embeddings(&self) -> Result<Vec<(String, Embedding)>> {
        let dimension = self.metadata.embedding_dimension.size();
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(QUESTION_EMBEDDINGS_TABLE)?;

        let mut embeddings = Vec::new();
        for result in table.iter()? {
            let (key, value) = result.map_err(StorageError::from)?;
            let embedding = decode_embedding(value.value())?;
            if embedding.len() != dimension {
                warn!(
                    text = key.value(),
                    expected = dimension,
                    found = embedding.len(),
                    "Skipping cached embedding with wrong dimension"
                );
                continue;
            }
            embeddings.push((key.value().to_string(), embedding));
        }

        debug!(count = embeddings.len(), "Cached embeddings loaded");
        Ok(embeddings)
    }

    fn save_embedding(&self, text: &str, embedding: &[f32]) -> Result<()> {
        let bytes = encode_embedding(embedding);

        let write_txn = self.db.begin_write().map_err(StorageError::from)?;
        {
            let mut table = write_txn.open_table(QUESTION_EMBEDDINGS_TABLE)?;
            table.insert(text, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(text_len = text.len(), "Embedding cached");
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    #[instrument(skip(self))]
    fn close(self: Box<Self>) -> Result<()> {
        // redb flushes on drop.
        drop(self.db);
        info!("Embedding cache closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> Config {
        Config::with_dimension(EmbeddingDimension::Custom(3))
    }

    #[test]
    fn test_open_creates_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.redb");

        let storage = RedbEmbeddingStorage::open(&path, &config()).unwrap();
        assert!(path.exists());
        assert_eq!(storage.embedding_dimension(), EmbeddingDimension::Custom(3));
        assert_eq!(storage.metadata().schema_version, SCHEMA_VERSION);
        assert!(storage.load_embeddings().unwrap().is_empty());
    }

    #[test]
    fn test_embeddings_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.redb");

        let storage = RedbEmbeddingStorage::open(&path, &config()).unwrap();
        storage.save_embedding("what time is it", &[0.1, 0.2, 0.3]).unwrap();
        storage.save_embedding("will it rain", &[0.3, 0.2, 0.1]).unwrap();
        storage.save_embedding("will it rain", &[0.0, 0.0, 1.0]).unwrap();
        let created_at = storage.metadata().created_at;
        Box::new(storage).close().unwrap();

        let storage = RedbEmbeddingStorage::open(&path, &config()).unwrap();
        let mut loaded = storage.load_embeddings().unwrap();
        loaded.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            loaded,
            vec![
                ("what time is it".to_string(), vec![0.1, 0.2, 0.3]),
                ("will it rain".to_string(), vec![0.0, 0.0, 1.0]),
            ]
        );
        assert_eq!(storage.metadata().created_at, created_at);
        assert!(storage.metadata().last_opened_at >= created_at);
    }

    #[test]
    fn test_dimension_mismatch_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.redb");

        let storage = RedbEmbeddingStorage::open(&path, &config()).unwrap();
        Box::new(storage).close().unwrap();

        let other = Config::with_dimension(EmbeddingDimension::Custom(5));
        let err = RedbEmbeddingStorage::open(&path, &other).unwrap_err();
        assert!(
            matches!(
                err,
                SolveCacheError::Validation(ValidationError::DimensionMismatch {
                    expected: 5,
                    got: 3
                })
            ),
            "Expected DimensionMismatch, got: {:?}",
            err
        );
    }

    #[test]
    fn test_equivalent_dimension_reopens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.redb");

        let storage = RedbEmbeddingStorage::open(&path, &Config::default()).unwrap();
        storage.save_embedding("will it rain", &vec![0.5; 1536]).unwrap();
        Box::new(storage).close().unwrap();

        let custom = Config::with_dimension(EmbeddingDimension::Custom(1536));
        let storage = RedbEmbeddingStorage::open(&path, &custom).unwrap();
        assert_eq!(storage.embedding_dimension().size(), 1536);
        assert_eq!(storage.load_embeddings().unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_length_entry_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.redb");

        let storage = RedbEmbeddingStorage::open(&path, &config()).unwrap();
        storage.save_embedding("good", &[1.0, 0.0, 0.0]).unwrap();
        storage.save_embedding("short", &[1.0]).unwrap();

        let loaded = storage.load_embeddings().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "good");
    }

    // ====================================================================
    // Corruption Detection Tests
    // ====================================================================

    #[test]
    fn test_corruption_detection_invalid_metadata_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.redb");

        let storage = RedbEmbeddingStorage::open(&path, &config()).unwrap();
        let write_txn = storage.database().begin_write().unwrap();
        {
            let mut meta = write_txn.open_table(METADATA_TABLE).unwrap();
            meta.insert(METADATA_KEY, b"not-valid-bincode".as_slice())
                .unwrap();
        }
        write_txn.commit().unwrap();
        Box::new(storage).close().unwrap();

        let err = RedbEmbeddingStorage::open(&path, &config()).unwrap_err();
        match err {
            SolveCacheError::Storage(StorageError::Corrupted(msg)) => {
                assert!(
                    msg.contains("Invalid metadata format"),
                    "Error should mention invalid format, got: {}",
                    msg
                );
            }
            other => panic!("Expected StorageError::Corrupted, got: {:?}", other),
        }
    }

    #[test]
    fn test_corruption_detection_missing_metadata_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.redb");

        {
            let db = ::redb::Database::create(&path).unwrap();
            let write_txn = db.begin_write().unwrap();
            {
                let dummy: ::redb::TableDefinition<&str, &str> =
                    ::redb::TableDefinition::new("dummy");
                let mut table = write_txn.open_table(dummy).unwrap();
                table.insert("key", "value").unwrap();
            }
            write_txn.commit().unwrap();
        }

        let err = RedbEmbeddingStorage::open(&path, &config()).unwrap_err();
        match err {
            SolveCacheError::Storage(StorageError::Corrupted(msg)) => {
                assert!(
                    msg.contains("Cannot open metadata table"),
                    "Error should mention metadata table, got: {}",
                    msg
                );
            }
            other => panic!("Expected StorageError::Corrupted, got: {:?}", other),
        }
    }
}
