//! Persistent question → embedding cache.
//!
//! [`CachedEmbedder`] sits between the store and the injected provider. It
//! loads every cached embedding at open, answers repeats from memory, and
//! writes new embeddings through to [`EmbeddingStorage`] before returning
//! them. A write-through failure is logged; the embedding is still returned
//! and kept in memory for this session.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info, instrument, warn};

use super::EmbeddingService;
use crate::error::{Result, SolveCacheError};
use crate::storage::EmbeddingStorage;
use crate::types::Embedding;

/// Embedding provider wrapped with an in-memory and on-disk cache.
pub struct CachedEmbedder {
    service: Box<dyn EmbeddingService>,
    cache: RwLock<HashMap<String, Embedding>>,
    storage: Box<dyn EmbeddingStorage>,
}

impl std::fmt::Debug for CachedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEmbedder")
            .field("dimension", &self.service.dimension())
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}

impl CachedEmbedder {
    /// Wraps `service`, preloading every embedding held by `storage`.
    #[instrument(skip(service, storage))]
    pub fn open(
        service: Box<dyn EmbeddingService>,
        storage: Box<dyn EmbeddingStorage>,
    ) -> Result<Self> {
        let cache: HashMap<String, Embedding> = storage.load_embeddings()?.into_iter().collect();
        info!(cached = cache.len(), "Embedding cache ready");
        Ok(Self {
            service,
            cache: RwLock::new(cache),
            storage,
        })
    }

    /// Returns the embedding of `text`, calling the provider on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`SolveCacheError::EmbeddingUnavailable`] if the provider
    /// fails or returns a vector of the wrong dimension.
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| SolveCacheError::index("embedding cache lock poisoned"))?;
            if let Some(embedding) = cache.get(text) {
                return Ok(embedding.clone());
            }
        }

        let embedding = self
            .service
            .embed(text)
            .map_err(|e| match e {
                SolveCacheError::EmbeddingUnavailable(_) => e,
                other => SolveCacheError::embedding_unavailable(other.to_string()),
            })?;
        self.service
            .validate_embedding(&embedding)
            .map_err(|e| SolveCacheError::embedding_unavailable(e.to_string()))?;

        if let Err(e) = self.storage.save_embedding(text, &embedding) {
            warn!(error = %e, "Failed to persist embedding; keeping it in memory only");
        }

        let mut cache = self
            .cache
            .write()
            .map_err(|_| SolveCacheError::index("embedding cache lock poisoned"))?;
        cache.insert(text.to_string(), embedding.clone());
        debug!(cached = cache.len(), "Embedding computed");
        Ok(embedding)
    }

    /// Embedding dimension of the wrapped provider.
    pub fn dimension(&self) -> usize {
        self.service.dimension()
    }

    /// Number of cached embeddings.
    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `text` has a cached embedding.
    pub fn contains(&self, text: &str) -> bool {
        self.cache
            .read()
            .map(|c| c.contains_key(text))
            .unwrap_or(false)
    }

    /// Closes the underlying storage.
    pub fn close(self) -> Result<()> {
        self.storage.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EmbeddingDimension};
    use crate::storage::RedbEmbeddingStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl EmbeddingService for Counting {
        fn embed(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SolveCacheError::agent("provider offline"));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn storage(dir: &std::path::Path) -> Box<dyn EmbeddingStorage> {
        let config = Config::with_dimension(EmbeddingDimension::Custom(2));
        Box::new(RedbEmbeddingStorage::open(dir.join("embeddings.redb"), &config).unwrap())
    }

    #[test]
    fn test_repeat_embed_hits_cache() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = CachedEmbedder::open(
            Box::new(Counting { calls: calls.clone(), fail: false }),
            storage(dir.path()),
        )
        .unwrap();

        let a = embedder.embed("what time is it").unwrap();
        let b = embedder.embed("what time is it").unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(embedder.contains("what time is it"));
    }

    #[test]
    fn test_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let embedder = CachedEmbedder::open(
            Box::new(Counting { calls: calls.clone(), fail: false }),
            storage(dir.path()),
        )
        .unwrap();
        embedder.embed("will it rain").unwrap();
        embedder.close().unwrap();

        let embedder = CachedEmbedder::open(
            Box::new(Counting { calls: calls.clone(), fail: true }),
            storage(dir.path()),
        )
        .unwrap();
        assert_eq!(embedder.len(), 1);
        // Served from disk even though the provider is now failing
        assert_eq!(embedder.embed("will it rain").unwrap(), vec![12.0, 1.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_provider_failure_is_embedding_unavailable() {
        let dir = tempdir().unwrap();
        let embedder = CachedEmbedder::open(
            Box::new(Counting { calls: Arc::new(AtomicUsize::new(0)), fail: true }),
            storage(dir.path()),
        )
        .unwrap();

        let err = embedder.embed("anything").unwrap_err();
        assert!(err.is_embedding_unavailable(), "got: {:?}", err);
        assert!(embedder.is_empty());
    }
}
