//! Embedding service abstractions for SolveCache.
//!
//! Embeddings are dense vector representations of text. SolveCache never
//! computes them itself: the caller injects an [`EmbeddingService`] (a hosted
//! API client, a local model, a lookup table in tests) and the store wraps it
//! in a [`CachedEmbedder`] so every distinct text is embedded at most once.
//!
//! ```text
//!   question text ──► CachedEmbedder ──hit──► Embedding
//!                          │
//!                         miss
//!                          ▼
//!                  EmbeddingService::embed ──► write-through to embeddings.redb
//! ```

pub mod cache;

pub use cache::CachedEmbedder;

use crate::error::{Result, SolveCacheError, ValidationError};
use crate::types::Embedding;

/// Embedding service trait for generating vector representations of text.
///
/// Implementations must be thread-safe (`Send + Sync`); the store may embed
/// from the dispatcher and the consumer at the same time.
///
/// # Implementing a Custom Provider
///
/// ```rust,ignore
/// use solvecache::{EmbeddingService, Embedding, Result, SolveCacheError};
///
/// struct HostedEmbeddings {
///     client: MyApiClient,
/// }
///
/// impl EmbeddingService for HostedEmbeddings {
///     fn embed(&self, text: &str) -> Result<Embedding> {
///         self.client
///             .embed(text)
///             .map_err(|e| SolveCacheError::embedding_unavailable(e.to_string()))
///     }
///
///     fn dimension(&self) -> usize {
///         1536
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Any error is reported to callers as
    /// [`SolveCacheError::EmbeddingUnavailable`].
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for multiple texts, in input order.
    ///
    /// The default calls [`embed`](Self::embed) once per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Returns the dimension of embeddings produced by this service.
    fn dimension(&self) -> usize;

    /// Validates that an embedding has the correct dimension.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if dimensions don't match.
    fn validate_embedding(&self, embedding: &Embedding) -> Result<()> {
        let expected = self.dimension();
        let actual = embedding.len();

        if actual != expected {
            return Err(SolveCacheError::Validation(
                ValidationError::dimension_mismatch(expected, actual),
            ));
        }

        Ok(())
    }
}
