//! Configuration types for SolveCache.
//!
//! The [`Config`] struct controls cache and pipeline behavior including:
//! - Embedding dimension (must match the injected provider)
//! - Similarity threshold and candidate limit used by `resolve`
//! - Consumer loop tick and the model escalation ladder
//!
//! # Example
//! ```rust
//! use solvecache::{Config, EmbeddingDimension};
//!
//! // Use defaults (1536 dimensions, threshold 90)
//! let config = Config::default();
//!
//! // Customize
//! let config = Config {
//!     embedding_dimension: EmbeddingDimension::D768,
//!     similarity_threshold: 85.0,
//!     fallback_models: vec!["large-coder".into()],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Cache and pipeline configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use solvecache::Config;
///
/// let config = Config {
///     match_limit: 10,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Embedding vector dimension (must match provider output).
    pub embedding_dimension: EmbeddingDimension,

    /// Minimum similarity score (0–100, inclusive) for a cached solution to
    /// be reused for a new question.
    pub similarity_threshold: f32,

    /// Maximum number of candidates kept by a similarity scan.
    pub match_limit: usize,

    /// How long the consumer sleeps when the Todo queue is empty.
    pub tick_interval: Duration,

    /// Model used for the first code generation attempt of a cold job.
    pub primary_model: String,

    /// Ordered fallback models tried once each after the primary fails.
    pub fallback_models: Vec<String>,

    /// What happens to recorded synonyms when a snapshot's code is replaced.
    pub synonym_policy: SynonymPolicy,

    /// Whether escalation attempts are written to the transcript directory.
    pub record_transcripts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // 1536 matches the common hosted embedding models
            embedding_dimension: EmbeddingDimension::D1536,
            similarity_threshold: 90.0,
            match_limit: 5,
            tick_interval: Duration::from_millis(250),
            primary_model: "default".to_string(),
            fallback_models: Vec::new(),
            synonym_policy: SynonymPolicy::Invalidate,
            record_transcripts: true,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config for the given embedding dimension.
    ///
    /// # Example
    /// ```rust
    /// use solvecache::{Config, EmbeddingDimension};
    ///
    /// let config = Config::with_dimension(EmbeddingDimension::Custom(8));
    /// assert_eq!(config.dimension(), 8);
    /// ```
    pub fn with_dimension(dimension: EmbeddingDimension) -> Self {
        Self {
            embedding_dimension: dimension,
            ..Default::default()
        }
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `SnapshotStore::open()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `similarity_threshold` is outside 0–100 or not finite
    /// - `match_limit` is 0
    /// - `tick_interval` is zero
    /// - `primary_model` or any fallback model name is empty
    /// - Custom dimension is 0 or > 4096
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.similarity_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.similarity_threshold)
        {
            return Err(ValidationError::invalid_field(
                "similarity_threshold",
                format!(
                    "must be between 0 and 100, got {}",
                    self.similarity_threshold
                ),
            ));
        }

        if self.match_limit == 0 {
            return Err(ValidationError::invalid_field(
                "match_limit",
                "must be greater than 0",
            ));
        }

        if self.tick_interval.is_zero() {
            return Err(ValidationError::invalid_field(
                "tick_interval",
                "must be greater than 0",
            ));
        }

        if self.primary_model.trim().is_empty() {
            return Err(ValidationError::required_field("primary_model"));
        }

        if let Some(i) = self
            .fallback_models
            .iter()
            .position(|m| m.trim().is_empty())
        {
            return Err(ValidationError::invalid_field(
                "fallback_models",
                format!("model name at index {} is empty", i),
            ));
        }

        if let EmbeddingDimension::Custom(dim) = self.embedding_dimension {
            if dim == 0 {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    "custom dimension must be greater than 0",
                ));
            }
            if dim > 4096 {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    "custom dimension must not exceed 4096",
                ));
            }
        }

        Ok(())
    }

    /// Returns the embedding dimension as a numeric value.
    pub fn dimension(&self) -> usize {
        self.embedding_dimension.size()
    }
}

/// Embedding vector dimensions.
///
/// Standard dimensions are provided for common models. Use `Custom` for
/// other embedding services.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingDimension {
    /// 384 dimensions (all-MiniLM-L6-v2).
    D384,

    /// 768 dimensions (bge-base-en-v1.5, BERT-base).
    D768,

    /// 1536 dimensions (hosted ada-style embedding models).
    #[default]
    D1536,

    /// Custom dimension for other embedding models.
    ///
    /// Must be between 1 and 4096.
    Custom(usize),
}

impl EmbeddingDimension {
    /// Returns the numeric size of this dimension.
    ///
    /// # Example
    /// ```rust
    /// use solvecache::EmbeddingDimension;
    ///
    /// assert_eq!(EmbeddingDimension::D384.size(), 384);
    /// assert_eq!(EmbeddingDimension::D1536.size(), 1536);
    /// assert_eq!(EmbeddingDimension::Custom(64).size(), 64);
    /// ```
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Self::D384 => 384,
            Self::D768 => 768,
            Self::D1536 => 1536,
            Self::Custom(n) => *n,
        }
    }
}

/// Treatment of a snapshot's synonyms when its code is replaced.
///
/// A synonym was accepted because the new question was judged equivalent to
/// the canonical one *and* the cached code answered it. Once the code is
/// rewritten the second half no longer holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynonymPolicy {
    /// Drop all recorded synonyms; they are re-learned on the next matches.
    #[default]
    Invalidate,

    /// Keep synonyms and their original acceptance scores.
    Retain,
}

impl SynonymPolicy {
    /// Returns true if synonyms are cleared on code replacement.
    pub fn invalidates(&self) -> bool {
        matches!(self, Self::Invalidate)
    }
}
