//! # SolveCache
//!
//! A semantic solution cache for code-generating assistant agents.
//!
//! Questions are normalized, embedded, and matched against previously
//! solved questions. A hit replays the cached program instead of asking a
//! model to write a new one; a miss routes the question to a domain agent,
//! runs the generated code, escalates through fallback models on failure,
//! and caches the first working program as a new snapshot.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use solvecache::prelude::*;
//!
//! // Open (or create) a store backed by your embedding provider
//! let store = Arc::new(SnapshotStore::open("./cache", Config::default(), Box::new(provider))?);
//!
//! // Wire agents, a router and an executor into a pipeline
//! let pipeline = Pipeline::new(
//!     store.clone(),
//!     AgentSet::from_fn(|kind| make_agent(kind)),
//!     Box::new(KeywordRouter::default()),
//!     Box::new(ProcessExecutor::default()),
//! )?;
//!
//! // Producers submit; one consumer runs jobs
//! let receipt = pipeline.submit("What concerts do I have this week?")?;
//! let report = pipeline.run_once()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Snapshot
//!
//! A **snapshot** is one solved question: its normalized text, the program
//! that answered it, embeddings of both, and two bookkeeping sets:
//! - **Synonyms**: other questions accepted as equivalent, with their score
//! - **Blacklist**: questions that scored high but whose replay failed
//!
//! ### Resolution
//!
//! [`SnapshotStore::resolve`] tries, in order: exact question match (score
//! 100), recorded synonym (score ≥ threshold), and a linear similarity scan
//! that skips blacklisted snapshots before scoring.
//!
//! ### Pipeline
//!
//! Jobs flow `Todo → Running → {Done, Dead}`. Any number of threads may
//! submit; exactly one consumer runs jobs, one at a time.
//!
//! ## Thread Safety
//!
//! [`SnapshotStore`] and [`Pipeline`] are `Send + Sync` and are shared
//! with `Arc`. The store guards its index with a single reader/writer lock
//! and persists every mutation before publishing it.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod question;
mod store;
mod types;

pub mod agent;
pub mod embedding;
pub mod escalation;
pub mod executor;
pub mod pipeline;
pub mod queue;
pub mod search;
pub mod snapshot;
pub mod storage;

/// Linear-scan similarity index and cosine scoring.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main interfaces
pub use pipeline::{JobReport, Pipeline, PipelineStatus, SubmitReceipt};
pub use store::{SnapshotStore, EXACT_MATCH_SCORE};

// Configuration
pub use config::{Config, EmbeddingDimension, SynonymPolicy};

// Error handling
pub use error::{
    GenerationError, NotFoundError, Result, SolveCacheError, StorageError, ValidationError,
};

// Core types
pub use question::{normalize, slugify, strip_salutations, Question};
pub use types::{Embedding, JobId, Timestamp};

// Collaborators
pub use agent::{Agent, AgentKind, AgentSet, Generation, KeywordRouter, Router};
pub use embedding::{CachedEmbedder, EmbeddingService};
pub use escalation::{AttemptRecord, Escalation, RetryEscalator, TranscriptLog};
pub use executor::{CodeExecutor, ExecutionReport, ProcessExecutor};

// Domain types
pub use queue::{Job, JobKind, JobOutcome, JobQueue, QueueEvent, QueueEventKind, QueueName};
pub use search::{MatchKind, MatchResult, ScoredSnapshot, SnapshotMatch};
pub use snapshot::{GeneratedCode, RuntimeStats, SolutionSnapshot};

// Storage (for advanced users)
pub use storage::StoreMetadata;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common SolveCache usage.
///
/// ```rust
/// use solvecache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{Agent, AgentKind, AgentSet, Generation, KeywordRouter, Router};
    pub use crate::config::{Config, EmbeddingDimension, SynonymPolicy};
    pub use crate::embedding::EmbeddingService;
    pub use crate::error::{Result, SolveCacheError};
    pub use crate::executor::{CodeExecutor, ExecutionReport, ProcessExecutor};
    pub use crate::pipeline::{Pipeline, SubmitReceipt};
    pub use crate::search::{MatchKind, MatchResult};
    pub use crate::snapshot::{GeneratedCode, SolutionSnapshot};
    pub use crate::store::SnapshotStore;
    pub use crate::types::{Embedding, JobId, Timestamp};
}
