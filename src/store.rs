//! SnapshotStore: the semantic solution cache.
//!
//! The [`SnapshotStore`] owns the in-memory [`SimilarityIndex`], the
//! snapshot files, and the question → embedding cache. It answers "have we
//! solved this before?" and applies every change to a cached solution.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use solvecache::{Config, MatchResult, SnapshotStore};
//!
//! let store = SnapshotStore::open("./cache", Config::default(), Box::new(my_embedder))?;
//!
//! match store.resolve("what concerts do i have this week", 90.0, 5)? {
//!     MatchResult::Found(m) => println!("{} match ({:.1})", m.kind, m.score),
//!     MatchResult::NotFound => println!("needs a fresh solution"),
//! }
//!
//! store.close()?;
//! ```
//!
//! # Resolution Order
//!
//! ```text
//! exact question ──hit──► Found(Exact, 100)
//!      │ miss
//!      ▼
//! synonym table ──hit, score ≥ threshold──► Found(Synonym, score)
//!      │ miss
//!      ▼
//! linear cosine scan (blacklist first) ──best ≥ threshold──► Found(Similar, score)
//!      │ none
//!      ▼
//!   NotFound
//! ```
//!
//! # Thread Safety
//!
//! `SnapshotStore` is `Send + Sync` and is shared via `Arc`. One `RwLock`
//! guards the index; mutations persist to disk while holding the write lock,
//! so a reader never sees a snapshot that isn't on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::embedding::{CachedEmbedder, EmbeddingService};
use crate::error::{NotFoundError, Result, SolveCacheError, StorageError, ValidationError};
use crate::search::{MatchKind, MatchResult, ScoredSnapshot, SnapshotMatch};
use crate::snapshot::{validate_snapshot, GeneratedCode, SolutionSnapshot};
use crate::storage::schema::TRANSCRIPT_DIR;
use crate::storage::{open_storage, SnapshotStorage};
use crate::types::Embedding;
use crate::vector::SimilarityIndex;

/// Score reported for an exact question match.
pub const EXACT_MATCH_SCORE: f32 = 100.0;

/// The semantic solution cache.
///
/// Create with [`SnapshotStore::open()`], release with
/// [`SnapshotStore::close()`].
pub struct SnapshotStore {
    /// Snapshot index; the source of truth for reads.
    index: RwLock<SimilarityIndex>,

    /// Snapshot files.
    storage: Box<dyn SnapshotStorage>,

    /// Question → embedding cache wrapping the injected provider.
    embedder: CachedEmbedder,

    /// Files skipped at load time.
    skipped: Vec<StorageError>,

    /// Store root directory.
    root: PathBuf,

    /// Configuration used to open this store.
    config: Config,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("root", &self.root)
            .field("snapshots", &self.len())
            .field("skipped", &self.skipped.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    /// Opens or creates a store rooted at `path`.
    ///
    /// Loads every snapshot file (skipping corrupt ones) and every cached
    /// embedding before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid (see [`Config::validate`])
    /// - The provider's dimension differs from the configured one
    /// - The snapshot directory is locked by another process
    /// - The embedding database is corrupted or has another dimension
    #[instrument(skip(config, embedding), fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        config: Config,
        embedding: Box<dyn EmbeddingService>,
    ) -> Result<Self> {
        config.validate().map_err(SolveCacheError::from)?;

        if embedding.dimension() != config.dimension() {
            return Err(ValidationError::dimension_mismatch(
                config.dimension(),
                embedding.dimension(),
            )
            .into());
        }

        info!("Opening snapshot store");

        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let (storage, embeddings) = open_storage(&root, &config)?;
        let embedder = CachedEmbedder::open(embedding, embeddings)?;

        let report = storage.load_all(config.dimension())?;
        let skipped = report.skipped;
        let index = SimilarityIndex::from_snapshots(config.dimension(), report.snapshots);
        if !skipped.is_empty() {
            warn!(
                skipped = skipped.len(),
                "Some snapshot files could not be loaded and were skipped"
            );
        }

        info!(
            snapshots = index.len(),
            synonyms = index.synonym_count(),
            skipped = skipped.len(),
            cached_embeddings = embedder.len(),
            "Snapshot store opened"
        );

        Ok(Self {
            index: RwLock::new(index),
            storage,
            embedder,
            skipped,
            root,
            config,
        })
    }

    /// Closes the store, releasing the directory lock and the embedding
    /// database.
    #[instrument(skip(self), fields(path = %self.root.display()))]
    pub fn close(self) -> Result<()> {
        info!("Closing snapshot store");
        self.storage.close()?;
        self.embedder.close()?;
        info!("Snapshot store closed");
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Returns the snapshot whose question is exactly `question`.
    pub fn find_exact(&self, question: &str) -> Result<Option<SolutionSnapshot>> {
        Ok(self.read()?.find_exact(question).cloned())
    }

    /// Returns the snapshot that lists `question` as a synonym, scored with
    /// the score the synonym was accepted at.
    pub fn find_synonym(&self, question: &str) -> Result<Option<ScoredSnapshot>> {
        Ok(self
            .read()?
            .find_synonym(question)
            .map(|(snapshot, score)| ScoredSnapshot {
                score,
                snapshot: snapshot.clone(),
            }))
    }

    /// Scans every snapshot for questions similar to `question`.
    ///
    /// Snapshots that blacklist `question` are skipped before scoring.
    /// Results have `score >= threshold`, best first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`SolveCacheError::EmbeddingUnavailable`] if `question` can't
    /// be embedded.
    pub fn find_by_similarity(
        &self,
        question: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ScoredSnapshot>> {
        let query = self.embedder.embed(question)?;
        Ok(self
            .read()?
            .scan_questions(question, &query, threshold, limit))
    }

    /// Scans every snapshot for code similar to `exemplar`.
    ///
    /// Returns at most `config.match_limit` results, best first.
    pub fn find_by_code_similarity(
        &self,
        exemplar: &str,
        threshold: f32,
    ) -> Result<Vec<ScoredSnapshot>> {
        let query = self.embedder.embed(exemplar)?;
        Ok(self
            .read()?
            .scan_code(&query, threshold, self.config.match_limit))
    }

    /// Finds the cached solution for `question`, if any applies.
    ///
    /// Exact matches score 100 and ignore `threshold`. A synonym is accepted
    /// when its recorded score is at least `threshold`. Otherwise the best
    /// scan result at or above `threshold` wins.
    ///
    /// # Errors
    ///
    /// Returns [`SolveCacheError::EmbeddingUnavailable`] if neither the exact
    /// nor the synonym lookup hit and `question` can't be embedded.
    #[instrument(skip(self), fields(question = %question))]
    pub fn resolve(&self, question: &str, threshold: f32, limit: usize) -> Result<MatchResult> {
        {
            let index = self.read()?;

            if let Some(snapshot) = index.find_exact(question) {
                debug!("Exact match");
                return Ok(MatchResult::Found(SnapshotMatch {
                    kind: MatchKind::Exact,
                    score: EXACT_MATCH_SCORE,
                    snapshot: snapshot.clone(),
                }));
            }

            if let Some((snapshot, score)) = index.find_synonym(question) {
                if score >= threshold {
                    debug!(canonical = %snapshot.question, score = score, "Synonym match");
                    return Ok(MatchResult::Found(SnapshotMatch {
                        kind: MatchKind::Synonym,
                        score,
                        snapshot: snapshot.clone(),
                    }));
                }
                debug!(score = score, threshold = threshold, "Synonym below threshold");
            }
        }

        let best = self
            .find_by_similarity(question, threshold, limit)?
            .into_iter()
            .next();

        Ok(match best {
            Some(ScoredSnapshot { score, snapshot }) => {
                debug!(canonical = %snapshot.question, score = score, "Similarity match");
                MatchResult::Found(SnapshotMatch {
                    kind: MatchKind::Similar,
                    score,
                    snapshot,
                })
            }
            None => {
                debug!("No match");
                MatchResult::NotFound
            }
        })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds or replaces a snapshot.
    ///
    /// The snapshot is validated and written to disk before it becomes
    /// visible to lookups.
    #[instrument(skip(self, snapshot), fields(question = %snapshot.question))]
    pub fn add(&self, snapshot: SolutionSnapshot) -> Result<()> {
        validate_snapshot(&snapshot, self.config.dimension())?;

        let mut index = self.write()?;
        self.storage.save_snapshot(&snapshot)?;
        let replaced = index.insert(snapshot).is_some();

        info!(replaced = replaced, total = index.len(), "Snapshot stored");
        Ok(())
    }

    /// Records `question` as a synonym of the snapshot for `snapshot_question`.
    ///
    /// Returns `false` if the question is blacklisted on that snapshot or is
    /// its canonical question.
    pub fn add_synonym(&self, snapshot_question: &str, question: &str, score: f32) -> Result<bool> {
        if question.is_empty() {
            return Err(ValidationError::required_field("question").into());
        }
        let added = self.mutate(snapshot_question, |s| s.add_synonym(question, score))?;
        if added {
            debug!(
                canonical = %snapshot_question,
                synonym = %question,
                score = score,
                "Synonym recorded"
            );
        }
        Ok(added)
    }

    /// Marks `question` as not equivalent to the snapshot for
    /// `snapshot_question`, removing it from the synonyms.
    ///
    /// Returns `false` if it was already blacklisted.
    pub fn blacklist(&self, snapshot_question: &str, question: &str) -> Result<bool> {
        let added = self.mutate(snapshot_question, |s| s.blacklist(question))?;
        if added {
            info!(canonical = %snapshot_question, question = %question, "Question blacklisted");
        }
        Ok(added)
    }

    /// Replaces the code of the snapshot for `snapshot_question`.
    ///
    /// The code embedding is recomputed from `code.source()` before the
    /// change is applied. Recorded synonyms are dropped when the configured
    /// [`SynonymPolicy`](crate::SynonymPolicy) invalidates them.
    #[instrument(skip(self, code), fields(question = %snapshot_question))]
    pub fn replace_code(&self, snapshot_question: &str, code: GeneratedCode) -> Result<()> {
        if self.find_exact(snapshot_question)?.is_none() {
            return Err(NotFoundError::snapshot(snapshot_question).into());
        }

        let code_embedding = self.embedder.embed(&code.source())?;
        let invalidate = self.config.synonym_policy.invalidates();

        self.mutate(snapshot_question, |s| {
            s.replace_code(code, code_embedding, invalidate);
            true
        })?;

        info!(invalidated_synonyms = invalidate, "Snapshot code replaced");
        Ok(())
    }

    /// Records one execution of the snapshot's code.
    pub fn record_run(
        &self,
        snapshot_question: &str,
        success: bool,
        latency: Duration,
        answer: Option<String>,
    ) -> Result<()> {
        self.mutate(snapshot_question, |s| {
            s.record_run(success, latency, answer);
            true
        })?;
        Ok(())
    }

    /// Applies `change` to a copy of a snapshot and, if it reports a change,
    /// validates, persists and publishes the copy.
    fn mutate(
        &self,
        snapshot_question: &str,
        change: impl FnOnce(&mut SolutionSnapshot) -> bool,
    ) -> Result<bool> {
        let mut index = self.write()?;
        let mut snapshot = index
            .find_exact(snapshot_question)
            .cloned()
            .ok_or_else(|| NotFoundError::snapshot(snapshot_question))?;

        if !change(&mut snapshot) {
            return Ok(false);
        }

        validate_snapshot(&snapshot, self.config.dimension())?;
        self.storage.save_snapshot(&snapshot)?;
        index.insert(snapshot);
        Ok(true)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Embeds `text` through the cache.
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        self.embedder.embed(text)
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.index.read().map(|i| i.len()).unwrap_or(0)
    }

    /// Returns true if the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All canonical questions, sorted.
    pub fn questions(&self) -> Result<Vec<String>> {
        Ok(self.read()?.questions())
    }

    /// Snapshot files skipped at open, one
    /// [`StorageError::CorruptSnapshotFile`] or
    /// [`StorageError::DuplicateSnapshotFile`] each.
    pub fn skipped_files(&self) -> &[StorageError] {
        &self.skipped
    }

    /// Store root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Directory escalation transcripts are written to.
    pub fn transcript_dir(&self) -> PathBuf {
        self.root.join(TRANSCRIPT_DIR)
    }

    /// Configuration used to open this store.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, SimilarityIndex>> {
        self.index
            .read()
            .map_err(|_| SolveCacheError::index("similarity index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, SimilarityIndex>> {
        self.index
            .write()
            .map_err(|_| SolveCacheError::index("similarity index lock poisoned"))
    }
}
