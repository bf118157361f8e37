//! Job resolution: turning a submitted question into a queued job.

use tracing::{debug, info, instrument, warn};

use super::Pipeline;
use crate::error::{Result, ValidationError};
use crate::queue::{Job, ReplayJob};
use crate::question::Question;
use crate::search::{MatchKind, MatchResult};
use crate::types::JobId;

/// What [`Pipeline::submit`] decided for a question.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitReceipt {
    /// Id of the queued job.
    pub job_id: JobId,

    /// How the question matched the cache. `None` for a cold job.
    pub match_kind: Option<MatchKind>,

    /// Match score. `None` for a cold job.
    pub score: Option<f32>,

    /// Canonical question of the matched snapshot.
    pub snapshot_question: Option<String>,
}

impl SubmitReceipt {
    /// Returns true if the job will replay cached code.
    pub fn is_cache_hit(&self) -> bool {
        self.match_kind.is_some()
    }
}

impl Pipeline {
    /// Resolves `raw` against the cache and queues a job for it.
    ///
    /// A hit queues a replay of the matched snapshot's code; a similarity
    /// hit also records the question as a synonym of that snapshot. A miss
    /// queues a cold job for the routed agent. Returns without running the
    /// job.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::RequiredField`] if nothing survives normalization
    /// - Storage errors from the index lookup
    ///
    /// An unavailable embedding provider is not an error; the question is
    /// treated as a miss.
    #[instrument(skip(self, raw))]
    pub fn submit(&self, raw: &str) -> Result<SubmitReceipt> {
        let question = Question::new(raw);
        if question.is_empty() {
            return Err(ValidationError::required_field("question").into());
        }

        let config = self.store.config();
        let resolved = match self.store.resolve(
            &question.normalized,
            config.similarity_threshold,
            config.match_limit,
        ) {
            Ok(resolved) => resolved,
            Err(e) if e.is_embedding_unavailable() => {
                warn!(
                    question = %question.normalized,
                    error = %e,
                    "Embedding unavailable, treating as cache miss"
                );
                MatchResult::NotFound
            }
            Err(e) => return Err(e),
        };

        let (job, receipt) = match resolved {
            MatchResult::Found(found) => {
                if found.kind == MatchKind::Similar {
                    if let Err(e) = self.store.add_synonym(
                        &found.snapshot.question,
                        &question.normalized,
                        found.score,
                    ) {
                        warn!(error = %e, "Failed to record synonym");
                    }
                }

                let receipt = SubmitReceipt {
                    job_id: JobId::nil(),
                    match_kind: Some(found.kind),
                    score: Some(found.score),
                    snapshot_question: Some(found.snapshot.question.clone()),
                };
                let replay = ReplayJob {
                    snapshot_question: found.snapshot.question,
                    match_kind: found.kind,
                    score: found.score,
                    agent: found.snapshot.agent,
                    code: found.snapshot.code,
                };
                (Job::replay(question, replay), receipt)
            }
            MatchResult::NotFound => {
                let agent = self.router.route(&question.normalized);
                debug!(agent = %agent, "Cache miss, routing to agent");
                let receipt = SubmitReceipt {
                    job_id: JobId::nil(),
                    match_kind: None,
                    score: None,
                    snapshot_question: None,
                };
                (Job::agent(question, agent), receipt)
            }
        };

        let job_id = self.todo.push(job);
        info!(
            job_id = %job_id,
            match_kind = ?receipt.match_kind,
            score = ?receipt.score,
            "Job queued"
        );
        Ok(SubmitReceipt { job_id, ..receipt })
    }

    /// Removes a job from Todo before it starts.
    ///
    /// Returns `None` if the job isn't waiting (already running, finished,
    /// or unknown).
    pub fn cancel(&self, job_id: JobId) -> Option<Job> {
        let job = self.todo.delete_by_id(job_id);
        if job.is_some() {
            info!(job_id = %job_id, "Job cancelled");
        }
        job
    }
}
