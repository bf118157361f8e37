//! The consumer: executes one job at a time and routes it to Done or Dead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::{ConsumerGuard, Pipeline};
use crate::agent::AgentKind;
use crate::error::{GenerationError, Result, SolveCacheError};
use crate::queue::{Job, JobKind, JobOutcome, QueueName, ReplayJob};
use crate::question::Question;
use crate::snapshot::{GeneratedCode, SolutionSnapshot};
use crate::store::EXACT_MATCH_SCORE;

/// A job that finished running.
#[derive(Clone, Debug, PartialEq)]
pub struct JobReport {
    /// The job, with its outcome filled in.
    pub job: Job,

    /// Where the job went: [`QueueName::Done`] or [`QueueName::Dead`].
    pub queue: QueueName,
}

impl JobReport {
    /// Returns true if the job went to Done.
    pub fn is_done(&self) -> bool {
        self.queue == QueueName::Done
    }

    /// The job's outcome.
    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.job.outcome.as_ref()
    }
}

/// A successful cold generation.
struct Solved {
    model: String,
    attempts: usize,
    code: GeneratedCode,
    output: String,
}

impl Pipeline {
    /// Runs the oldest Todo job to completion.
    ///
    /// Returns `Ok(None)` if Todo is empty. A failed job is not an error;
    /// it is reported with `queue == Dead`.
    ///
    /// # Errors
    ///
    /// Returns [`SolveCacheError::ConsumerBusy`] if another consumer is
    /// active.
    pub fn run_once(&self) -> Result<Option<JobReport>> {
        let _guard = ConsumerGuard::acquire(&self.consumer_active)?;
        self.step()
    }

    /// Consumes jobs until `stop` is set.
    ///
    /// Sleeps `tick_interval` whenever Todo is empty. A failing job never
    /// ends the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SolveCacheError::ConsumerBusy`] if another consumer is
    /// active.
    #[instrument(skip(self, stop))]
    pub fn run(&self, stop: &AtomicBool) -> Result<()> {
        let _guard = ConsumerGuard::acquire(&self.consumer_active)?;
        let tick = self.store.config().tick_interval;
        info!(tick_ms = tick.as_millis() as u64, "Consumer started");

        while !stop.load(Ordering::Acquire) {
            match self.step() {
                Ok(Some(_)) => {}
                Ok(None) => thread::sleep(tick),
                Err(e) => {
                    warn!(error = %e, "Consumer step failed");
                    thread::sleep(tick);
                }
            }
        }

        info!("Consumer stopped");
        Ok(())
    }

    /// Pop → Running → execute → Done/Dead. Caller holds the consumer guard.
    fn step(&self) -> Result<Option<JobReport>> {
        let Some(job) = self.todo.pop() else {
            return Ok(None);
        };
        let job_id = self.running.push(job);

        let outcome = match self.running.peek() {
            Some(running) => self.execute(&running),
            None => {
                return Err(SolveCacheError::index(format!(
                    "job {job_id} vanished from the running queue"
                )))
            }
        };

        let Some(mut job) = self.running.pop() else {
            return Err(SolveCacheError::index(format!(
                "job {job_id} vanished from the running queue"
            )));
        };

        let queue = if outcome.success {
            QueueName::Done
        } else {
            QueueName::Dead
        };
        info!(
            job_id = %job.id,
            queue = %queue,
            latency_ms = outcome.latency.as_millis() as u64,
            attempts = outcome.attempts,
            "Job finished"
        );
        job.outcome = Some(outcome);

        let report = JobReport {
            job: job.clone(),
            queue,
        };
        self.queue(queue).push(job);
        Ok(Some(report))
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, replay = job.is_replay()))]
    fn execute(&self, job: &Job) -> JobOutcome {
        let start = Instant::now();
        let mut outcome = match &job.kind {
            JobKind::Replay(replay) => match self.replay(job, replay) {
                Some(outcome) => outcome,
                None => {
                    let agent = self.router.route(&job.question.normalized);
                    self.cold(&job.question, agent, start)
                }
            },
            JobKind::Agent(agent) => self.cold(&job.question, *agent, start),
        };
        outcome.latency = start.elapsed();
        outcome
    }

    /// Runs cached code. `None` means the replay failed and the job falls
    /// back to the cold path.
    fn replay(&self, job: &Job, replay: &ReplayJob) -> Option<JobOutcome> {
        let start = Instant::now();
        let question = &job.question.normalized;

        let failure = match self.executor.run(&replay.code) {
            Ok(report) if report.is_success() => {
                let latency = start.elapsed();
                let answer = self
                    .agents
                    .get(replay.agent)
                    .format_output(question, &report.output);

                if let Err(e) = self.store.record_run(
                    &replay.snapshot_question,
                    true,
                    latency,
                    Some(answer.clone()),
                ) {
                    warn!(error = %e, "Failed to record run");
                }
                if !replay.match_kind.is_exact() {
                    self.confirm_synonym(&replay.snapshot_question, question);
                }

                debug!(match_kind = %replay.match_kind, "Replay succeeded");
                return Some(JobOutcome {
                    success: true,
                    output: answer,
                    latency,
                    model: None,
                    attempts: 0,
                    error: None,
                });
            }
            Ok(report) => format!("exit code {}", report.exit_code),
            Err(e) => e.to_string(),
        };

        warn!(
            snapshot = %replay.snapshot_question,
            match_kind = %replay.match_kind,
            error = %failure,
            "Replay failed, falling back to agent"
        );
        if let Err(e) = self
            .store
            .record_run(&replay.snapshot_question, false, start.elapsed(), None)
        {
            warn!(error = %e, "Failed to record run");
        }
        if !replay.match_kind.is_exact() {
            if let Err(e) = self.store.blacklist(&replay.snapshot_question, question) {
                warn!(error = %e, "Failed to blacklist question");
            }
        }
        None
    }

    /// Raises a synonym whose replay worked to [`EXACT_MATCH_SCORE`], so a
    /// repeat of the question is accepted at any threshold.
    fn confirm_synonym(&self, snapshot_question: &str, question: &str) {
        if let Err(e) = self
            .store
            .add_synonym(snapshot_question, question, EXACT_MATCH_SCORE)
        {
            warn!(synonym = %question, error = %e, "Failed to confirm synonym");
        }
    }

    /// Primary model, then the escalator over the fallbacks.
    fn cold(&self, question: &Question, kind: AgentKind, start: Instant) -> JobOutcome {
        let agent = self.agents.get(kind);
        let executor = self.executor.as_ref();
        let normalized = &question.normalized;
        let primary = &self.store.config().primary_model;

        let solved = match self.escalator.attempt(agent, executor, normalized, primary, 1) {
            Ok((generation, report)) => Ok(Solved {
                model: primary.clone(),
                attempts: 1,
                code: generation.code,
                output: report.output,
            }),
            Err(primary_err) => {
                warn!(model = %primary, error = %primary_err, "Primary model failed, escalating");
                self.escalator
                    .escalate_from(agent, executor, normalized, 2)
                    .map(|escalation| Solved {
                        model: escalation.model,
                        attempts: escalation.attempts,
                        code: escalation.generation.code,
                        output: escalation.report.output,
                    })
                    .map_err(|e| exhausted(primary_err, e))
            }
        };

        match solved {
            Ok(solved) => {
                let answer = agent.format_output(normalized, &solved.output);
                self.cache(question, kind, &solved.code, start.elapsed(), &answer);
                JobOutcome {
                    success: true,
                    output: answer,
                    latency: Duration::ZERO,
                    model: Some(solved.model),
                    attempts: solved.attempts,
                    error: None,
                }
            }
            Err((attempts, output, error)) => {
                warn!(agent = %kind, attempts = attempts, error = %error, "All models exhausted");
                JobOutcome {
                    success: false,
                    output,
                    latency: Duration::ZERO,
                    model: None,
                    attempts,
                    error: Some(error),
                }
            }
        }
    }

    /// Stores working code under `question`; failures are logged only.
    fn cache(
        &self,
        question: &Question,
        agent: AgentKind,
        code: &GeneratedCode,
        latency: Duration,
        answer: &str,
    ) {
        if let Err(e) = self.try_cache(question, agent, code, latency, answer) {
            warn!(question = %question.normalized, error = %e, "Failed to cache solution");
        }
    }

    fn try_cache(
        &self,
        question: &Question,
        agent: AgentKind,
        code: &GeneratedCode,
        latency: Duration,
        answer: &str,
    ) -> Result<()> {
        let normalized = &question.normalized;

        // Existing snapshot for this exact question: its code failed and
        // was regenerated.
        if self.store.find_exact(normalized)?.is_some() {
            self.store.replace_code(normalized, code.clone())?;
            return self
                .store
                .record_run(normalized, true, latency, Some(answer.to_string()));
        }

        let question_embedding = self.store.embed(normalized)?;
        let code_embedding = self.store.embed(&code.source())?;
        let mut snapshot = SolutionSnapshot::new(
            normalized.clone(),
            question_embedding,
            code.clone(),
            code_embedding,
            agent,
        );
        snapshot.record_run(true, latency, Some(answer.to_string()));
        self.store.add(snapshot)
    }
}

/// Total attempts, final output and error for a job whose primary attempt
/// and escalation both failed.
fn exhausted(
    primary_err: SolveCacheError,
    escalation_err: SolveCacheError,
) -> (usize, String, String) {
    let primary_output = match &primary_err {
        SolveCacheError::Generation(g) => g.output().unwrap_or_default().to_string(),
        _ => String::new(),
    };
    match escalation_err {
        // No fallbacks configured: the primary attempt is the last word
        SolveCacheError::Generation(GenerationError::AllModelsExhausted { attempts: 0, .. }) => {
            (1, primary_output, primary_err.to_string())
        }
        SolveCacheError::Generation(GenerationError::AllModelsExhausted {
            attempts,
            last_error,
            last_output,
        }) => (1 + attempts, last_output, last_error),
        other => (1, primary_output, other.to_string()),
    }
}
