//! Retry escalation over fallback models.
//!
//! When the primary model's code fails, the consumer hands the job to a
//! [`RetryEscalator`], which walks an ordered list of fallback models and
//! tries each one exactly once:
//!
//! ```text
//!   model[0] ──generate──► code ──run──► exit 0? ──yes──► Escalation
//!                                          │ no
//!   model[1] ──generate──► code ──run──► exit 0? ──yes──► Escalation
//!                                          │ no
//!   ...                                    ▼
//!                              GenerationError::AllModelsExhausted
//! ```
//!
//! The escalator keeps no state between jobs. Every attempt is written to a
//! [`TranscriptLog`] when one is configured.

mod transcript;

pub use transcript::{AttemptRecord, TranscriptLog};

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::agent::{Agent, Generation};
use crate::error::{GenerationError, Result, SolveCacheError};
use crate::executor::{CodeExecutor, ExecutionReport};
use crate::types::Timestamp;

/// A successful escalation.
#[derive(Clone, Debug, PartialEq)]
pub struct Escalation {
    /// Model whose code succeeded.
    pub model: String,

    /// Attempt number of the successful attempt.
    pub attempts: usize,

    /// What the model generated.
    pub generation: Generation,

    /// Output of the successful run.
    pub report: ExecutionReport,
}

/// Tries an ordered list of models until one produces working code.
#[derive(Clone, Debug, Default)]
pub struct RetryEscalator {
    models: Vec<String>,
    transcripts: Option<TranscriptLog>,
}

impl RetryEscalator {
    /// Creates an escalator over `models`, tried in order.
    pub fn new(models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            models: models.into_iter().map(Into::into).collect(),
            transcripts: None,
        }
    }

    /// Records every attempt to `log`.
    pub fn with_transcripts(mut self, log: TranscriptLog) -> Self {
        self.transcripts = Some(log);
        self
    }

    /// Fallback models, in the order they are tried.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Transcript log, if one is configured.
    pub fn transcripts(&self) -> Option<&TranscriptLog> {
        self.transcripts.as_ref()
    }

    /// One generate → run → check cycle with `model`.
    ///
    /// # Errors
    ///
    /// - [`GenerationError::CodeGenerationFailed`] if the agent returns an
    ///   error or empty code
    /// - [`GenerationError::CodeExecutionFailed`] if the program exits
    ///   non-zero or cannot be started (exit code -1)
    #[instrument(skip(self, agent, executor), fields(agent = %agent.kind()))]
    pub fn attempt(
        &self,
        agent: &dyn Agent,
        executor: &dyn CodeExecutor,
        question: &str,
        model: &str,
        attempt_no: usize,
    ) -> Result<(Generation, ExecutionReport)> {
        let start = Instant::now();
        let mut record = AttemptRecord {
            attempt: attempt_no,
            model: model.to_string(),
            question: question.to_string(),
            prompt: None,
            response: None,
            code: None,
            exit_code: None,
            output: String::new(),
            error: None,
            latency_ms: 0,
            recorded_at: Timestamp::now(),
        };

        let result = run_attempt(agent, executor, question, model, &mut record);

        record.latency_ms = start.elapsed().as_millis() as u64;
        record.recorded_at = Timestamp::now();
        if let Err(e) = &result {
            record.error = Some(e.to_string());
        }
        if let Some(log) = &self.transcripts {
            log.record(&record);
        }

        match &result {
            Ok(_) => debug!(latency_ms = record.latency_ms, "Attempt succeeded"),
            Err(e) => debug!(error = %e, latency_ms = record.latency_ms, "Attempt failed"),
        }
        result
    }

    /// Tries every fallback model once, numbering attempts from 1.
    pub fn escalate(
        &self,
        agent: &dyn Agent,
        executor: &dyn CodeExecutor,
        question: &str,
    ) -> Result<Escalation> {
        self.escalate_from(agent, executor, question, 1)
    }

    /// Tries every fallback model once, numbering attempts from
    /// `first_attempt`.
    ///
    /// Stops at the first model whose code exits with status 0.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::AllModelsExhausted`] when every model
    /// failed (or no fallback models are configured). `attempts` counts
    /// the attempts made here, not including earlier ones.
    #[instrument(
        skip(self, agent, executor),
        fields(agent = %agent.kind(), models = self.models.len())
    )]
    pub fn escalate_from(
        &self,
        agent: &dyn Agent,
        executor: &dyn CodeExecutor,
        question: &str,
        first_attempt: usize,
    ) -> Result<Escalation> {
        if self.models.is_empty() {
            return Err(GenerationError::AllModelsExhausted {
                attempts: 0,
                last_error: "no fallback models configured".to_string(),
                last_output: String::new(),
            }
            .into());
        }

        let mut last_error = String::new();
        let mut last_output = String::new();

        for (i, model) in self.models.iter().enumerate() {
            let attempt_no = first_attempt + i;
            match self.attempt(agent, executor, question, model, attempt_no) {
                Ok((generation, report)) => {
                    info!(model = %model, attempt = attempt_no, "Escalation succeeded");
                    return Ok(Escalation {
                        model: model.clone(),
                        attempts: attempt_no,
                        generation,
                        report,
                    });
                }
                Err(e) => {
                    warn!(
                        model = %model,
                        attempt = attempt_no,
                        error = %e,
                        "Fallback model failed"
                    );
                    if let SolveCacheError::Generation(g) = &e {
                        last_output = g.output().unwrap_or_default().to_string();
                    } else {
                        last_output.clear();
                    }
                    last_error = e.to_string();
                }
            }
        }

        Err(GenerationError::AllModelsExhausted {
            attempts: self.models.len(),
            last_error,
            last_output,
        }
        .into())
    }
}

fn run_attempt(
    agent: &dyn Agent,
    executor: &dyn CodeExecutor,
    question: &str,
    model: &str,
    record: &mut AttemptRecord,
) -> Result<(Generation, ExecutionReport)> {
    let generation = agent.generate_code(question, model).map_err(|e| {
        SolveCacheError::from(GenerationError::CodeGenerationFailed {
            model: model.to_string(),
            reason: e.to_string(),
        })
    })?;
    record.prompt = generation.prompt.clone();
    record.response = generation.response.clone();
    record.code = Some(generation.code.clone());

    if generation.code.is_empty() {
        return Err(GenerationError::CodeGenerationFailed {
            model: model.to_string(),
            reason: "agent returned no code".to_string(),
        }
        .into());
    }

    let report = match executor.run(&generation.code) {
        Ok(report) => report,
        Err(e) => ExecutionReport {
            exit_code: -1,
            output: e.to_string(),
        },
    };
    record.exit_code = Some(report.exit_code);
    record.output = report.output.clone();

    if !report.is_success() {
        return Err(GenerationError::CodeExecutionFailed {
            model: model.to_string(),
            exit_code: report.exit_code,
            output: report.output,
        }
        .into());
    }

    Ok((generation, report))
}
