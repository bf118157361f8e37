//! Job values moved between queues.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;
use crate::question::Question;
use crate::search::MatchKind;
use crate::snapshot::GeneratedCode;
use crate::types::{JobId, Timestamp};

/// A unit of work: one question and how to answer it.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    /// Queue-assigned identifier. Nil until pushed.
    pub id: JobId,

    /// The question being answered.
    pub question: Question,

    /// Replay cached code, or ask an agent.
    pub kind: JobKind,

    /// When the job was created.
    pub created_at: Timestamp,

    /// Filled in by the consumer once the job has run.
    pub outcome: Option<JobOutcome>,
}

impl Job {
    /// Creates a job that replays a cached snapshot.
    pub fn replay(question: Question, replay: ReplayJob) -> Self {
        Self::with_kind(question, JobKind::Replay(replay))
    }

    /// Creates a job that asks `agent` for fresh code.
    pub fn agent(question: Question, agent: AgentKind) -> Self {
        Self::with_kind(question, JobKind::Agent(agent))
    }

    fn with_kind(question: Question, kind: JobKind) -> Self {
        Self {
            id: JobId::nil(),
            question,
            kind,
            created_at: Timestamp::now(),
            outcome: None,
        }
    }

    /// Returns true for replay jobs.
    pub fn is_replay(&self) -> bool {
        matches!(self.kind, JobKind::Replay(_))
    }

    /// Agent that produced (or will produce) the code for this job.
    pub fn agent_kind(&self) -> AgentKind {
        match &self.kind {
            JobKind::Replay(replay) => replay.agent,
            JobKind::Agent(kind) => *kind,
        }
    }
}

/// How a job will be answered.
#[derive(Clone, Debug, PartialEq)]
pub enum JobKind {
    /// Run code cloned from a cached snapshot.
    Replay(ReplayJob),

    /// Ask the given agent to write new code.
    Agent(AgentKind),
}

/// A cache hit, ready to run without an agent.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayJob {
    /// Canonical question of the snapshot being replayed.
    pub snapshot_question: String,

    /// How the job's question matched the snapshot.
    pub match_kind: MatchKind,

    /// Match score, 0–100.
    pub score: f32,

    /// Agent that produced the code; formats the output.
    pub agent: AgentKind,

    /// Code cloned from the snapshot at dispatch time.
    pub code: GeneratedCode,
}

/// Result of executing a job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Whether the job produced an answer.
    pub success: bool,

    /// Formatted answer on success, captured program output on failure.
    pub output: String,

    /// Wall-clock time spent executing the job.
    pub latency: Duration,

    /// Model whose code produced the result (None for a pure replay).
    pub model: Option<String>,

    /// Number of code generation attempts made.
    pub attempts: usize,

    /// Last error, if the job failed.
    pub error: Option<String>,
}
