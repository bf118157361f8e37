//! The job pipeline: dispatch, queues, and the single consumer.
//!
//! ```text
//!   submit() ──resolve──► Todo ──pop──► Running ──execute──► Done
//!   (many producers)       │            (one job)        └──► Dead
//!                          └── cancel()
//! ```
//!
//! Producers call [`Pipeline::submit`] from any thread. One consumer drives
//! [`Pipeline::run`] (or steps with [`Pipeline::run_once`]); a second
//! concurrent consumer gets [`SolveCacheError::ConsumerBusy`].
//!
//! Jobs are moved between queues, never shared. `Running` holds at most one
//! job and is empty again before the next job leaves `Todo`.

mod consumer;
mod dispatch;

pub use consumer::JobReport;
pub use dispatch::SubmitReceipt;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::agent::{AgentSet, Router};
use crate::error::{Result, SolveCacheError};
use crate::escalation::{RetryEscalator, TranscriptLog};
use crate::executor::CodeExecutor;
use crate::queue::{JobQueue, QueueName};
use crate::store::SnapshotStore;

/// Sizes of the four queues at one moment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStatus {
    /// Jobs waiting to run.
    pub todo: usize,

    /// Jobs currently running (0 or 1).
    pub running: usize,

    /// Jobs that produced an answer.
    pub done: usize,

    /// Jobs that failed after every model was tried.
    pub dead: usize,
}

/// Dispatcher and consumer over a shared [`SnapshotStore`].
pub struct Pipeline {
    store: Arc<SnapshotStore>,
    agents: AgentSet,
    router: Box<dyn Router>,
    executor: Box<dyn CodeExecutor>,
    escalator: RetryEscalator,
    todo: JobQueue,
    running: JobQueue,
    done: JobQueue,
    dead: JobQueue,
    consumer_active: AtomicBool,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("store", &self.store.path())
            .field("escalator", &self.escalator)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline with empty queues.
    ///
    /// Fallback models and transcript recording come from the store's
    /// [`Config`](crate::Config).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the transcript directory can't be created.
    pub fn new(
        store: Arc<SnapshotStore>,
        agents: AgentSet,
        router: Box<dyn Router>,
        executor: Box<dyn CodeExecutor>,
    ) -> Result<Self> {
        let config = store.config();
        let mut escalator = RetryEscalator::new(config.fallback_models.iter().cloned());
        if config.record_transcripts {
            escalator = escalator.with_transcripts(TranscriptLog::open(store.transcript_dir())?);
        }

        info!(
            primary_model = %config.primary_model,
            fallback_models = config.fallback_models.len(),
            record_transcripts = config.record_transcripts,
            "Pipeline created"
        );

        Ok(Self {
            store,
            agents,
            router,
            executor,
            escalator,
            todo: JobQueue::new(QueueName::Todo),
            running: JobQueue::new(QueueName::Running),
            done: JobQueue::new(QueueName::Done),
            dead: JobQueue::new(QueueName::Dead),
            consumer_active: AtomicBool::new(false),
        })
    }

    /// The snapshot store.
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// The escalator used for cold jobs.
    pub fn escalator(&self) -> &RetryEscalator {
        &self.escalator
    }

    /// Jobs waiting to run.
    pub fn todo(&self) -> &JobQueue {
        &self.todo
    }

    /// The job currently running, if any.
    pub fn running(&self) -> &JobQueue {
        &self.running
    }

    /// Finished jobs.
    pub fn done(&self) -> &JobQueue {
        &self.done
    }

    /// Dead-lettered jobs.
    pub fn dead(&self) -> &JobQueue {
        &self.dead
    }

    /// Returns the queue called `name`.
    pub fn queue(&self, name: QueueName) -> &JobQueue {
        match name {
            QueueName::Todo => &self.todo,
            QueueName::Running => &self.running,
            QueueName::Done => &self.done,
            QueueName::Dead => &self.dead,
        }
    }

    /// Current queue sizes.
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            todo: self.todo.size(),
            running: self.running.size(),
            done: self.done.size(),
            dead: self.dead.size(),
        }
    }
}

/// Marks the consumer slot taken until dropped.
struct ConsumerGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ConsumerGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SolveCacheError::ConsumerBusy)?;
        Ok(Self { flag })
    }
}

impl Drop for ConsumerGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = ConsumerGuard::acquire(&flag).unwrap();
        assert!(matches!(
            ConsumerGuard::acquire(&flag),
            Err(SolveCacheError::ConsumerBusy)
        ));
        drop(guard);
        assert!(ConsumerGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn test_pipeline_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }
}
