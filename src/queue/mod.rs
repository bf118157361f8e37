//! Job queues.
//!
//! The pipeline uses four named [`JobQueue`]s:
//!
//! ```text
//!   submit ──► Todo ──► Running ──┬──► Done
//!                                 └──► Dead
//! ```
//!
//! A queue is an id-indexed FIFO behind a `Mutex`, safe for many producers.
//! Observers can poll [`JobQueue::has_size_changed`] or subscribe to a
//! bounded channel of [`QueueEvent`]s.

mod job;

pub use job::{Job, JobKind, JobOutcome, ReplayJob};

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

use crate::types::JobId;

/// The four pipeline queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Waiting to run.
    Todo,
    /// Currently executing (at most one job).
    Running,
    /// Finished successfully.
    Done,
    /// Failed after every recovery path.
    Dead,
}

impl QueueName {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Running => "running",
            Self::Done => "done",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueEventKind {
    /// A job was appended.
    Pushed,
    /// The head job was removed.
    Popped,
    /// A job was removed by id.
    Deleted,
}

/// Notification sent to queue subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueEvent {
    /// Queue that changed.
    pub queue: QueueName,
    /// Kind of change.
    pub kind: QueueEventKind,
    /// Job involved.
    pub job_id: JobId,
    /// Queue size after the change.
    pub size: usize,
}

struct QueueState {
    jobs: VecDeque<Job>,
    ids: HashSet<JobId>,
    last_observed_size: usize,
    subscribers: Vec<Sender<QueueEvent>>,
}

impl QueueState {
    fn notify(&mut self, event: QueueEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// A thread-safe FIFO of jobs, indexed by id.
pub struct JobQueue {
    name: QueueName,
    state: Mutex<QueueState>,
    push_count: AtomicU64,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("name", &self.name)
            .field("size", &self.size())
            .field("push_count", &self.push_count())
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Creates an empty queue.
    pub fn new(name: QueueName) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                ids: HashSet::new(),
                last_observed_size: 0,
                subscribers: Vec::new(),
            }),
            push_count: AtomicU64::new(0),
        }
    }

    /// Which queue this is.
    pub fn name(&self) -> QueueName {
        self.name
    }

    // A panic while holding the lock can't leave the state half-updated:
    // every mutation is a single push/pop plus a set insert/remove.
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a job and returns its id.
    ///
    /// A nil id, or one already present in this queue, is replaced with a
    /// fresh one.
    pub fn push(&self, mut job: Job) -> JobId {
        let mut state = self.state();
        if job.id.is_nil() || state.ids.contains(&job.id) {
            job.id = JobId::new();
        }
        let id = job.id;
        state.ids.insert(id);
        state.jobs.push_back(job);
        self.push_count.fetch_add(1, Ordering::Relaxed);

        let size = state.jobs.len();
        state.notify(QueueEvent {
            queue: self.name,
            kind: QueueEventKind::Pushed,
            job_id: id,
            size,
        });
        debug!(queue = %self.name, job_id = %id, size = size, "Job pushed");
        id
    }

    /// Removes and returns the oldest job.
    pub fn pop(&self) -> Option<Job> {
        let mut state = self.state();
        let job = state.jobs.pop_front()?;
        state.ids.remove(&job.id);

        let size = state.jobs.len();
        state.notify(QueueEvent {
            queue: self.name,
            kind: QueueEventKind::Popped,
            job_id: job.id,
            size,
        });
        Some(job)
    }

    /// Returns a copy of the oldest job without removing it.
    pub fn peek(&self) -> Option<Job> {
        self.state().jobs.front().cloned()
    }

    /// Removes the job with `id`, wherever it is in the queue.
    pub fn delete_by_id(&self, id: JobId) -> Option<Job> {
        let mut state = self.state();
        if !state.ids.contains(&id) {
            return None;
        }
        let position = state.jobs.iter().position(|job| job.id == id)?;
        let job = state.jobs.remove(position)?;
        state.ids.remove(&id);

        let size = state.jobs.len();
        state.notify(QueueEvent {
            queue: self.name,
            kind: QueueEventKind::Deleted,
            job_id: id,
            size,
        });
        debug!(queue = %self.name, job_id = %id, "Job deleted");
        Some(job)
    }

    /// Returns a copy of the job with `id`.
    pub fn get(&self, id: JobId) -> Option<Job> {
        let state = self.state();
        if !state.ids.contains(&id) {
            return None;
        }
        state.jobs.iter().find(|job| job.id == id).cloned()
    }

    /// Returns true if a job with `id` is queued.
    pub fn contains(&self, id: JobId) -> bool {
        self.state().ids.contains(&id)
    }

    /// Copies of every queued job, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        self.state().jobs.iter().cloned().collect()
    }

    /// Number of queued jobs.
    pub fn size(&self) -> usize {
        self.state().jobs.len()
    }

    /// Returns true if no jobs are queued.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns true once per size change since the previous call.
    pub fn has_size_changed(&self) -> bool {
        let mut state = self.state();
        let size = state.jobs.len();
        if size != state.last_observed_size {
            state.last_observed_size = size;
            true
        } else {
            false
        }
    }

    /// Total number of pushes since creation.
    pub fn push_count(&self) -> u64 {
        self.push_count.load(Ordering::Relaxed)
    }

    /// Subscribes to queue events.
    ///
    /// Events are dropped for a subscriber whose buffer of `capacity` is
    /// full; a dropped receiver is unsubscribed on the next event.
    pub fn subscribe(&self, capacity: usize) -> Receiver<QueueEvent> {
        let (tx, rx) = bounded(capacity);
        self.state().subscribers.push(tx);
        rx
    }
}
