//! Processor event sinks.
//!
//! Events mirror the isolated pool's state transitions. Each one carries the
//! worker counts observed when it was recorded.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::JobId;
use crate::util::clock::now_ms;

/// State transition being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventKind {
    /// Job appended to the pending queue.
    JobQueued,
    /// Job callback fired.
    JobCompleted,
    /// Start message sent to a worker.
    TaskDispatched,
    /// Worker reported success.
    TaskSucceeded,
    /// Task resolved as failed (remote error, codec or host failure).
    TaskFailed,
    /// New isolated context started.
    WorkerSpawned,
    /// Idle context rebound to a task.
    WorkerReused,
    /// Idle context terminated to make room.
    WorkerEvicted,
    /// Context terminated after a failure.
    WorkerRetired,
    /// Diagnostic message forwarded from a worker.
    WorkerLog,
    /// Message with unknown framing.
    UnrecognizedMessage,
}

/// One recorded transition.
#[derive(Debug, Clone)]
pub struct JobEvent {
    /// Transition kind.
    pub kind: JobEventKind,
    /// Job involved, when any.
    pub job_id: Option<JobId>,
    /// Task index involved, when any.
    pub task_index: Option<usize>,
    /// Worker involved, when any.
    pub worker_id: Option<u64>,
    /// Worker type involved, when any.
    pub worker_type: Option<String>,
    /// Active workers right after the transition.
    pub active_workers: usize,
    /// Idle workers right after the transition.
    pub idle_workers: usize,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

impl JobEvent {
    /// Create an event with the given counts; optional fields start empty.
    #[must_use]
    pub fn new(kind: JobEventKind, active_workers: usize, idle_workers: usize) -> Self {
        Self {
            kind,
            job_id: None,
            task_index: None,
            worker_id: None,
            worker_type: None,
            active_workers,
            idle_workers,
            created_at_ms: now_ms(),
            detail: None,
        }
    }

    /// Attach the job and task index.
    #[must_use]
    pub fn with_task(mut self, job_id: JobId, task_index: usize) -> Self {
        self.job_id = Some(job_id);
        self.task_index = Some(task_index);
        self
    }

    /// Attach the job only.
    #[must_use]
    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Attach the worker.
    #[must_use]
    pub fn with_worker(mut self, worker_id: u64, worker_type: &str) -> Self {
        self.worker_id = Some(worker_id);
        self.worker_type = Some(worker_type.to_owned());
        self
    }

    /// Attach free-form detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Event sink abstraction.
pub trait EventSink: Send {
    /// Record an event.
    fn record(&mut self, event: JobEvent);
}

impl<S: EventSink> EventSink for Arc<Mutex<S>> {
    fn record(&mut self, event: JobEvent) {
        self.lock().record(event);
    }
}

/// In-memory sink with a bounded buffer, for tests and development.
pub struct InMemoryEventSink {
    events: VecDeque<JobEvent>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a sink keeping at most `max_events` events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Create a sink behind a shared handle so it can be inspected while a
    /// processor owns a clone.
    #[must_use]
    pub fn shared(max_events: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(max_events)))
    }

    /// Snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.iter().cloned().collect()
    }

    /// Number of stored events of `kind`.
    #[must_use]
    pub fn count(&self, kind: JobEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&mut self, event: JobEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}
