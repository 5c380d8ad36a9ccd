//! Job processing on a bounded pool of isolated worker contexts.
//!
//! Each task runs inside a separate context reached only through string
//! messages. Contexts are keyed by worker type and recycled through an idle
//! cache; the total of active and idle contexts never exceeds
//! `max_workers`.
//!
//! ```text
//!  process_job ──► router thread ──► PoolController ──► IsolateHost::send
//!                      ▲                                     │
//!                      └──────── RoutedMessage ◄── MessageRoute::post
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

mod cache;
pub mod codec;
pub mod controller;
pub mod host;
pub mod processor;
pub mod protocol;

pub use codec::{JsonCodec, TaskCodec};
pub use controller::{PoolController, WorkerState};
pub use host::{IsolateHost, MessageRoute, RoutedMessage};
pub use processor::IsolatedWorkerPoolProcessor;

/// Identity of one isolated context, unique for the controller's lifetime.
pub type WorkerId = u64;

/// Isolated pool utilization and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolatePoolStats {
    /// Configured ceiling on active plus idle workers.
    pub max_workers: usize,
    /// Workers bound to a task.
    pub active_workers: usize,
    /// Workers parked in the idle cache.
    pub idle_workers: usize,
    /// Highest `active_workers` observed.
    pub peak_active_workers: usize,
    /// Jobs admitted and not yet completed.
    pub queued_jobs: usize,
    /// Contexts started.
    pub spawned_workers: u64,
    /// Dispatches served by an idle context.
    pub reused_workers: u64,
    /// Idle contexts terminated to make room.
    pub evicted_workers: u64,
    /// Contexts terminated after a failure.
    pub retired_workers: u64,
    /// Tasks resolved with a result.
    pub completed_tasks: u64,
    /// Tasks resolved without a result.
    pub failed_tasks: u64,
    /// Job callbacks fired.
    pub completed_jobs: u64,
}

/// Counters shared between the router thread and processor handles.
#[derive(Debug, Default)]
pub(crate) struct IsolateCounters {
    pub active_workers: AtomicUsize,
    pub idle_workers: AtomicUsize,
    pub peak_active_workers: AtomicUsize,
    pub queued_jobs: AtomicUsize,
    pub spawned_workers: AtomicU64,
    pub reused_workers: AtomicU64,
    pub evicted_workers: AtomicU64,
    pub retired_workers: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub completed_jobs: AtomicU64,
}

impl IsolateCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, max_workers: usize) -> IsolatePoolStats {
        IsolatePoolStats {
            max_workers,
            active_workers: self.active_workers.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            peak_active_workers: self.peak_active_workers.load(Ordering::Relaxed),
            queued_jobs: self.queued_jobs.load(Ordering::Relaxed),
            spawned_workers: self.spawned_workers.load(Ordering::Relaxed),
            reused_workers: self.reused_workers.load(Ordering::Relaxed),
            evicted_workers: self.evicted_workers.load(Ordering::Relaxed),
            retired_workers: self.retired_workers.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
        }
    }
}
