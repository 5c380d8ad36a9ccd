//! Job processing on a pool of OS threads.
//!
//! Every task of a job becomes one work unit on a shared unbounded queue.
//! The last unit to resolve fires the job callback from its own thread.
//!
//! # Design
//!
//! - **No polling**: threads block on the queue; idle threads above the core
//!   count wake only to retire after `keep_alive`
//! - **Lazy growth**: threads are started on demand, up to `min_threads`
//!   unconditionally and up to `max_threads` while work is waiting
//! - **Clean shutdown**: dropping the sender drains the queue and unblocks
//!   every thread naturally

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::config::ThreadPoolConfig;
use crate::core::job::Resolution;
use crate::core::{run_task, Job, JobProcessor, JobProgress, ProcessorError, Task, TaskContext, TaskError};

/// One queued task, already bound to its job's progress record.
type WorkUnit = Box<dyn FnOnce() + Send + 'static>;

/// Statistics about thread utilization and throughput.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured core thread count.
    pub min_threads: usize,
    /// Configured thread ceiling.
    pub max_threads: usize,
    /// Threads currently alive.
    pub live_threads: usize,
    /// Threads waiting for work.
    pub idle_threads: usize,
    /// Units waiting in the queue.
    pub queued_tasks: usize,
    /// Jobs admitted.
    pub submitted_jobs: u64,
    /// Tasks admitted.
    pub submitted_tasks: u64,
    /// Tasks that produced a result.
    pub completed_tasks: u64,
    /// Tasks that failed, panicked or were rejected.
    pub failed_tasks: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    live_threads: AtomicUsize,
    idle_threads: AtomicUsize,
    submitted_jobs: AtomicU64,
    submitted_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
}

impl PoolCounters {
    fn record_outcome<R>(&self, outcome: &Result<R, TaskError>) {
        let counter = if outcome.is_ok() {
            &self.completed_tasks
        } else {
            &self.failed_tasks
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared by the processor handle and its threads.
struct PoolShared {
    config: ThreadPoolConfig,
    queue: Receiver<WorkUnit>,
    counters: PoolCounters,
    threads: Mutex<Vec<JoinHandle<()>>>,
    next_thread_id: AtomicUsize,
}

/// Job processor running every task on a pool of OS threads.
///
/// In blocking mode `process_job` returns only after the job callback has
/// fired. Calling a blocking pool from one of its own threads can deadlock
/// once every thread is waiting.
pub struct ThreadPoolProcessor {
    shared: Arc<PoolShared>,
    queue_tx: Mutex<Option<Sender<WorkUnit>>>,
    shutdown: AtomicBool,
}

impl ThreadPoolProcessor {
    /// Create a pool. No thread is started until the first job arrives.
    ///
    /// # Errors
    ///
    /// Returns `ProcessorError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, ProcessorError> {
        config.validate().map_err(ProcessorError::InvalidConfig)?;
        let (queue_tx, queue) = unbounded();

        info!(
            min_threads = config.min_threads,
            max_threads = config.max_threads,
            keep_alive_ms = config.keep_alive_ms,
            blocking = config.block_calling_thread,
            "thread pool processor initialized"
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                queue,
                counters: PoolCounters::default(),
                threads: Mutex::new(Vec::new()),
                next_thread_id: AtomicUsize::new(0),
            }),
            queue_tx: Mutex::new(Some(queue_tx)),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.shared.config
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            min_threads: self.shared.config.min_threads,
            max_threads: self.shared.config.max_threads,
            live_threads: counters.live_threads.load(Ordering::Relaxed),
            idle_threads: counters.idle_threads.load(Ordering::Relaxed),
            queued_tasks: self.shared.queue.len(),
            submitted_jobs: counters.submitted_jobs.load(Ordering::Relaxed),
            submitted_tasks: counters.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: counters.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: counters.failed_tasks.load(Ordering::Relaxed),
        }
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting jobs. Work already queued still runs.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down thread pool processor");
        *self.queue_tx.lock() = None;
    }

    /// Wait for every pool thread to exit, detaching the ones still running
    /// when `timeout` expires. Returns `true` when all threads were joined.
    ///
    /// Call after [`Self::shutdown`]; otherwise core threads never exit.
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let threads: Vec<JoinHandle<()>> = self.shared.threads.lock().drain(..).collect();
        let thread_count = threads.len();
        let mut joined = 0;

        for worker in threads {
            let name = worker.thread().name().unwrap_or("pool-thread").to_owned();
            let (tx, rx) = bounded(1);
            thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(true) => {
                    joined += 1;
                    debug!(thread = %name, "pool thread joined");
                }
                Ok(false) => {
                    joined += 1;
                    warn!(thread = %name, "pool thread panicked");
                }
                Err(_) => warn!(thread = %name, "pool thread did not exit within timeout; detaching"),
            }
        }

        info!(thread_count, joined, "thread pool join complete");
        joined == thread_count
    }

    /// Queue one unit, starting a thread when needed. Hands the unit back
    /// when the queue is closed.
    fn execute(&self, unit: WorkUnit) -> Result<(), WorkUnit> {
        {
            let guard = self.queue_tx.lock();
            let Some(tx) = guard.as_ref() else {
                return Err(unit);
            };
            tx.send(unit).map_err(|e| e.into_inner())?;
        }
        self.ensure_thread();
        Ok(())
    }

    /// Start a thread if below the core count, or if work is waiting with
    /// no idle thread and the ceiling allows one more.
    fn ensure_thread(&self) {
        let config = &self.shared.config;
        let counters = &self.shared.counters;
        let reserved = counters
            .live_threads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                let starved = self.shared.queue.len() > counters.idle_threads.load(Ordering::Acquire);
                (live < config.min_threads || (starved && live < config.max_threads)).then_some(live + 1)
            })
            .is_ok();
        if reserved {
            self.spawn_thread();
        }
    }

    fn spawn_thread(&self) {
        let thread_id = self.shared.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("task-pool-{thread_id}"))
            .stack_size(self.shared.config.thread_stack_size)
            .spawn(move || worker_loop(&shared, thread_id));

        match spawned {
            Ok(handle) => {
                let mut threads = self.shared.threads.lock();
                threads.retain(|t| !t.is_finished());
                threads.push(handle);
            }
            Err(e) => {
                self.shared.counters.live_threads.fetch_sub(1, Ordering::AcqRel);
                error!(thread_id, error = %e, "failed to spawn pool thread");
            }
        }
    }
}

impl<T: Task> JobProcessor<T> for ThreadPoolProcessor {
    fn process_job(&self, job: Job<T>) -> Result<(), ProcessorError> {
        if self.is_shutdown() {
            return Err(ProcessorError::Shutdown);
        }
        let counters = &self.shared.counters;
        counters.submitted_jobs.fetch_add(1, Ordering::Relaxed);
        if job.is_empty() {
            debug!(job_id = %job.id(), "empty job completed on submission");
            job.fire_empty();
            return Ok(());
        }

        let (job_id, tasks, progress) = job.into_parts();
        let total = tasks.len();
        counters
            .submitted_tasks
            .fetch_add(u64::try_from(total).unwrap_or(u64::MAX), Ordering::Relaxed);
        debug!(job_id = %job_id, tasks = total, "job submitted to thread pool");

        let progress = Arc::new(Mutex::new(progress));
        let blocking = self.shared.config.block_calling_thread;
        let (done_tx, done_rx) = bounded::<()>(0);

        for (index, task) in tasks.into_iter().enumerate() {
            let done = blocking.then(|| done_tx.clone());
            let unit = work_unit(task, index, Arc::clone(&progress), Arc::clone(&self.shared), done);
            if self.execute(unit).is_err() {
                warn!(job_id = %job_id, task_index = index, "task rejected: processor shut down");
                let outcome = Err(TaskError::Rejected("processor shut down".into()));
                counters.record_outcome::<T::Output>(&outcome);
                resolve(&progress, index, outcome);
            }
        }
        drop(done_tx);

        if blocking {
            // Every unit holds a sender until it has resolved its slot.
            while done_rx.recv().is_ok() {}
            trace!(job_id = %job_id, "blocking submission released");
        }
        Ok(())
    }
}

impl Drop for ThreadPoolProcessor {
    fn drop(&mut self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.queue_tx.lock() = None;
            debug!("thread pool dropped without explicit shutdown; threads will be detached");
        }
    }
}

fn work_unit<T: Task>(
    mut task: T,
    index: usize,
    progress: Arc<Mutex<JobProgress<T::Output>>>,
    shared: Arc<PoolShared>,
    done: Option<Sender<()>>,
) -> WorkUnit {
    Box::new(move || {
        let outcome = run_task(&mut task, &TaskContext::local(index));
        shared.counters.record_outcome(&outcome);
        resolve(&progress, index, outcome);
        drop(done);
    })
}

/// Record an outcome and fire the callback outside the lock if the job is done.
fn resolve<R>(progress: &Arc<Mutex<JobProgress<R>>>, index: usize, outcome: Result<R, TaskError>) {
    let resolution = progress.lock().record(index, outcome);
    if let Resolution::Complete(completion) = resolution {
        debug!(job_id = %completion.job_id(), "job completed");
        completion.fire();
    }
}

/// Thread loop - blocking recv, no polling. Threads above the core count
/// retire after `keep_alive` without work.
fn worker_loop(shared: &PoolShared, thread_id: usize) {
    let counters = &shared.counters;
    let keep_alive = shared.config.keep_alive();
    debug!(thread_id, "pool thread started");

    loop {
        counters.idle_threads.fetch_add(1, Ordering::AcqRel);
        let next = shared.queue.recv_timeout(keep_alive);
        counters.idle_threads.fetch_sub(1, Ordering::AcqRel);

        match next {
            Ok(unit) => unit(),
            Err(RecvTimeoutError::Timeout) => {
                let retired = counters
                    .live_threads
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                        (live > shared.config.min_threads).then(|| live - 1)
                    })
                    .is_ok();
                if retired {
                    debug!(thread_id, "idle pool thread retired");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    counters.live_threads.fetch_sub(1, Ordering::AcqRel);
    debug!(thread_id, "pool thread exiting");
}
