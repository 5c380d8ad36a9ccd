//! Thread-safe front end of the isolated pool.
//!
//! A dedicated router thread owns the [`PoolController`] and multiplexes job
//! submissions with worker replies. Callbacks run on that thread, so a
//! callback may submit further jobs without deadlocking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::IsolatePoolConfig;
use crate::core::{Job, JobProcessor, ProcessorError, Task};

use super::codec::TaskCodec;
use super::controller::PoolController;
use super::host::IsolateHost;
use super::{IsolateCounters, IsolatePoolStats};

/// Job processor running each task in an isolated worker context.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_tasks::core::isolate_pool::{IsolatedWorkerPoolProcessor, JsonCodec};
/// use prometheus_tasks::runtime::{ThreadIsolateHost, WorkerRegistry};
///
/// let mut registry = WorkerRegistry::new();
/// registry.register_task::<HelloWorldTask>("HelloWorldTask");
/// let processor = IsolatedWorkerPoolProcessor::new(
///     IsolatePoolConfig::default(),
///     ThreadIsolateHost::new(registry),
///     Arc::new(JsonCodec::new()),
/// )?;
/// processor.process_job(Job::new(tasks, |results| println!("{results:?}")))?;
/// ```
pub struct IsolatedWorkerPoolProcessor<T: Task> {
    config: IsolatePoolConfig,
    submit_tx: Mutex<Option<Sender<Job<T>>>>,
    counters: Arc<IsolateCounters>,
    shutdown: Arc<AtomicBool>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Task> IsolatedWorkerPoolProcessor<T> {
    /// Validate the configuration, build a controller and start its router.
    ///
    /// # Errors
    ///
    /// Returns `ProcessorError::InvalidConfig` for an invalid configuration,
    /// or `ProcessorError::Spawn` when the router thread cannot start.
    pub fn new<H: IsolateHost>(
        config: IsolatePoolConfig,
        host: H,
        codec: Arc<dyn TaskCodec<T>>,
    ) -> Result<Self, ProcessorError> {
        config.validate().map_err(ProcessorError::InvalidConfig)?;
        Self::spawn(PoolController::new(config, host, codec))
    }

    /// Start a router thread for an already configured controller, for
    /// example one carrying an event sink.
    ///
    /// # Errors
    ///
    /// Returns `ProcessorError::InvalidConfig` for an invalid configuration,
    /// or `ProcessorError::Spawn` when the router thread cannot start.
    pub fn spawn<H: IsolateHost>(controller: PoolController<T, H>) -> Result<Self, ProcessorError> {
        let config = controller.config().clone();
        config.validate().map_err(ProcessorError::InvalidConfig)?;

        let (submit_tx, submit_rx) = unbounded::<Job<T>>();
        let counters = controller.counters();
        let router = thread::Builder::new()
            .name("isolate-router".into())
            .spawn(move || run_router(controller, &submit_rx))
            .map_err(|e| ProcessorError::Spawn(e.to_string()))?;

        info!(
            max_workers = config.max_workers,
            recycle_after_error = config.recycle_after_error,
            "isolated worker pool started"
        );

        Ok(Self {
            config,
            submit_tx: Mutex::new(Some(submit_tx)),
            counters,
            shutdown: Arc::new(AtomicBool::new(false)),
            router: Mutex::new(Some(router)),
        })
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> IsolatePoolStats {
        self.counters.snapshot(self.config.max_workers)
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting jobs, terminate every worker and wait up to `timeout`
    /// for the router to exit. Jobs still in flight are dropped without
    /// their callbacks firing.
    pub fn shutdown(&self, timeout: Duration) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down isolated worker pool");
        *self.submit_tx.lock() = None;

        let Some(router) = self.router.lock().take() else {
            return;
        };
        let (tx, rx) = crossbeam_channel::bounded(1);
        let join_thread = thread::spawn(move || {
            let _ = tx.send(router.join().is_ok());
        });
        match rx.recv_timeout(timeout) {
            Ok(true) => debug!("router joined"),
            Ok(false) => warn!("router thread panicked"),
            Err(_) => warn!("router did not exit within timeout; detaching"),
        }
        drop(join_thread);
    }
}

impl<T: Task> JobProcessor<T> for IsolatedWorkerPoolProcessor<T> {
    fn process_job(&self, job: Job<T>) -> Result<(), ProcessorError> {
        if self.is_shutdown() {
            return Err(ProcessorError::Shutdown);
        }
        if job.is_empty() {
            debug!(job_id = %job.id(), "empty job completed on submission");
            job.fire_empty();
            return Ok(());
        }
        let guard = self.submit_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(ProcessorError::Shutdown);
        };
        tx.send(job).map_err(|_| ProcessorError::Shutdown)
    }
}

impl<T: Task> Drop for IsolatedWorkerPoolProcessor<T> {
    fn drop(&mut self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            *self.submit_tx.lock() = None;
            debug!("isolated worker pool dropped without explicit shutdown; router detached");
        }
    }
}

/// Router loop: runs until every submission handle is gone.
fn run_router<T: Task, H: IsolateHost>(mut controller: PoolController<T, H>, submissions: &Receiver<Job<T>>) {
    let inbox = controller.inbox();
    debug!("isolate router started");
    loop {
        select! {
            recv(submissions) -> job => match job {
                Ok(job) => controller.submit(job),
                Err(_) => break,
            },
            recv(inbox) -> message => match message {
                Ok(message) => controller.handle_message(message),
                Err(_) => break,
            },
        }
    }
    let dropped = controller.shutdown();
    debug!(dropped_jobs = dropped, "isolate router exiting");
}
