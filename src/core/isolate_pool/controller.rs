//! Dispatch, recycling and eviction for isolated workers.
//!
//! The controller is a plain state machine. Every entry point (`submit`,
//! `handle_message`, `shutdown`) runs to completion before the next one
//! starts; [`super::IsolatedWorkerPoolProcessor`] guarantees this by owning the
//! controller on a single router thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info, trace, warn};

use crate::config::IsolatePoolConfig;
use crate::core::events::{EventSink, JobEvent, JobEventKind};
use crate::core::job::Resolution;
use crate::core::{HostError, Job, JobId, JobProgress, PayloadMode, Task, TaskError};

use super::cache::IdleWorkerCache;
use super::codec::TaskCodec;
use super::host::{IsolateHost, MessageRoute, RoutedMessage};
use super::protocol::{self, WorkerMessage};
use super::{IsolateCounters, IsolatePoolStats, WorkerId};

/// What a worker context is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Bound to one task of one job.
    Busy {
        /// Job owning the task.
        job: JobId,
        /// Index of the task within the job.
        task_index: usize,
    },
    /// Parked in the idle cache.
    Idle,
}

/// One isolated context owned by the controller.
struct WorkerContext<H> {
    worker_type: String,
    handle: H,
    state: WorkerState,
}

/// A queued job plus its dispatch cursor.
struct PendingJob<T: Task> {
    id: JobId,
    tasks: Vec<T>,
    progress: JobProgress<T::Output>,
    next_task: usize,
}

/// Single-threaded controller of the isolated worker pool.
///
/// Jobs are processed strictly in submission order: only the head job has
/// tasks dispatched, and it leaves the queue once all of its tasks resolved.
/// Capacity is `active + idle <= max_workers`; an idle worker of another type
/// is evicted when a cold start needs room.
pub struct PoolController<T: Task, H: IsolateHost> {
    config: IsolatePoolConfig,
    host: H,
    codec: Arc<dyn TaskCodec<T>>,
    pending: VecDeque<PendingJob<T>>,
    workers: HashMap<WorkerId, WorkerContext<H::Handle>>,
    idle: IdleWorkerCache,
    active_workers: usize,
    next_worker_id: WorkerId,
    router_tx: Sender<RoutedMessage>,
    inbox: Receiver<RoutedMessage>,
    counters: Arc<IsolateCounters>,
    events: Option<Box<dyn EventSink>>,
}

impl<T: Task, H: IsolateHost> PoolController<T, H> {
    /// Create a controller. Worker replies are collected on an internal
    /// channel exposed through [`Self::inbox`].
    pub fn new(config: IsolatePoolConfig, host: H, codec: Arc<dyn TaskCodec<T>>) -> Self {
        let (router_tx, inbox) = unbounded();
        Self {
            config,
            host,
            codec,
            pending: VecDeque::new(),
            workers: HashMap::new(),
            idle: IdleWorkerCache::new(),
            active_workers: 0,
            next_worker_id: 1,
            router_tx,
            inbox,
            counters: Arc::new(IsolateCounters::default()),
            events: None,
        }
    }

    /// Attach an event sink.
    #[must_use]
    pub fn with_events(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Some(Box::new(sink));
        self
    }

    /// Receiver of every message posted by this controller's workers.
    #[must_use]
    pub fn inbox(&self) -> Receiver<RoutedMessage> {
        self.inbox.clone()
    }

    pub(crate) fn counters(&self) -> Arc<IsolateCounters> {
        Arc::clone(&self.counters)
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &IsolatePoolConfig {
        &self.config
    }

    /// Workers currently bound to a task.
    #[must_use]
    pub const fn active_workers(&self) -> usize {
        self.active_workers
    }

    /// Workers parked in the idle cache.
    #[must_use]
    pub const fn idle_workers(&self) -> usize {
        self.idle.len()
    }

    /// Idle workers of one type.
    #[must_use]
    pub fn idle_workers_of(&self, worker_type: &str) -> usize {
        self.idle.count(worker_type)
    }

    /// Jobs submitted and not yet completed.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// State of a worker, if it is alive.
    #[must_use]
    pub fn worker_state(&self, worker: WorkerId) -> Option<WorkerState> {
        self.workers.get(&worker).map(|ctx| ctx.state)
    }

    /// Whether a worker is listed in the idle cache.
    #[must_use]
    pub fn is_idle_listed(&self, worker: WorkerId) -> bool {
        self.idle.contains(worker)
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> IsolatePoolStats {
        self.counters.snapshot(self.config.max_workers)
    }

    /// Admit a job. A job without tasks completes immediately and is never
    /// queued.
    pub fn submit(&mut self, job: Job<T>) {
        if job.is_empty() {
            debug!(job_id = %job.id(), "empty job completed on admission");
            job.fire_empty();
            return;
        }
        let (id, tasks, progress) = job.into_parts();
        info!(job_id = %id, tasks = tasks.len(), queued_jobs = self.pending.len() + 1, "job queued");
        self.pending.push_back(PendingJob {
            id,
            tasks,
            progress,
            next_task: 0,
        });
        self.emit(self.event(JobEventKind::JobQueued).with_job(id));
        self.launch_tasks();
    }

    /// Handle one message from a worker.
    pub fn handle_message(&mut self, message: RoutedMessage) {
        let RoutedMessage { worker, data } = message;
        trace!(worker_id = worker, message = %data, "message received from worker");
        match WorkerMessage::parse(&data) {
            WorkerMessage::Completed(payload) => self.on_task_finished(worker, Ok(payload)),
            WorkerMessage::Error(message) => self.on_task_finished(worker, Err(message)),
            WorkerMessage::Log(line) => {
                info!(target: "prometheus_tasks::worker", worker_id = worker, "{line}");
                let event = self.worker_event(JobEventKind::WorkerLog, worker).with_detail(line);
                self.emit(event);
            }
            WorkerMessage::Unrecognized(raw) => {
                warn!(worker_id = worker, message = raw, "received unexpected message from worker");
                let event = self
                    .worker_event(JobEventKind::UnrecognizedMessage, worker)
                    .with_detail(raw);
                self.emit(event);
            }
        }
        self.publish();
    }

    /// Handle every message already waiting in the inbox without blocking.
    /// Returns how many were handled.
    pub fn drain_inbox(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Terminate every worker and drop unfinished jobs. Their callbacks do not
    /// fire. Returns the number of dropped jobs.
    pub fn shutdown(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            warn!(dropped_jobs = dropped, "isolate pool shut down with unfinished jobs");
        }
        self.pending.clear();
        self.idle.clear();
        for (worker, ctx) in self.workers.drain() {
            debug!(worker_id = worker, worker_type = %ctx.worker_type, "terminating worker");
            self.host.terminate(ctx.handle);
        }
        self.active_workers = 0;
        self.publish();
        dropped
    }

    /// Dispatch head-job tasks until capacity or the head job's unstarted
    /// tasks run out.
    fn launch_tasks(&mut self) {
        loop {
            if self.active_workers >= self.config.max_workers {
                trace!(active_workers = self.active_workers, "capacity exhausted");
                break;
            }
            let Some(head) = self.pending.front_mut() else {
                break;
            };
            if head.next_task >= head.tasks.len() {
                break;
            }
            let task_index = head.next_task;
            head.next_task += 1;
            let job_id = head.id;
            if let Err(err) = self.dispatch(task_index) {
                let event = self
                    .event(JobEventKind::TaskFailed)
                    .with_task(job_id, task_index)
                    .with_detail(err.to_string());
                self.emit(event);
                self.resolve(job_id, task_index, Err(err));
            }
        }
        self.publish();
    }

    /// Start the head job's task at `task_index` on a worker.
    fn dispatch(&mut self, task_index: usize) -> Result<(), TaskError> {
        let Some(head) = self.pending.front() else {
            return Ok(());
        };
        let job_id = head.id;
        let total = head.tasks.len();
        let task = &head.tasks[task_index];
        let worker_type = task.worker_type().to_owned();
        let message = match task.payload_mode() {
            PayloadMode::Stateless => protocol::START_MESSAGE.to_owned(),
            PayloadMode::HasPayload => self.codec.serialize(task)?,
        };

        let worker = self.bind_worker(&worker_type, job_id, task_index)?;
        let sent = match self.workers.get(&worker) {
            Some(ctx) => self.host.send(&ctx.handle, message),
            None => Err(HostError::Disconnected),
        };
        if let Err(err) = sent {
            self.active_workers -= 1;
            self.retire_worker(worker, "send failed");
            return Err(err.into());
        }

        debug!(
            job_id = %job_id,
            worker_id = worker,
            worker_type = %worker_type,
            "task {} / {} started",
            task_index + 1,
            total
        );
        let event = self
            .worker_event(JobEventKind::TaskDispatched, worker)
            .with_task(job_id, task_index);
        self.emit(event);
        Ok(())
    }

    /// Reuse an idle worker of `worker_type` or cold-start one, and bind it.
    fn bind_worker(
        &mut self,
        worker_type: &str,
        job: JobId,
        task_index: usize,
    ) -> Result<WorkerId, HostError> {
        let worker = if let Some(worker) = self.idle.pop(worker_type) {
            self.counters.reused_workers.fetch_add(1, Ordering::Relaxed);
            trace!(worker_id = worker, worker_type, "reusing idle worker");
            let event = self.worker_event(JobEventKind::WorkerReused, worker);
            self.emit(event);
            worker
        } else {
            if self.active_workers + self.idle.len() >= self.config.max_workers {
                self.evict_idle_worker();
            }
            self.spawn_worker(worker_type)?
        };

        if let Some(ctx) = self.workers.get_mut(&worker) {
            ctx.state = WorkerState::Busy { job, task_index };
        }
        self.active_workers += 1;
        self.counters
            .peak_active_workers
            .fetch_max(self.active_workers, Ordering::Relaxed);
        Ok(worker)
    }

    fn spawn_worker(&mut self, worker_type: &str) -> Result<WorkerId, HostError> {
        let worker = self.next_worker_id;
        debug!(worker_id = worker, worker_type, "loading worker");
        let route = MessageRoute::new(worker, self.router_tx.clone());
        let handle = self.host.spawn(worker_type, route)?;
        self.next_worker_id += 1;
        self.workers.insert(
            worker,
            WorkerContext {
                worker_type: worker_type.to_owned(),
                handle,
                state: WorkerState::Idle,
            },
        );
        self.counters.spawned_workers.fetch_add(1, Ordering::Relaxed);
        let event = self.worker_event(JobEventKind::WorkerSpawned, worker);
        self.emit(event);
        Ok(worker)
    }

    /// Terminate the first idle worker found, if any.
    fn evict_idle_worker(&mut self) {
        let Some(worker) = self.idle.pop_any() else {
            return;
        };
        if let Some(ctx) = self.workers.remove(&worker) {
            debug!(worker_id = worker, worker_type = %ctx.worker_type, "evicting idle worker");
            let event = JobEvent::new(JobEventKind::WorkerEvicted, self.active_workers, self.idle.len())
                .with_worker(worker, &ctx.worker_type);
            self.host.terminate(ctx.handle);
            self.counters.evicted_workers.fetch_add(1, Ordering::Relaxed);
            self.emit(event);
        }
    }

    fn retire_worker(&mut self, worker: WorkerId, reason: &str) {
        if let Some(ctx) = self.workers.remove(&worker) {
            debug!(worker_id = worker, worker_type = %ctx.worker_type, reason, "retiring worker");
            let event = JobEvent::new(JobEventKind::WorkerRetired, self.active_workers, self.idle.len())
                .with_worker(worker, &ctx.worker_type)
                .with_detail(reason);
            self.host.terminate(ctx.handle);
            self.counters.retired_workers.fetch_add(1, Ordering::Relaxed);
            self.emit(event);
        }
    }

    /// A worker reported the end of its bound task.
    fn on_task_finished(&mut self, worker: WorkerId, outcome: Result<&str, &str>) {
        let Some(ctx) = self.workers.get_mut(&worker) else {
            warn!(worker_id = worker, "terminal message from unknown worker ignored");
            return;
        };
        let WorkerState::Busy { job, task_index } = ctx.state else {
            warn!(worker_id = worker, "terminal message from idle worker ignored");
            return;
        };
        ctx.state = WorkerState::Idle;
        let worker_type = ctx.worker_type.clone();
        self.active_workers -= 1;

        if outcome.is_ok() || self.config.recycle_after_error {
            self.idle.push(&worker_type, worker);
        } else {
            self.retire_worker(worker, "task error");
        }

        let result = match outcome {
            Ok(payload) => self
                .codec
                .deserialize(payload, &worker_type)
                .map_err(TaskError::from),
            Err(message) => {
                error!(
                    job_id = %job,
                    task_index,
                    worker_type = %worker_type,
                    "task <{worker_type}> failed with message <{message}>"
                );
                Err(TaskError::Remote(message.to_owned()))
            }
        };
        let kind = if result.is_ok() {
            JobEventKind::TaskSucceeded
        } else {
            JobEventKind::TaskFailed
        };
        let event = JobEvent::new(kind, self.active_workers, self.idle.len())
            .with_worker(worker, &worker_type)
            .with_task(job, task_index);
        self.emit(event);

        self.resolve(job, task_index, result);
        self.launch_tasks();
    }

    /// Record a task outcome and complete the job if it was the last one.
    fn resolve(&mut self, job: JobId, task_index: usize, outcome: Result<T::Output, TaskError>) {
        let Some(position) = self.pending.iter().position(|pending| pending.id == job) else {
            warn!(job_id = %job, task_index, "outcome for unknown job ignored");
            return;
        };
        let counter = if outcome.is_ok() {
            &self.counters.completed_tasks
        } else {
            &self.counters.failed_tasks
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let progress = &mut self.pending[position].progress;
        if let Resolution::Complete(completion) = progress.record(task_index, outcome) {
            let succeeded = progress.succeeded();
            let failed = progress.failed();
            self.pending.remove(position);
            self.counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
            info!(job_id = %job, succeeded, failed, "job completed");
            self.emit(self.event(JobEventKind::JobCompleted).with_job(job));
            self.publish();
            completion.fire();
        }
    }

    fn event(&self, kind: JobEventKind) -> JobEvent {
        JobEvent::new(kind, self.active_workers, self.idle.len())
    }

    fn worker_event(&self, kind: JobEventKind, worker: WorkerId) -> JobEvent {
        let event = self.event(kind);
        match self.workers.get(&worker) {
            Some(ctx) => event.with_worker(worker, &ctx.worker_type),
            None => event,
        }
    }

    fn emit(&mut self, event: JobEvent) {
        if let Some(sink) = self.events.as_mut() {
            sink.record(event);
        }
    }

    fn publish(&self) {
        self.counters.active_workers.store(self.active_workers, Ordering::Relaxed);
        self.counters.idle_workers.store(self.idle.len(), Ordering::Relaxed);
        self.counters.queued_jobs.store(self.pending.len(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::InMemoryEventSink;
    use crate::core::{CodecError, JobResults, TaskContext};
    use parking_lot::Mutex;

    /// Task whose worker type and payload are chosen by the test.
    struct Probe {
        worker_type: &'static str,
        param: String,
        mode: PayloadMode,
    }

    impl Probe {
        fn of(worker_type: &'static str, param: &str) -> Self {
            Self {
                worker_type,
                param: param.into(),
                mode: PayloadMode::HasPayload,
            }
        }
    }

    impl Task for Probe {
        type Output = String;

        fn execute(&mut self, _ctx: &TaskContext<'_>) -> Result<String, TaskError> {
            Ok(format!("Hello {}", self.param))
        }

        fn worker_type(&self) -> &str {
            self.worker_type
        }

        fn payload_mode(&self) -> PayloadMode {
            self.mode
        }
    }

    /// Codec echoing the parameter; refuses parameters named "unserializable".
    struct EchoCodec;

    impl TaskCodec<Probe> for EchoCodec {
        fn serialize(&self, task: &Probe) -> Result<String, CodecError> {
            if task.param == "unserializable" {
                return Err(CodecError::UnsupportedType(task.worker_type.into()));
            }
            Ok(task.param.clone())
        }

        fn deserialize(&self, payload: &str, _worker_type: &str) -> Result<String, CodecError> {
            Ok(payload.to_owned())
        }
    }

    #[derive(Default)]
    struct HostLog {
        spawned: Vec<(WorkerId, String)>,
        sent: Vec<(WorkerId, String)>,
        terminated: Vec<WorkerId>,
    }

    /// Host recording every call; handles are worker ids.
    #[derive(Clone, Default)]
    struct RecordingHost {
        log: Arc<Mutex<HostLog>>,
        broken_send: Arc<Mutex<Vec<WorkerId>>>,
    }

    impl IsolateHost for RecordingHost {
        type Handle = WorkerId;

        fn spawn(&mut self, worker_type: &str, route: MessageRoute) -> Result<WorkerId, HostError> {
            if worker_type == "Missing" {
                return Err(HostError::UnknownWorkerType(worker_type.into()));
            }
            self.log.lock().spawned.push((route.worker(), worker_type.into()));
            Ok(route.worker())
        }

        fn send(&mut self, handle: &WorkerId, message: String) -> Result<(), HostError> {
            if self.broken_send.lock().contains(handle) {
                return Err(HostError::Disconnected);
            }
            self.log.lock().sent.push((*handle, message));
            Ok(())
        }

        fn terminate(&mut self, handle: WorkerId) {
            self.log.lock().terminated.push(handle);
        }
    }

    type Calls = Arc<Mutex<Vec<JobResults<String>>>>;

    fn controller(max_workers: usize) -> (PoolController<Probe, RecordingHost>, RecordingHost) {
        let host = RecordingHost::default();
        let config = IsolatePoolConfig::new().with_max_workers(max_workers);
        (PoolController::new(config, host.clone(), Arc::new(EchoCodec)), host)
    }

    fn job(tasks: Vec<Probe>, calls: &Calls) -> Job<Probe> {
        let calls = Arc::clone(calls);
        Job::new(tasks, move |results| calls.lock().push(results))
    }

    fn reply(ctl: &mut PoolController<Probe, RecordingHost>, worker: WorkerId, data: &str) {
        ctl.handle_message(RoutedMessage {
            worker,
            data: data.into(),
        });
    }

    fn assert_capacity(ctl: &PoolController<Probe, RecordingHost>) {
        assert!(ctl.active_workers() + ctl.idle_workers() <= ctl.config().max_workers);
    }

    #[test]
    fn test_single_task_round_trip() {
        let (mut ctl, host) = controller(4);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "worker")], &calls));

        assert_eq!(host.log.lock().spawned, vec![(1, "X".to_string())]);
        assert_eq!(host.log.lock().sent, vec![(1, "worker".to_string())]);
        assert_eq!(ctl.active_workers(), 1);

        reply(&mut ctl, 1, "TC::Hello worker");
        assert_eq!(calls.lock().as_slice(), &[vec![Some("Hello worker".to_string())]]);
        assert_eq!(ctl.active_workers(), 0);
        assert_eq!(ctl.idle_workers_of("X"), 1);
        assert_eq!(ctl.pending_jobs(), 0);
    }

    #[test]
    fn test_fan_out_respects_ceiling() {
        let (mut ctl, host) = controller(4);
        let calls = Calls::default();
        let tasks = (0..5).map(|i| Probe::of("X", &i.to_string())).collect();
        ctl.submit(job(tasks, &calls));

        assert_eq!(ctl.active_workers(), 4);
        assert_eq!(host.log.lock().sent.len(), 4);
        assert_capacity(&ctl);

        reply(&mut ctl, 2, "TC::r1");
        // Worker 2 is recycled for the fifth task; no fifth spawn.
        assert_eq!(host.log.lock().spawned.len(), 4);
        assert_eq!(host.log.lock().sent.last(), Some(&(2, "4".to_string())));
        assert_eq!(ctl.active_workers(), 4);
        assert_capacity(&ctl);

        for (worker, body) in [(1, "TC::r0"), (3, "TC::r2"), (4, "TC::r3"), (2, "TC::r4")] {
            reply(&mut ctl, worker, body);
            assert_capacity(&ctl);
        }
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            ["r0", "r1", "r2", "r3", "r4"].map(|s| Some(s.to_string())).to_vec()
        );
    }

    #[test]
    fn test_error_leaves_slot_empty_and_completes() {
        let (mut ctl, _host) = controller(4);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "a")], &calls));

        reply(&mut ctl, 1, "TERR::boom");
        assert_eq!(calls.lock().as_slice(), &[vec![None]]);
        assert_eq!(ctl.idle_workers(), 1);
        assert_eq!(ctl.stats().failed_tasks, 1);
    }

    #[test]
    fn test_error_retires_worker_when_recycling_disabled() {
        let host = RecordingHost::default();
        let config = IsolatePoolConfig::new().with_recycle_after_error(false);
        let mut ctl = PoolController::new(config, host.clone(), Arc::new(EchoCodec));
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "a")], &calls));

        reply(&mut ctl, 1, "TERR::boom");
        assert_eq!(ctl.idle_workers(), 0);
        assert_eq!(ctl.worker_state(1), None);
        assert_eq!(host.log.lock().terminated, vec![1]);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_jobs_complete_in_submission_order() {
        let (mut ctl, host) = controller(1);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("A", "a0"), Probe::of("A", "a1")], &calls));
        ctl.submit(job(vec![Probe::of("B", "b0")], &calls));

        assert_eq!(host.log.lock().sent, vec![(1, "a0".to_string())]);
        reply(&mut ctl, 1, "TC::A0");
        assert_eq!(host.log.lock().sent.last(), Some(&(1, "a1".to_string())));
        assert!(calls.lock().is_empty());

        reply(&mut ctl, 1, "TC::A1");
        // Job A fired, then B started on a fresh worker after evicting the idle A worker.
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(host.log.lock().terminated, vec![1]);
        assert_eq!(host.log.lock().sent.last(), Some(&(2, "b0".to_string())));
        assert_capacity(&ctl);

        reply(&mut ctl, 2, "TC::B0");
        let calls = calls.lock();
        assert_eq!(calls[0], vec![Some("A0".to_string()), Some("A1".to_string())]);
        assert_eq!(calls[1], vec![Some("B0".to_string())]);
    }

    #[test]
    fn test_second_job_waits_for_head_dispatch() {
        let (mut ctl, host) = controller(4);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("A", "a0")], &calls));
        ctl.submit(job(vec![Probe::of("B", "b0")], &calls));

        // Spare capacity, but job B waits until job A has fully resolved.
        assert_eq!(host.log.lock().sent.len(), 1);
        reply(&mut ctl, 1, "TC::A0");
        assert_eq!(host.log.lock().sent.last(), Some(&(2, "b0".to_string())));
    }

    #[test]
    fn test_log_messages_do_not_free_workers() {
        let sink = InMemoryEventSink::shared(64);
        let (ctl, _host) = controller(4);
        let mut ctl = ctl.with_events(Arc::clone(&sink));
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "a")], &calls));

        reply(&mut ctl, 1, "TLOG::halfway");
        reply(&mut ctl, 1, "garbage");
        assert_eq!(ctl.active_workers(), 1);
        assert_eq!(ctl.idle_workers(), 0);
        assert_eq!(
            ctl.worker_state(1),
            Some(WorkerState::Busy {
                job: sink.lock().events()[0].job_id.unwrap(),
                task_index: 0
            })
        );
        assert!(calls.lock().is_empty());
        assert_eq!(sink.lock().count(JobEventKind::WorkerLog), 1);
        assert_eq!(sink.lock().count(JobEventKind::UnrecognizedMessage), 1);
    }

    #[test]
    fn test_empty_job_fires_without_queueing() {
        let (mut ctl, host) = controller(4);
        let calls = Calls::default();
        ctl.submit(job(Vec::new(), &calls));
        assert_eq!(calls.lock().as_slice(), &[Vec::<Option<String>>::new()]);
        assert_eq!(ctl.pending_jobs(), 0);
        assert!(host.log.lock().spawned.is_empty());
    }

    #[test]
    fn test_stateless_task_sends_start_message() {
        let (mut ctl, host) = controller(4);
        let calls = Calls::default();
        let mut task = Probe::of("S", "ignored");
        task.mode = PayloadMode::Stateless;
        ctl.submit(job(vec![task], &calls));
        assert_eq!(host.log.lock().sent, vec![(1, "start!".to_string())]);
    }

    #[test]
    fn test_dispatch_failures_resolve_as_failed_slots() {
        let (mut ctl, host) = controller(4);
        let calls = Calls::default();
        ctl.submit(job(
            vec![
                Probe::of("X", "unserializable"),
                Probe::of("Missing", "m"),
                Probe::of("X", "ok"),
            ],
            &calls,
        ));

        assert_eq!(ctl.active_workers(), 1);
        assert_eq!(host.log.lock().sent, vec![(1, "ok".to_string())]);
        reply(&mut ctl, 1, "TC::done");
        assert_eq!(calls.lock().as_slice(), &[vec![None, None, Some("done".to_string())]]);
    }

    #[test]
    fn test_send_failure_retires_worker() {
        let (mut ctl, host) = controller(2);
        host.broken_send.lock().push(1);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "a")], &calls));

        assert_eq!(calls.lock().as_slice(), &[vec![None]]);
        assert_eq!(ctl.active_workers(), 0);
        assert_eq!(ctl.worker_state(1), None);
        assert_eq!(host.log.lock().terminated, vec![1]);
    }

    #[test]
    fn test_reuse_and_eviction_by_type() {
        let (mut ctl, host) = controller(2);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("A", "a"), Probe::of("B", "b")], &calls));
        reply(&mut ctl, 1, "TC::a");
        reply(&mut ctl, 2, "TC::b");
        assert_eq!(ctl.idle_workers(), 2);

        // Same type: reused without a cold start.
        ctl.submit(job(vec![Probe::of("B", "b2")], &calls));
        assert_eq!(host.log.lock().sent.last(), Some(&(2, "b2".to_string())));
        assert_eq!(host.log.lock().spawned.len(), 2);
        reply(&mut ctl, 2, "TC::b2");

        // New type at the ceiling: one idle worker is evicted first.
        ctl.submit(job(vec![Probe::of("C", "c")], &calls));
        assert_eq!(host.log.lock().terminated, vec![1]);
        assert_eq!(host.log.lock().spawned.last(), Some(&(3, "C".to_string())));
        assert_capacity(&ctl);
        assert!(!ctl.is_idle_listed(3));
        assert!(ctl.is_idle_listed(2));

        let stats = ctl.stats();
        assert_eq!(stats.spawned_workers, 3);
        assert_eq!(stats.reused_workers, 1);
        assert_eq!(stats.evicted_workers, 1);
    }

    #[test]
    fn test_messages_from_unknown_or_idle_workers_are_ignored() {
        let (mut ctl, _host) = controller(2);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "a")], &calls));
        reply(&mut ctl, 1, "TC::a");
        reply(&mut ctl, 1, "TC::again");
        reply(&mut ctl, 99, "TC::who");
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(ctl.idle_workers(), 1);
        assert_eq!(ctl.active_workers(), 0);
    }

    #[test]
    fn test_shutdown_terminates_all_workers() {
        let (mut ctl, host) = controller(3);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "a"), Probe::of("Y", "b")], &calls));
        reply(&mut ctl, 1, "TC::a");

        assert_eq!(ctl.shutdown(), 1);
        let mut terminated = host.log.lock().terminated.clone();
        terminated.sort_unstable();
        assert_eq!(terminated, vec![1, 2]);
        assert_eq!(ctl.active_workers(), 0);
        assert_eq!(ctl.idle_workers(), 0);
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_events_never_exceed_ceiling() {
        let sink = InMemoryEventSink::shared(1024);
        let (ctl, _host) = controller(2);
        let mut ctl = ctl.with_events(Arc::clone(&sink));
        let calls = Calls::default();
        let tasks = ["A", "B", "A", "C", "B", "A"]
            .into_iter()
            .map(|t| Probe::of(t, t))
            .collect();
        ctl.submit(job(tasks, &calls));
        let mut guard = 0;
        while ctl.active_workers() > 0 && guard < 100 {
            let busy: Vec<WorkerId> = (1..20)
                .filter(|w| matches!(ctl.worker_state(*w), Some(WorkerState::Busy { .. })))
                .collect();
            for worker in busy {
                reply(&mut ctl, worker, "TC::x");
            }
            guard += 1;
        }
        assert_eq!(calls.lock().len(), 1);
        for event in sink.lock().events() {
            assert!(event.active_workers + event.idle_workers <= 2, "{event:?}");
        }
    }

    #[test]
    fn test_drain_inbox_handles_posted_messages() {
        let (mut ctl, _host) = controller(1);
        let calls = Calls::default();
        ctl.submit(job(vec![Probe::of("X", "a")], &calls));
        let route = MessageRoute::new(1, ctl.router_tx.clone());
        route.post("TLOG::working");
        route.post("TC::a");
        assert_eq!(ctl.drain_inbox(), 2);
        assert_eq!(calls.lock().len(), 1);
    }
}
