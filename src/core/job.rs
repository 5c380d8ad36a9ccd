//! Jobs, completion tracking and the processor contract.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use uuid::Uuid;

use crate::core::task::panic_message;
use crate::core::{ProcessorError, Task, TaskError};

/// Identifier assigned to every job at construction.
pub type JobId = Uuid;

/// Results handed to a job callback, index-aligned with the job's tasks.
/// Failed tasks leave `None` in their slot.
pub type JobResults<R> = Vec<Option<R>>;

/// Completion callback, invoked exactly once per admitted job.
pub type JobCallback<R> = Box<dyn FnOnce(JobResults<R>) + Send + 'static>;

/// An ordered batch of tasks sharing one completion callback.
pub struct Job<T: Task> {
    id: JobId,
    tasks: Vec<T>,
    callback: JobCallback<T::Output>,
}

impl<T: Task> Job<T> {
    /// Create a job from its tasks and completion callback.
    pub fn new<F>(tasks: Vec<T>, callback: F) -> Self
    where
        F: FnOnce(JobResults<T::Output>) + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            tasks,
            callback: Box::new(callback),
        }
    }

    /// Job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Tasks in submission order.
    #[must_use]
    pub fn tasks(&self) -> &[T] {
        &self.tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the job has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Fire the callback of a job without tasks.
    pub(crate) fn fire_empty(self) {
        debug_assert!(self.tasks.is_empty());
        invoke(self.id, self.callback, Vec::new());
    }

    /// Split the job into its id, tasks and a progress record owning the callback.
    #[must_use]
    pub fn into_parts(self) -> (JobId, Vec<T>, JobProgress<T::Output>) {
        let progress = JobProgress::new(self.id, self.tasks.len(), self.callback);
        (self.id, self.tasks, progress)
    }
}

impl<T: Task> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

/// Result slots and counters for one job.
///
/// Each slot is written at most once; the callback is taken out of the record
/// the moment the last task resolves, so it cannot fire twice.
pub struct JobProgress<R> {
    job_id: JobId,
    results: JobResults<R>,
    resolved: Vec<bool>,
    succeeded: usize,
    failed: usize,
    callback: Option<JobCallback<R>>,
}

/// What recording an outcome produced.
pub enum Resolution<R> {
    /// More tasks are outstanding.
    Pending,
    /// The job just completed; the caller must invoke the completion.
    Complete(JobCompletion<R>),
}

/// A completed job's callback bundled with its results.
pub struct JobCompletion<R> {
    job_id: JobId,
    results: JobResults<R>,
    callback: JobCallback<R>,
}

impl<R> JobCompletion<R> {
    /// Job that completed.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Invoke the callback. A panic raised by the callback is logged and
    /// contained on the firing thread.
    pub fn fire(self) {
        invoke(self.job_id, self.callback, self.results);
    }
}

fn invoke<R>(job_id: JobId, callback: JobCallback<R>, results: JobResults<R>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || callback(results))) {
        tracing::error!(job_id = %job_id, panic = %panic_message(payload.as_ref()), "job callback panicked");
    }
}

impl<R> JobProgress<R> {
    /// Create an empty progress record for `total` tasks.
    #[must_use]
    pub fn new(job_id: JobId, total: usize, callback: JobCallback<R>) -> Self {
        Self {
            job_id,
            results: std::iter::repeat_with(|| None).take(total).collect(),
            resolved: vec![false; total],
            succeeded: 0,
            failed: 0,
            callback: Some(callback),
        }
    }

    /// Job this record belongs to.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Number of task slots.
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Tasks that succeeded so far.
    #[must_use]
    pub const fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Tasks that failed so far.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Tasks resolved so far, successful or not.
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Record the outcome of the task at `index`.
    ///
    /// A second outcome for an already resolved slot, or an index out of
    /// range, is ignored.
    pub fn record(&mut self, index: usize, outcome: Result<R, TaskError>) -> Resolution<R> {
        if self.resolved.get(index).copied().unwrap_or(true) {
            tracing::warn!(job_id = %self.job_id, task_index = index, "duplicate or out of range task outcome ignored");
            return Resolution::Pending;
        }
        self.resolved[index] = true;
        match outcome {
            Ok(value) => {
                self.results[index] = Some(value);
                self.succeeded += 1;
            }
            Err(err) => {
                tracing::error!(job_id = %self.job_id, task_index = index, error = %err, "task failed");
                self.failed += 1;
            }
        }
        tracing::debug!(
            job_id = %self.job_id,
            completed = self.completed(),
            succeeded = self.succeeded,
            total = self.total(),
            "task resolved"
        );
        self.try_complete()
    }

    /// Take the completion if every slot is resolved. A zero-task job is
    /// complete immediately.
    pub fn try_complete(&mut self) -> Resolution<R> {
        if self.completed() < self.total() {
            return Resolution::Pending;
        }
        match self.callback.take() {
            Some(callback) => Resolution::Complete(JobCompletion {
                job_id: self.job_id,
                results: std::mem::take(&mut self.results),
                callback,
            }),
            None => Resolution::Pending,
        }
    }
}

impl<R> fmt::Debug for JobProgress<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobProgress")
            .field("job_id", &self.job_id)
            .field("total", &self.total())
            .field("succeeded", &self.succeeded)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

/// Component that accepts a job, runs all its tasks and invokes the job's
/// callback exactly once with index-aligned results.
pub trait JobProcessor<T: Task>: Send + Sync {
    /// Submit a job.
    ///
    /// # Errors
    ///
    /// Returns an error only when the job was not admitted, in which case its
    /// callback never fires. Task failures are reported through the results.
    fn process_job(&self, job: Job<T>) -> Result<(), ProcessorError>;
}

impl<T: Task, P: JobProcessor<T> + ?Sized> JobProcessor<T> for Box<P> {
    fn process_job(&self, job: Job<T>) -> Result<(), ProcessorError> {
        (**self).process_job(job)
    }
}
