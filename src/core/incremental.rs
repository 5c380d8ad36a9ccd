//! Cooperative, one-task-per-tick job processing.
//!
//! [`IncrementalScheduler`] never runs anything on the caller's thread (apart
//! from completing an empty job). It hands each job to a
//! [`CooperativeScheduler`] as a [`RepeatingCommand`] that runs one task per
//! step and asks to be called again until the job resolves.

use tracing::{debug, trace};

use crate::core::job::Resolution;
use crate::core::{run_task, Job, JobId, JobProcessor, JobProgress, ProcessorError, Task, TaskContext};

/// A command stepped repeatedly by a cooperative scheduler.
pub trait RepeatingCommand: Send {
    /// Run one step. Returns `true` to be scheduled again.
    fn execute(&mut self) -> bool;
}

/// Single-threaded tick source that steps repeating commands, yielding
/// control between steps.
pub trait CooperativeScheduler: Send + Sync {
    /// Schedule `command` until it returns `false`.
    fn schedule_incremental(&self, command: Box<dyn RepeatingCommand>);
}

/// Job processor stepping one task per cooperative tick.
#[derive(Debug, Clone, Default)]
pub struct IncrementalScheduler<S> {
    scheduler: S,
}

impl<S: CooperativeScheduler> IncrementalScheduler<S> {
    /// Create a processor on top of a tick source.
    pub const fn new(scheduler: S) -> Self {
        Self { scheduler }
    }

    /// Underlying tick source.
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }
}

impl<T: Task, S: CooperativeScheduler> JobProcessor<T> for IncrementalScheduler<S> {
    fn process_job(&self, job: Job<T>) -> Result<(), ProcessorError> {
        if job.is_empty() {
            debug!(job_id = %job.id(), "empty job completed on submission");
            job.fire_empty();
            return Ok(());
        }
        let (job_id, tasks, progress) = job.into_parts();
        debug!(job_id = %job_id, tasks = tasks.len(), "job scheduled incrementally");
        self.scheduler.schedule_incremental(Box::new(JobStepper {
            job_id,
            tasks,
            progress,
            next: 0,
        }));
        Ok(())
    }
}

/// Walks one job's tasks in index order.
struct JobStepper<T: Task> {
    job_id: JobId,
    tasks: Vec<T>,
    progress: JobProgress<T::Output>,
    next: usize,
}

impl<T: Task> RepeatingCommand for JobStepper<T> {
    fn execute(&mut self) -> bool {
        let index = self.next;
        let Some(task) = self.tasks.get_mut(index) else {
            return false;
        };
        self.next += 1;
        trace!(job_id = %self.job_id, task_index = index, "incremental step");

        let outcome = run_task(task, &TaskContext::local(index));
        match self.progress.record(index, outcome) {
            Resolution::Complete(completion) => {
                debug!(job_id = %self.job_id, "job completed");
                completion.fire();
                false
            }
            Resolution::Pending => true,
        }
    }
}
