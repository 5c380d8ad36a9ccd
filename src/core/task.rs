//! The unit of work and its execution boundary.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::core::isolate_pool::protocol;
use crate::core::isolate_pool::MessageRoute;
use crate::core::TaskError;

/// Whether a task carries state that must travel to an isolated worker.
///
/// Decided by the task itself rather than probed at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    /// The task is serialized and shipped as the start message.
    #[default]
    HasPayload,
    /// The worker runs its own instance; the start message is `start!`.
    Stateless,
}

/// A unit of work producing one result.
///
/// Tasks are moved into a [`crate::core::Job`] and executed by whichever
/// processor receives the job. `execute` may fail; failures (and panics) are
/// caught at the runner boundary and leave the task's result slot empty.
///
/// ```rust
/// use prometheus_tasks::core::{Task, TaskContext, TaskError};
///
/// struct Greet(String);
///
/// impl Task for Greet {
///     type Output = String;
///
///     fn execute(&mut self, _ctx: &TaskContext<'_>) -> Result<String, TaskError> {
///         Ok(format!("Hello {}", self.0))
///     }
/// }
/// ```
pub trait Task: Send + 'static {
    /// Result produced by a successful run.
    type Output: Send + 'static;

    /// Run the task.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] when the task cannot produce a result.
    fn execute(&mut self, ctx: &TaskContext<'_>) -> Result<Self::Output, TaskError>;

    /// Key used to pick (and recycle) isolated workers. Defaults to the
    /// unqualified type name.
    fn worker_type(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Whether the task travels as a serialized payload.
    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::HasPayload
    }
}

/// Last path segment of a type name, generics stripped.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Where a task's diagnostic messages go.
#[derive(Debug, Clone, Copy)]
enum LogTarget<'a> {
    Local,
    Remote(&'a MessageRoute),
}

/// Execution context handed to [`Task::execute`].
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    task_index: usize,
    target: LogTarget<'a>,
}

impl<'a> TaskContext<'a> {
    /// Context for a task running inside the controlling process.
    #[must_use]
    pub const fn local(task_index: usize) -> Self {
        Self {
            task_index,
            target: LogTarget::Local,
        }
    }

    /// Context for a task running inside an isolated worker; logs are framed
    /// back to the controller.
    #[must_use]
    pub const fn remote(route: &'a MessageRoute) -> Self {
        Self {
            task_index: 0,
            target: LogTarget::Remote(route),
        }
    }

    /// Index of the task within its job, when known to the runner.
    #[must_use]
    pub const fn task_index(&self) -> usize {
        self.task_index
    }

    /// Emit a diagnostic message.
    pub fn log(&self, message: impl AsRef<str>) {
        match self.target {
            LogTarget::Local => {
                tracing::info!(target: "prometheus_tasks::worker", task_index = self.task_index, "{}", message.as_ref());
            }
            LogTarget::Remote(route) => {
                route.post(protocol::log(message.as_ref()));
            }
        }
    }
}

/// Run a task, converting panics into [`TaskError::Panicked`].
pub fn run_task<T: Task>(task: &mut T, ctx: &TaskContext<'_>) -> Result<T::Output, TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(|| task.execute(ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HelloWorldTask {
        parameter: String,
    }

    impl Task for HelloWorldTask {
        type Output = String;

        fn execute(&mut self, _ctx: &TaskContext<'_>) -> Result<String, TaskError> {
            Ok(format!("Hello {}", self.parameter))
        }
    }

    struct Exploding;

    impl Task for Exploding {
        type Output = ();

        fn execute(&mut self, _ctx: &TaskContext<'_>) -> Result<(), TaskError> {
            panic!("boom")
        }
    }

    #[test]
    fn test_worker_type_defaults_to_short_name() {
        let task = HelloWorldTask {
            parameter: "x".into(),
        };
        assert_eq!(task.worker_type(), "HelloWorldTask");
        assert_eq!(task.payload_mode(), PayloadMode::HasPayload);
    }

    #[test]
    fn test_short_type_name_strips_generics() {
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn test_run_task_success() {
        let mut task = HelloWorldTask {
            parameter: "world".into(),
        };
        let out = run_task(&mut task, &TaskContext::local(0));
        assert_eq!(out, Ok("Hello world".to_string()));
    }

    #[test]
    fn test_run_task_catches_panic() {
        let out = run_task(&mut Exploding, &TaskContext::local(3));
        assert_eq!(out, Err(TaskError::Panicked("boom".into())));
    }
}
