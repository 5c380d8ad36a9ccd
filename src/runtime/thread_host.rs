//! Isolated contexts backed by dedicated OS threads.
//!
//! Each context owns its worker module and an inbox of strings. Nothing but
//! framed text crosses the boundary in either direction, so a module behaves
//! exactly as it would in a separate process.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::processor::DEFAULT_THREAD_STACK_SIZE;
use crate::core::isolate_pool::protocol::{self, START_MESSAGE};
use crate::core::isolate_pool::{IsolateHost, MessageRoute};
use crate::core::{run_task, HostError, Task, TaskContext, TaskError};

/// Code loaded into an isolated context.
pub trait WorkerModule: Send {
    /// Handle one inbound message, replying through `route`.
    fn on_message(&mut self, data: &str, route: &MessageRoute);
}

type ModuleFactory = Arc<dyn Fn() -> Box<dyn WorkerModule> + Send + Sync>;
type TaskDecoder<T> = Box<dyn Fn(&str) -> Result<T, TaskError> + Send>;

/// Worker modules by worker type.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    modules: HashMap<String, ModuleFactory>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module factory for `worker_type`. A later registration for
    /// the same type replaces the earlier one.
    pub fn register<F, M>(&mut self, worker_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: WorkerModule + 'static,
    {
        self.modules
            .insert(worker_type.into(), Arc::new(move || Box::new(factory()) as Box<dyn WorkerModule>));
        self
    }

    /// Register a task whose start message is its JSON state.
    pub fn register_task<T>(&mut self, worker_type: impl Into<String>) -> &mut Self
    where
        T: Task + DeserializeOwned,
        T::Output: Serialize,
    {
        self.register(worker_type, TaskWorker::<T>::json)
    }

    /// Register a stateless task: every `start!` message runs a fresh task
    /// built by `prototype`.
    pub fn register_stateless<T, F>(&mut self, worker_type: impl Into<String>, prototype: F) -> &mut Self
    where
        T: Task,
        T::Output: Serialize,
        F: Fn() -> T + Send + Sync + Clone + 'static,
    {
        self.register(worker_type, move || TaskWorker::stateless(prototype.clone()))
    }

    /// Whether a module is registered for `worker_type`.
    #[must_use]
    pub fn contains(&self, worker_type: &str) -> bool {
        self.modules.contains_key(worker_type)
    }

    fn factory(&self, worker_type: &str) -> Option<ModuleFactory> {
        self.modules.get(worker_type).cloned()
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.modules.keys().collect();
        types.sort();
        f.debug_struct("WorkerRegistry").field("worker_types", &types).finish()
    }
}

/// Worker module running one [`Task`] type.
///
/// Replies `TC::<json output>` on success and `TERR::<message>` on failure.
/// Logs written through [`TaskContext::log`] arrive at the controller as
/// `TLOG::` messages.
pub struct TaskWorker<T: Task> {
    decode: TaskDecoder<T>,
    executed: u64,
}

impl<T> TaskWorker<T>
where
    T: Task + DeserializeOwned,
{
    /// Decode each start message as the task's JSON state.
    #[must_use]
    pub fn json() -> Self {
        Self {
            decode: Box::new(|data| {
                serde_json::from_str(data).map_err(|e| TaskError::Codec(e.to_string()))
            }),
            executed: 0,
        }
    }
}

impl<T: Task> TaskWorker<T> {
    /// Run a fresh task from `prototype` for every `start!` message.
    pub fn stateless<F>(prototype: F) -> Self
    where
        F: Fn() -> T + Send + 'static,
    {
        Self {
            decode: Box::new(move |data| {
                if data == START_MESSAGE {
                    Ok(prototype())
                } else {
                    Err(TaskError::Codec(format!(
                        "stateless worker expected `{START_MESSAGE}`, got {} bytes",
                        data.len()
                    )))
                }
            }),
            executed: 0,
        }
    }

    /// Tasks run by this module so far.
    #[must_use]
    pub const fn executed(&self) -> u64 {
        self.executed
    }
}

impl<T> WorkerModule for TaskWorker<T>
where
    T: Task,
    T::Output: Serialize,
{
    fn on_message(&mut self, data: &str, route: &MessageRoute) {
        let outcome = (self.decode)(data).and_then(|mut task| {
            self.executed += 1;
            let output = run_task(&mut task, &TaskContext::remote(route))?;
            serde_json::to_string(&output).map_err(|e| TaskError::Codec(e.to_string()))
        });
        let reply = match outcome {
            Ok(payload) => protocol::completed(&payload),
            Err(err) => protocol::error(err.message()),
        };
        if !route.post(reply) {
            trace!(worker_id = route.worker(), "controller gone; reply dropped");
        }
    }
}

/// Handle to one thread-backed context.
#[derive(Debug)]
pub struct ThreadIsolate {
    inbox: Sender<String>,
    thread: JoinHandle<()>,
}

/// [`IsolateHost`] running every context on its own OS thread.
#[derive(Debug, Clone)]
pub struct ThreadIsolateHost {
    registry: Arc<WorkerRegistry>,
    stack_size: usize,
}

impl ThreadIsolateHost {
    /// Create a host serving the types in `registry`.
    #[must_use]
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            stack_size: DEFAULT_THREAD_STACK_SIZE,
        }
    }

    /// Set the stack size of context threads.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

impl IsolateHost for ThreadIsolateHost {
    type Handle = ThreadIsolate;

    fn spawn(&mut self, worker_type: &str, route: MessageRoute) -> Result<ThreadIsolate, HostError> {
        let factory = self
            .registry
            .factory(worker_type)
            .ok_or_else(|| HostError::UnknownWorkerType(worker_type.to_owned()))?;
        let (inbox, messages) = unbounded::<String>();
        let worker_id = route.worker();

        let thread = thread::Builder::new()
            .name(format!("isolate-{worker_type}-{worker_id}"))
            .stack_size(self.stack_size)
            .spawn(move || {
                debug!(worker_id, "isolate started");
                let mut module = factory();
                for message in &messages {
                    module.on_message(&message, &route);
                }
                debug!(worker_id, "isolate exiting");
            })
            .map_err(|e| HostError::Spawn {
                worker_type: worker_type.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(ThreadIsolate { inbox, thread })
    }

    fn send(&mut self, handle: &ThreadIsolate, message: String) -> Result<(), HostError> {
        handle.inbox.send(message).map_err(|_| HostError::Disconnected)
    }

    fn terminate(&mut self, handle: ThreadIsolate) {
        let ThreadIsolate { inbox, thread } = handle;
        drop(inbox);
        if thread.is_finished() {
            warn!(
                thread = thread.thread().name().unwrap_or("isolate"),
                "isolate thread had already exited"
            );
        }
    }
}
