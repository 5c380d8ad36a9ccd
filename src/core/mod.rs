//! Job/task data model and the three job processors.

pub mod error;
pub mod events;
pub mod incremental;
pub mod isolate_pool;
pub mod job;
pub mod task;
pub mod thread_pool;

pub use error::{AppResult, CodecError, HostError, ProcessorError, TaskError};
pub use events::{EventSink, InMemoryEventSink, JobEvent, JobEventKind};
pub use incremental::{CooperativeScheduler, IncrementalScheduler, RepeatingCommand};
pub use isolate_pool::{IsolatePoolStats, IsolatedWorkerPoolProcessor};
pub use job::{Job, JobCallback, JobCompletion, JobId, JobProcessor, JobProgress, JobResults, Resolution};
pub use task::{run_task, short_type_name, PayloadMode, Task, TaskContext};
pub use thread_pool::{PoolStats, ThreadPoolProcessor};
