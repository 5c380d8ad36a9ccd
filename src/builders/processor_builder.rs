//! Builders to construct job processors from configuration.

use std::sync::Arc;

use tracing::info;

use crate::config::{IsolatePoolConfig, ProcessorConfig, ProcessorKind, ThreadPoolConfig};
use crate::core::isolate_pool::{IsolateHost, TaskCodec};
use crate::core::{
    CooperativeScheduler, IncrementalScheduler, IsolatedWorkerPoolProcessor, JobProcessor, ProcessorError, Task,
    ThreadPoolProcessor,
};

/// Build a thread-pool processor.
///
/// # Errors
///
/// Returns `ProcessorError::InvalidConfig` if the configuration is invalid.
pub fn build_thread_pool(cfg: &ThreadPoolConfig) -> Result<ThreadPoolProcessor, ProcessorError> {
    ThreadPoolProcessor::new(cfg.clone())
}

/// Build an isolated worker pool processor.
///
/// # Errors
///
/// Returns `ProcessorError::InvalidConfig` for an invalid configuration or
/// `ProcessorError::Spawn` when the router thread cannot start.
pub fn build_isolate_pool<T, H>(
    cfg: &IsolatePoolConfig,
    host: H,
    codec: Arc<dyn TaskCodec<T>>,
) -> Result<IsolatedWorkerPoolProcessor<T>, ProcessorError>
where
    T: Task,
    H: IsolateHost,
{
    IsolatedWorkerPoolProcessor::new(cfg.clone(), host, codec)
}

/// Build an incremental processor on a tick source.
#[must_use]
pub const fn build_incremental<S: CooperativeScheduler>(scheduler: S) -> IncrementalScheduler<S> {
    IncrementalScheduler::new(scheduler)
}

/// Collaborators needed by whichever processor the configuration selects.
pub struct ProcessorParts<T: Task, H, S> {
    /// Isolate host, used by `isolate_pool`.
    pub host: H,
    /// Task codec, used by `isolate_pool`.
    pub codec: Arc<dyn TaskCodec<T>>,
    /// Tick source, used by `incremental`.
    pub scheduler: S,
}

/// Build the processor selected by `cfg.processor`.
///
/// # Errors
///
/// Returns `ProcessorError::InvalidConfig` if the configuration is invalid, or
/// any construction error of the selected processor.
pub fn build_processor<T, H, S>(
    cfg: &ProcessorConfig,
    parts: ProcessorParts<T, H, S>,
) -> Result<Box<dyn JobProcessor<T>>, ProcessorError>
where
    T: Task,
    H: IsolateHost,
    S: CooperativeScheduler + 'static,
{
    cfg.validate().map_err(ProcessorError::InvalidConfig)?;
    info!(processor = ?cfg.processor, "building job processor");
    let processor: Box<dyn JobProcessor<T>> = match cfg.processor {
        ProcessorKind::Incremental => Box::new(build_incremental(parts.scheduler)),
        ProcessorKind::ThreadPool => Box::new(build_thread_pool(&cfg.thread_pool)?),
        ProcessorKind::IsolatePool => Box::new(build_isolate_pool(&cfg.isolate_pool, parts.host, parts.codec)?),
    };
    Ok(processor)
}
