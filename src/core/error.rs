//! Error types for job processing.

use thiserror::Error;

/// Failure of a single task. Never reaches the caller: it is logged and the
/// task's result slot stays empty.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// `execute()` reported a failure.
    #[error("task failed: {0}")]
    Failed(String),
    /// `execute()` panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task payload or its result could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(String),
    /// An isolated worker reported the failure over the wire.
    #[error("worker error: {0}")]
    Remote(String),
    /// The isolated-context host could not run the task.
    #[error("host error: {0}")]
    Host(String),
    /// The processor refused the unit of work (shutdown in progress).
    #[error("task rejected: {0}")]
    Rejected(String),
}

impl TaskError {
    /// Convenience constructor for task implementations.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// The message without its category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(m)
            | Self::Panicked(m)
            | Self::Codec(m)
            | Self::Remote(m)
            | Self::Host(m)
            | Self::Rejected(m) => m,
        }
    }
}

/// Serialization collaborator failure.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON encoding or decoding failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload names a worker type the codec cannot decode.
    #[error("unsupported worker type `{0}`")]
    UnsupportedType(String),
}

impl From<CodecError> for TaskError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Isolated-context host failure.
#[derive(Debug, Error)]
pub enum HostError {
    /// No worker module is registered for the requested type.
    #[error("unknown worker type `{0}`")]
    UnknownWorkerType(String),
    /// The context could not be started.
    #[error("failed to spawn `{worker_type}`: {reason}")]
    Spawn {
        /// Worker type being started.
        worker_type: String,
        /// Underlying reason.
        reason: String,
    },
    /// The context no longer accepts messages.
    #[error("worker inbox closed")]
    Disconnected,
}

impl From<HostError> for TaskError {
    fn from(err: HostError) -> Self {
        Self::Host(err.to_string())
    }
}

/// Errors returned by `JobProcessor::process_job` and processor construction.
///
/// A job whose submission returns an error was not admitted and its callback
/// never fires.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor has been shut down.
    #[error("processor has been shut down")]
    Shutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A processor thread could not be started.
    #[error("failed to start processor thread: {0}")]
    Spawn(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
