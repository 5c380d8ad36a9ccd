//! Tests for error types

use prometheus_tasks::core::{CodecError, HostError, ProcessorError, TaskError};

#[test]
fn test_task_error_display() {
    let err = TaskError::failed("nope");
    assert_eq!(format!("{err}"), "task failed: nope");
    assert_eq!(err.message(), "nope");
}

#[test]
fn test_remote_error_keeps_worker_message() {
    let err = TaskError::Remote("boom".to_string());
    assert_eq!(format!("{err}"), "worker error: boom");
    assert_eq!(err.message(), "boom");
}

#[test]
fn test_host_error_converts_to_task_error() {
    let err: TaskError = HostError::UnknownWorkerType("Ghost".to_string()).into();
    assert_eq!(err, TaskError::Host("unknown worker type `Ghost`".to_string()));
}

#[test]
fn test_codec_error_converts_to_task_error() {
    let json = serde_json::from_str::<u32>("x").unwrap_err();
    let err: TaskError = CodecError::from(json).into();
    assert!(matches!(err, TaskError::Codec(ref m) if m.starts_with("json: ")));
}

#[test]
fn test_processor_error_display() {
    assert_eq!(format!("{}", ProcessorError::Shutdown), "processor has been shut down");
    assert_eq!(
        format!("{}", ProcessorError::InvalidConfig("max_workers must be greater than 0".to_string())),
        "invalid configuration: max_workers must be greater than 0"
    );
}
