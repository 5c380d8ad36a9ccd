//! Tests for configuration validation

use std::time::Duration;

use prometheus_tasks::config::{IsolatePoolConfig, ProcessorConfig, ProcessorKind, ThreadPoolConfig};

#[test]
fn test_thread_pool_config_validation() {
    assert!(ThreadPoolConfig::new().with_threads(2).validate().is_ok());
    assert!(ThreadPoolConfig::new().with_threads(0).validate().is_err());
    assert!(ThreadPoolConfig::new().with_thread_range(4, 2).validate().is_err());
}

#[test]
fn test_thread_pool_keep_alive_millis() {
    let cfg = ThreadPoolConfig::new().with_keep_alive(Duration::from_millis(250));
    assert_eq!(cfg.keep_alive_ms, 250);
    assert_eq!(cfg.keep_alive(), Duration::from_millis(250));
}

#[test]
fn test_isolate_pool_config_validation() {
    assert!(IsolatePoolConfig::new().validate().is_ok());
    assert!(IsolatePoolConfig::new().with_max_workers(0).validate().is_err());
}

#[test]
fn test_processor_config_from_json() {
    let json = r#"{
        "processor": "isolate_pool",
        "isolate_pool": { "max_workers": 8, "recycle_after_error": false },
        "thread_pool": { "min_threads": 1, "max_threads": 3, "block_calling_thread": true }
    }"#;
    let cfg = ProcessorConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.processor, ProcessorKind::IsolatePool);
    assert_eq!(cfg.isolate_pool.max_workers, 8);
    assert!(!cfg.isolate_pool.recycle_after_error);
    assert_eq!(cfg.thread_pool.max_threads, 3);
    assert!(cfg.thread_pool.block_calling_thread);
}

#[test]
fn test_processor_config_from_json_invalid() {
    let err = ProcessorConfig::from_json_str(r#"{"isolate_pool": {"max_workers": 0}}"#).unwrap_err();
    assert!(err.contains("isolate_pool invalid"), "{err}");
    assert!(ProcessorConfig::from_json_str("not json").is_err());
}

#[test]
fn test_processor_config_from_env() {
    // Only this test touches TASKS_* variables.
    std::env::set_var("TASKS_PROCESSOR", "incremental");
    std::env::set_var("TASKS_MAX_WORKERS", "6");
    let cfg = ProcessorConfig::from_env().unwrap();
    assert_eq!(cfg.processor, ProcessorKind::Incremental);
    assert_eq!(cfg.isolate_pool.max_workers, 6);

    std::env::set_var("TASKS_MAX_WORKERS", "many");
    assert!(ProcessorConfig::from_env().is_err());
    std::env::remove_var("TASKS_PROCESSOR");
    std::env::remove_var("TASKS_MAX_WORKERS");
}
