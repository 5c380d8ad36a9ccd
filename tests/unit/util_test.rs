//! Tests for utility functions

use prometheus_tasks::core::short_type_name;
use prometheus_tasks::util::{init_tracing, now_ms};

struct HelloWorldTask;

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}

#[test]
fn test_short_type_name() {
    assert_eq!(short_type_name::<HelloWorldTask>(), "HelloWorldTask");
    assert_eq!(short_type_name::<Option<HelloWorldTask>>(), "Option");
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
