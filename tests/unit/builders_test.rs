//! Tests for builders

use std::sync::Arc;

use crossbeam_channel::unbounded;
use prometheus_tasks::builders::{build_processor, build_thread_pool, ProcessorParts};
use prometheus_tasks::config::{ProcessorConfig, ProcessorKind, ThreadPoolConfig};
use prometheus_tasks::core::isolate_pool::JsonCodec;
use prometheus_tasks::core::{Job, JobProcessor, ProcessorError, Task, TaskContext, TaskError};
use prometheus_tasks::runtime::{StepLoop, ThreadIsolateHost, WorkerRegistry};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Double(i32);

impl Task for Double {
    type Output = i32;

    fn execute(&mut self, _ctx: &TaskContext<'_>) -> Result<i32, TaskError> {
        Ok(self.0 * 2)
    }
}

fn parts(steps: &StepLoop) -> ProcessorParts<Double, ThreadIsolateHost, StepLoop> {
    let mut registry = WorkerRegistry::new();
    registry.register_task::<Double>("Double");
    ProcessorParts {
        host: ThreadIsolateHost::new(registry),
        codec: Arc::new(JsonCodec::<Double>::new()),
        scheduler: steps.clone(),
    }
}

fn run(kind: ProcessorKind) -> Vec<Option<i32>> {
    let mut cfg = ProcessorConfig {
        processor: kind,
        ..ProcessorConfig::default()
    };
    cfg.thread_pool = cfg.thread_pool.with_threads(2);
    let steps = StepLoop::new();
    let processor = build_processor(&cfg, parts(&steps)).unwrap();

    let (tx, rx) = unbounded();
    processor
        .process_job(Job::new(vec![Double(1), Double(2), Double(3)], move |results| {
            let _ = tx.send(results);
        }))
        .unwrap();
    steps.run_until_idle();
    rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap()
}

#[test]
fn test_every_processor_kind_honours_the_contract() {
    for kind in [ProcessorKind::Incremental, ProcessorKind::ThreadPool, ProcessorKind::IsolatePool] {
        assert_eq!(run(kind), vec![Some(2), Some(4), Some(6)], "{kind:?}");
    }
}

#[test]
fn test_build_thread_pool_validates() {
    let err = build_thread_pool(&ThreadPoolConfig::new().with_threads(0)).err();
    assert!(matches!(err, Some(ProcessorError::InvalidConfig(_))));
}
