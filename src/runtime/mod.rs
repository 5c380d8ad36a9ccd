//! Runtime adapters: cooperative tick sources and the thread-backed isolate host.

pub mod step_loop;
pub mod thread_host;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_stepper;

pub use step_loop::StepLoop;
pub use thread_host::{TaskWorker, ThreadIsolate, ThreadIsolateHost, WorkerModule, WorkerRegistry};
#[cfg(feature = "tokio-runtime")]
pub use tokio_stepper::TokioStepper;
