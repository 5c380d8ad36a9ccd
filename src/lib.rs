//! # Prometheus Tasks
//!
//! Batched task execution behind one completion contract.
//!
//! A [`crate::core::Job`] is an ordered list of tasks plus a single callback. Any
//! [`crate::core::JobProcessor`] runs every task and invokes the callback exactly
//! once, with results index-aligned to the tasks. A failed task leaves `None`
//! in its slot; failures never surface as errors to the caller.
//!
//! ## Processors
//!
//! - **`IncrementalScheduler`**: one task per cooperative tick on a
//!   single-threaded stepping loop ([`crate::runtime::StepLoop`] or, with the
//!   `tokio-runtime` feature, `runtime::TokioStepper`)
//! - **`ThreadPoolProcessor`**: tasks run in parallel on a lazily grown pool
//!   of OS threads, with an optional blocking submission mode
//! - **`IsolatedWorkerPoolProcessor`**: each task runs inside an isolated
//!   context reached only through text messages. Contexts are recycled by
//!   worker type, evicted under pressure and capped at `max_workers`
//!
//! ## Isolated worker pool
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_tasks::config::IsolatePoolConfig;
//! use prometheus_tasks::core::{Job, JobProcessor, IsolatedWorkerPoolProcessor};
//! use prometheus_tasks::core::isolate_pool::JsonCodec;
//! use prometheus_tasks::runtime::{ThreadIsolateHost, WorkerRegistry};
//!
//! let mut registry = WorkerRegistry::new();
//! registry.register_task::<HelloWorldTask>("HelloWorldTask");
//!
//! let pool = IsolatedWorkerPoolProcessor::new(
//!     IsolatePoolConfig::default(),
//!     ThreadIsolateHost::new(registry),
//!     Arc::new(JsonCodec::<HelloWorldTask>::new()),
//! )?;
//!
//! pool.process_job(Job::new(tasks, |results| {
//!     // results[i] is Some(output) or None if task i failed
//! }))?;
//! ```
//!
//! Workers answer with `TC::<payload>` (completed), `TERR::<message>` (failed)
//! or `TLOG::<message>` (log passthrough); see [`crate::core::isolate_pool::protocol`].
//!
//! For complete examples, see:
//! - `tests/isolate_pool_test.rs` - Isolated pool scenarios end to end
//! - `tests/thread_pool_test.rs` - Blocking and non-blocking thread pool

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Job/task data model and the three job processors.
pub mod core;
/// Configuration models for processors and pools.
pub mod config;
/// Builders to construct processors from configuration.
pub mod builders;
/// Runtime adapters: tick sources and the thread-backed isolate host.
pub mod runtime;
/// Shared utilities.
pub mod util;
