//! Builders to construct processors from configuration.

pub mod processor_builder;

pub use processor_builder::{build_incremental, build_isolate_pool, build_processor, build_thread_pool, ProcessorParts};
