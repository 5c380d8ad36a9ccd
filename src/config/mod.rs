//! Configuration models for processors and pools.

pub mod processor;

pub use processor::{IsolatePoolConfig, ProcessorConfig, ProcessorKind, ThreadPoolConfig};
