//! Processor configuration structures.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Default ceiling on simultaneously live isolated workers.
pub const DEFAULT_MAX_WORKERS: usize = 4;
/// Default keep-alive for thread-pool threads above the core count.
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 60_000;
/// Default stack size for pool threads.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Processor strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// Cooperative single-step scheduler.
    Incremental,
    /// In-process thread pool.
    #[default]
    ThreadPool,
    /// Pool of isolated worker contexts.
    IsolatePool,
}

impl FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incremental" => Ok(Self::Incremental),
            "thread_pool" | "threadpool" | "thread" => Ok(Self::ThreadPool),
            "isolate_pool" | "isolatepool" | "isolate" | "worker" => Ok(Self::IsolatePool),
            other => Err(format!("unknown processor kind `{other}`")),
        }
    }
}

/// Thread-pool processor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Block `process_job` until every task of the job has run.
    pub block_calling_thread: bool,
    /// Core threads kept alive while idle.
    pub min_threads: usize,
    /// Upper bound on live threads.
    pub max_threads: usize,
    /// Idle time after which threads above the core count exit (milliseconds).
    pub keep_alive_ms: u64,
    /// Stack size of each pool thread in bytes.
    pub thread_stack_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            block_calling_thread: false,
            min_threads: cpus,
            max_threads: cpus,
            keep_alive_ms: DEFAULT_KEEP_ALIVE_MS,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
        }
    }
}

impl ThreadPoolConfig {
    /// Configuration with defaults (one thread per CPU, non-blocking).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set blocking mode.
    #[must_use]
    pub const fn with_blocking(mut self, block_calling_thread: bool) -> Self {
        self.block_calling_thread = block_calling_thread;
        self
    }

    /// Use a fixed number of threads (min = max).
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.min_threads = threads;
        self.max_threads = threads;
        self
    }

    /// Set the core and maximum thread counts.
    #[must_use]
    pub const fn with_thread_range(mut self, min_threads: usize, max_threads: usize) -> Self {
        self.min_threads = min_threads;
        self.max_threads = max_threads;
        self
    }

    /// Set the keep-alive for threads above the core count.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Keep-alive as a duration.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Validate thread-pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_threads == 0 {
            return Err("min_threads must be greater than 0".into());
        }
        if self.max_threads < self.min_threads {
            return Err(format!(
                "max_threads ({}) must be at least min_threads ({})",
                self.max_threads, self.min_threads
            ));
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// Isolated worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolatePoolConfig {
    /// Ceiling on active plus idle worker contexts.
    pub max_workers: usize,
    /// Return a worker to the idle cache after it reported an error. When
    /// false the context is terminated instead.
    pub recycle_after_error: bool,
}

impl Default for IsolatePoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            recycle_after_error: true,
        }
    }
}

impl IsolatePoolConfig {
    /// Configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker ceiling.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the recycle-after-error policy.
    #[must_use]
    pub const fn with_recycle_after_error(mut self, recycle: bool) -> Self {
        self.recycle_after_error = recycle;
        self
    }

    /// Validate isolated pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root processor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Strategy to build.
    pub processor: ProcessorKind,
    /// Thread-pool settings.
    pub thread_pool: ThreadPoolConfig,
    /// Isolated pool settings.
    pub isolate_pool: IsolatePoolConfig,
}

impl ProcessorConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid section.
    pub fn validate(&self) -> Result<(), String> {
        self.thread_pool
            .validate()
            .map_err(|e| format!("thread_pool invalid: {e}"))?;
        self.isolate_pool
            .validate()
            .map_err(|e| format!("isolate_pool invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the environment, loading `.env` first if
    /// present. Unset variables keep their defaults.
    ///
    /// Variables: `TASKS_PROCESSOR`, `TASKS_MAX_WORKERS`,
    /// `TASKS_RECYCLE_AFTER_ERROR`, `TASKS_MIN_THREADS`, `TASKS_MAX_THREADS`,
    /// `TASKS_KEEP_ALIVE_MS`, `TASKS_BLOCK_CALLING_THREAD`.
    ///
    /// # Errors
    ///
    /// Fails when a variable is set but cannot be parsed, or when the result
    /// does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Some(kind) = env_var("TASKS_PROCESSOR") {
            cfg.processor = kind
                .parse()
                .map_err(|e| anyhow::anyhow!("TASKS_PROCESSOR: {e}"))?;
        }
        if let Some(v) = parse_env("TASKS_MAX_WORKERS")? {
            cfg.isolate_pool.max_workers = v;
        }
        if let Some(v) = parse_env("TASKS_RECYCLE_AFTER_ERROR")? {
            cfg.isolate_pool.recycle_after_error = v;
        }
        if let Some(v) = parse_env("TASKS_MIN_THREADS")? {
            cfg.thread_pool.min_threads = v;
        }
        if let Some(v) = parse_env("TASKS_MAX_THREADS")? {
            cfg.thread_pool.max_threads = v;
        }
        if let Some(v) = parse_env("TASKS_KEEP_ALIVE_MS")? {
            cfg.thread_pool.keep_alive_ms = v;
        }
        if let Some(v) = parse_env("TASKS_BLOCK_CALLING_THREAD")? {
            cfg.thread_pool.block_calling_thread = v;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<V>(name: &str) -> AppResult<Option<V>>
where
    V: FromStr,
    V::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.trim()
                .parse::<V>()
                .map_err(|e| anyhow::anyhow!("{name}={raw}: {e}"))
        })
        .transpose()
}
