//! Fluent builder and configuration for [`Executor`] construction.
//!
//! Configuration comes from three places, later ones overriding earlier ones:
//! the [`Config::default`] values, the `JOBTREE_*` environment variables
//! ([`Config::from_env`]), and explicit [`Builder`] calls.

use crate::error::BuildError;
use crate::runtime::Executor;

use std::time::Duration;

const ENV_WORKER_THREADS: &str = "JOBTREE_WORKER_THREADS";
const ENV_MAX_WORKER_THREADS: &str = "JOBTREE_MAX_WORKER_THREADS";
const ENV_KEEP_ALIVE_MS: &str = "JOBTREE_KEEP_ALIVE_MS";

/// Sizing and naming of an executor's worker pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Core workers; they live as long as the executor.
    pub worker_threads: usize,

    /// Ceiling for elastic growth. Extra workers above `worker_threads` are
    /// spawned when work is queued and every worker is busy.
    pub max_worker_threads: usize,

    /// How long an extra worker may stay idle before it retires.
    pub keep_alive: Duration,

    /// Prefix for worker thread names (`{prefix}-{n}`).
    pub thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        let cores = available_cores();

        Self {
            worker_threads: cores,
            max_worker_threads: cores * 4,
            keep_alive: Duration::from_secs(10),
            thread_name: "jobtree-worker".to_string(),
        }
    }
}

impl Config {
    /// Reads overrides from the process environment.
    ///
    /// Unset variables keep their default; set but unparsable ones are an error.
    pub fn from_env() -> Result<Self, BuildError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Config::from_env`] with a caller-provided variable lookup.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, BuildError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut explicit_max = false;

        if let Some(n) = parse_var(&lookup, ENV_WORKER_THREADS)? {
            config.worker_threads = n;
        }
        if let Some(n) = parse_var(&lookup, ENV_MAX_WORKER_THREADS)? {
            config.max_worker_threads = n;
            explicit_max = true;
        }
        if let Some(ms) = parse_var(&lookup, ENV_KEEP_ALIVE_MS)? {
            config.keep_alive = Duration::from_millis(ms as u64);
        }

        if !explicit_max {
            config.max_worker_threads = config.max_worker_threads.max(config.worker_threads);
        }

        Ok(config)
    }

    /// Checks the invariants the worker pool relies on.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.worker_threads == 0 {
            return Err(BuildError::NoWorkers);
        }
        if self.max_worker_threads < self.worker_threads {
            return Err(BuildError::CeilingBelowCore {
                core: self.worker_threads,
                max: self.max_worker_threads,
            });
        }
        Ok(())
    }
}

fn parse_var<L>(lookup: &L, var: &'static str) -> Result<Option<usize>, BuildError>
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| BuildError::InvalidEnv { var, value }),
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builder for constructing [`Executor`] instances with a fluent API.
///
/// # Example
/// ```
/// let executor = jobtree::Executor::builder()
///     .worker_threads(2)
///     .max_worker_threads(4)
///     .build()
///     .unwrap();
/// assert_eq!(executor.block_on(async { 1 + 1 }), 2);
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    config: Config,
    max_set: bool,
}

impl Builder {
    /// Creates a builder holding the default [`Config`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from [`Config::from_env`] instead of the defaults.
    pub fn from_env() -> Result<Self, BuildError> {
        Ok(Self {
            config: Config::from_env()?,
            max_set: true,
        })
    }

    /// Sets the number of core worker threads.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Sets the elastic growth ceiling. Defaults to four times the core count.
    pub fn max_worker_threads(mut self, n: usize) -> Self {
        self.config.max_worker_threads = n;
        self.max_set = true;
        self
    }

    /// Sets how long an extra worker may idle before retiring.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// Sets the worker thread name prefix.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Returns the configuration the executor would be built with.
    pub fn config(&self) -> Config {
        let mut config = self.config.clone();
        if !self.max_set {
            config.max_worker_threads = config.max_worker_threads.max(config.worker_threads);
        }
        config
    }

    /// Validates the configuration and starts the worker pool and timer thread.
    pub fn build(self) -> Result<Executor, BuildError> {
        let config = self.config();
        config.validate()?;

        Executor::start(config)
    }
}
