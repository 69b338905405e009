//! The executor: a bounded, elastic pool of worker threads multiplexing jobs.
//!
//! The executor is constructed explicitly at the composition root and shut
//! down when dropped. Jobs never own a thread: a suspended job costs only its
//! heap allocation, so a handful of workers can service many thousands of
//! concurrent jobs.

use crate::builder::{Builder, Config};
use crate::error::BuildError;
use crate::job::{self, JobId, JobState, JoinHandle, Outcome, Runnable};
use crate::runtime::current;
use crate::runtime::queue::{Push, RunQueue};
use crate::runtime::registry::Registry;
use crate::runtime::worker::Worker;
use crate::time::driver::TimerDriver;
use crate::utils::lock;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// State shared by the executor, its workers, its timer and every job.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) queue: RunQueue,
    pub(crate) timer: Arc<TimerDriver>,
    registry: Mutex<Registry>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    live_workers: AtomicUsize,
    next_worker: AtomicUsize,
    shutdown: AtomicBool,
}

impl Shared {
    fn new(config: Config, timer: Arc<TimerDriver>) -> Self {
        Self {
            config,
            queue: RunQueue::new(),
            timer,
            registry: Mutex::new(Registry::new()),
            threads: Mutex::new(Vec::new()),
            live_workers: AtomicUsize::new(0),
            next_worker: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Queues a runnable job, growing the pool when no worker is idle.
    pub(crate) fn push(self: &Arc<Self>, job: Arc<dyn Runnable>) {
        let priority = job.header().priority;

        match self.queue.push(job, priority) {
            Push::Queued { idle: true } => {}
            Push::Queued { idle: false } => self.grow(),
            Push::Rejected(job) => {
                tracing::trace!(job = %job.header().id, "executor shut down; job not queued");
            }
        }
    }

    /// Adds one extra worker if the ceiling allows it.
    fn grow(self: &Arc<Self>) {
        let max = self.config.max_worker_threads;
        let mut live = self.live_workers.load(Ordering::Acquire);

        while live < max {
            match self.live_workers.compare_exchange_weak(
                live,
                live + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if let Err(error) = self.spawn_worker(false) {
                        self.live_workers.fetch_sub(1, Ordering::AcqRel);
                        tracing::warn!(%error, "failed to grow the worker pool");
                    }
                    return;
                }
                Err(actual) => live = actual,
            }
        }
    }

    /// Starts a worker thread. The caller has already counted it as live.
    fn spawn_worker(self: &Arc<Self>, core: bool) -> std::io::Result<()> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let worker = Worker {
            id,
            core,
            shared: self.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("{}-{id}", self.config.thread_name))
            .spawn(move || worker.run())?;

        let mut threads = lock(&self.threads);
        threads.retain(|thread| !thread.is_finished());
        threads.push(handle);

        Ok(())
    }

    /// The last worker to leave a shut down executor sweeps the registry, so
    /// the sweep also happens when the executor was dropped on a worker.
    pub(crate) fn worker_exited(&self) {
        let remaining = self.live_workers.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.is_shutdown() {
            self.sweep();
        }
    }

    pub(crate) fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    pub(crate) fn register<J, B>(&self, build: B) -> Arc<J>
    where
        J: Runnable,
        B: FnOnce(JobId) -> Arc<J>,
    {
        lock(&self.registry).register(build)
    }

    pub(crate) fn deregister(&self, id: JobId) {
        lock(&self.registry).remove(id);
    }

    pub(crate) fn resolve(&self, id: JobId) -> Option<Arc<dyn Runnable>> {
        lock(&self.registry).resolve(id)
    }

    pub(crate) fn live_jobs(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Stops workers and timer, then resolves every unfinished job as
    /// `Cancelled` so that awaiters on other threads do not hang.
    fn shutdown(self: &Arc<Self>) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(live_jobs = self.live_jobs(), "executor shutting down");

        drop(self.queue.shutdown());
        self.timer.shutdown();

        // A worker dropping its own executor cannot join itself, and the job
        // it is polling still holds its future. The last worker to exit runs
        // the sweep instead.
        if current::is_worker_of(self) {
            tracing::debug!("executor dropped on its own worker; sweep deferred");
            return;
        }

        let threads = std::mem::take(&mut *lock(&self.threads));
        for thread in threads {
            let _ = thread.join();
        }

        self.sweep();
    }

    /// Resolves every job still registered as `Cancelled`.
    fn sweep(&self) {
        let unfinished = lock(&self.registry).drain();
        if !unfinished.is_empty() {
            tracing::debug!(jobs = unfinished.len(), "cancelling unfinished jobs");
        }
        for job in unfinished {
            job.abandon();
        }
    }
}

/// Multiplexes jobs onto a bounded pool of worker threads.
///
/// Dropping the executor shuts it down: queued and suspended jobs are
/// resolved as [`Outcome::Cancelled`].
///
/// # Example
/// ```
/// use jobtree::{Executor, Outcome};
///
/// let executor = Executor::builder().worker_threads(2).build().unwrap();
/// let handle = executor.spawn(async { Ok(6 * 7) });
/// let outcome = executor.block_on(handle);
/// assert!(matches!(outcome, Outcome::Completed(42)));
/// ```
pub struct Executor {
    shared: Arc<Shared>,
}

impl Executor {
    /// Returns a [`Builder`] for configuring a new executor.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Builds an executor with the default [`Config`].
    pub fn new() -> Result<Self, BuildError> {
        Builder::new().build()
    }

    pub(crate) fn start(config: Config) -> Result<Self, BuildError> {
        let timer = TimerDriver::start(&config.thread_name)?;
        let shared = Arc::new(Shared::new(config, timer));
        let executor = Self { shared };

        for _ in 0..executor.shared.config.worker_threads {
            executor.shared.live_workers.fetch_add(1, Ordering::AcqRel);
            if let Err(error) = executor.shared.spawn_worker(true) {
                executor.shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                return Err(error.into());
            }
        }

        tracing::debug!(
            worker_threads = executor.shared.config.worker_threads,
            max_worker_threads = executor.shared.config.max_worker_threads,
            "executor started"
        );

        Ok(executor)
    }

    /// Returns a cloneable handle to this executor.
    pub fn handle(&self) -> Handle {
        Handle {
            shared: self.shared.clone(),
        }
    }

    /// Spawns a root job. It captures the calling thread's context snapshot.
    pub fn spawn<T, F>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, crate::Error>> + Send + 'static,
    {
        job::Builder::new().spawn_on(&self.handle(), future)
    }

    /// Spawns a root job with an empty context.
    pub fn spawn_detached<T, F>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, crate::Error>> + Send + 'static,
    {
        job::Builder::new().spawn_detached_on(&self.handle(), future)
    }

    /// Runs a computation as a root job and blocks the calling thread until
    /// it reaches a terminal outcome.
    ///
    /// # Panics
    /// Panics when called from inside a job; await the job instead.
    pub fn execute<T, F>(&self, future: F) -> Outcome<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, crate::Error>> + Send + 'static,
    {
        if current::job().is_some() {
            panic!("block_on() called from within a job; await the job instead");
        }

        futures::executor::block_on(self.spawn(future))
    }

    /// Runs `future` as a root job and blocks until it returns its value.
    ///
    /// # Panics
    /// Panics when called from inside a job, or when the root job panics.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match self.execute(async move { Ok(future.await) }) {
            Outcome::Completed(value) => value,
            Outcome::Failed(error) => panic!("root job failed: {error}"),
            Outcome::Cancelled => panic!("root job was cancelled before completing"),
        }
    }

    /// Requests cancellation of the job identified by `id`.
    ///
    /// Returns `false` if the id no longer resolves to a live job.
    pub fn cancel(&self, id: JobId) -> bool {
        self.handle().cancel(id)
    }

    /// Current state of a live job, or `None` once it has finished.
    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.handle().state(id)
    }

    /// Configuration the executor was built with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Number of worker threads currently alive (core plus extra).
    pub fn worker_count(&self) -> usize {
        self.shared.live_workers()
    }

    /// Number of jobs that have not reached a terminal state.
    pub fn live_jobs(&self) -> usize {
        self.shared.live_jobs()
    }

    /// Number of jobs waiting in the run queue.
    pub fn queued_jobs(&self) -> usize {
        self.shared.queue.len()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.shared.config)
            .field("workers", &self.shared.live_workers())
            .field("live_jobs", &self.shared.live_jobs())
            .finish()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// Cheap, cloneable reference to an [`Executor`].
///
/// A handle does not keep the executor running; once the executor is dropped,
/// jobs spawned through the handle resolve as cancelled.
#[derive(Clone)]
pub struct Handle {
    pub(crate) shared: Arc<Shared>,
}

impl Handle {
    /// Handle of the executor owning the current worker thread.
    ///
    /// # Panics
    /// Panics outside of an executor's worker threads.
    pub fn current() -> Self {
        Self::try_current().unwrap_or_else(|| {
            panic!("Handle::current() called outside of a jobtree executor")
        })
    }

    /// Like [`Handle::current`], returning `None` outside of an executor.
    pub fn try_current() -> Option<Self> {
        current::executor().map(|shared| Self { shared })
    }

    /// Spawns a root job on this executor.
    pub fn spawn<T, F>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, crate::Error>> + Send + 'static,
    {
        job::Builder::new().spawn_on(self, future)
    }

    /// Spawns a root job with an empty context.
    pub fn spawn_detached<T, F>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, crate::Error>> + Send + 'static,
    {
        job::Builder::new().spawn_detached_on(self, future)
    }

    /// See [`Executor::cancel`].
    pub fn cancel(&self, id: JobId) -> bool {
        match self.shared.resolve(id) {
            Some(job) => {
                job::cancel(&job);
                true
            }
            None => false,
        }
    }

    /// See [`Executor::state`].
    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.shared.resolve(id).map(|job| job.header().state())
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("workers", &self.shared.live_workers())
            .field("live_jobs", &self.shared.live_jobs())
            .finish()
    }
}
