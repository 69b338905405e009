//! Thread-local runtime state.
//!
//! Worker threads record the executor they belong to for their whole
//! lifetime. While a worker polls a job, the job and its context snapshot are
//! recorded as well, so free functions such as [`spawn_child`](crate::spawn_child)
//! or [`ContextKey::read`](crate::context::ContextKey::read) need no explicit
//! handle. Every `enter_*` function restores the previous value on exit,
//! including when the closure unwinds.

use crate::context::Snapshot;
use crate::job::Runnable;
use crate::runtime::core::Shared;
use crate::time::driver::TimerDriver;

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::LocalKey;

thread_local! {
    /// Executor owning the current worker thread.
    static CURRENT_EXECUTOR: RefCell<Option<Arc<Shared>>> = const { RefCell::new(None) };

    /// Job being polled on this thread.
    static CURRENT_JOB: RefCell<Option<Arc<dyn Runnable>>> = const { RefCell::new(None) };

    /// Context snapshot visible to the code currently running on this thread.
    static CURRENT_CONTEXT: RefCell<Snapshot> = const { RefCell::new(Snapshot::empty()) };
}

struct Reset<T: 'static> {
    key: &'static LocalKey<RefCell<T>>,
    previous: Option<T>,
}

impl<T: 'static> Drop for Reset<T> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = self.key.try_with(|cell| *cell.borrow_mut() = previous);
        }
    }
}

fn enter<T: 'static, R>(key: &'static LocalKey<RefCell<T>>, value: T, f: impl FnOnce() -> R) -> R {
    let previous = key.with(|cell| cell.replace(value));
    let _reset = Reset {
        key,
        previous: Some(previous),
    };

    f()
}

/// Runs `f` as the body of a worker thread belonging to `shared`.
pub(crate) fn enter_executor<R>(shared: Arc<Shared>, f: impl FnOnce() -> R) -> R {
    enter(&CURRENT_EXECUTOR, Some(shared), f)
}

/// Runs `f` with `job` as the current job and its captured snapshot as the
/// current context.
pub(crate) fn enter_job<R>(job: Arc<dyn Runnable>, f: impl FnOnce() -> R) -> R {
    let context = job.header().context.clone();

    enter(&CURRENT_JOB, Some(job), || enter(&CURRENT_CONTEXT, context, f))
}

/// Runs `f` with `snapshot` as the current context.
pub(crate) fn enter_context<R>(snapshot: Snapshot, f: impl FnOnce() -> R) -> R {
    enter(&CURRENT_CONTEXT, snapshot, f)
}

pub(crate) fn executor() -> Option<Arc<Shared>> {
    CURRENT_EXECUTOR.with(|current| current.borrow().clone())
}

pub(crate) fn job() -> Option<Arc<dyn Runnable>> {
    CURRENT_JOB.with(|current| current.borrow().clone())
}

pub(crate) fn context() -> Snapshot {
    CURRENT_CONTEXT.with(|current| current.borrow().clone())
}

pub(crate) fn timer() -> Option<Arc<TimerDriver>> {
    CURRENT_EXECUTOR.with(|current| current.borrow().as_ref().map(|shared| shared.timer.clone()))
}

/// Cancellation flag of the current job; `false` outside of jobs.
pub(crate) fn is_cancelled() -> bool {
    CURRENT_JOB.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|job| job.header().is_cancelled())
    })
}

/// Returns `true` when called on one of `shared`'s worker threads.
pub(crate) fn is_worker_of(shared: &Arc<Shared>) -> bool {
    CURRENT_EXECUTOR.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|mine| Arc::ptr_eq(mine, shared))
    })
}
