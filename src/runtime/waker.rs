//! Waker implementation for job wake-up notifications.
//!
//! Provides job waker objects that notify the executor when a suspended job
//! is ready to continue. Implements the standard Rust waking protocol using
//! `RawWaker` and `RawWakerVTable`.

use crate::job::{Runnable, schedule};

use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Waker that re-queues a job when awakened.
///
/// The job is held behind a thin `Arc<JobWaker>` so the raw pointer handed
/// to the vtable is a plain data pointer.
pub(crate) struct JobWaker {
    job: Arc<dyn Runnable>,
}

impl JobWaker {
    fn new(job: Arc<dyn Runnable>) -> Arc<Self> {
        Arc::new(Self { job })
    }

    /// Moves the job from `Suspended` back to `Runnable`.
    fn wake(self: &Arc<Self>) {
        schedule(&self.job);
    }

    fn clone_raw(ptr: *const ()) -> RawWaker {
        // SAFETY: `ptr` came from `Arc::into_raw` in `make_waker` or `clone_raw`.
        unsafe {
            Arc::<JobWaker>::increment_strong_count(ptr as *const JobWaker);
        }
        RawWaker::new(ptr, &Self::VTABLE)
    }

    fn wake_raw(ptr: *const ()) {
        // SAFETY: consumes the reference owned by this waker.
        let waker = unsafe { Arc::<JobWaker>::from_raw(ptr as *const JobWaker) };
        waker.wake();
    }

    fn wake_by_ref_raw(ptr: *const ()) {
        // SAFETY: the reference stays owned by the waker; `ManuallyDrop` keeps
        // the count unchanged.
        let waker =
            std::mem::ManuallyDrop::new(unsafe { Arc::<JobWaker>::from_raw(ptr as *const JobWaker) });
        waker.wake();
    }

    fn drop_raw(ptr: *const ()) {
        // SAFETY: releases the reference owned by the waker being dropped.
        unsafe {
            drop(Arc::<JobWaker>::from_raw(ptr as *const JobWaker));
        }
    }

    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        Self::clone_raw,
        Self::wake_raw,
        Self::wake_by_ref_raw,
        Self::drop_raw,
    );
}

/// Creates a `Waker` that re-schedules `job` when woken.
pub(crate) fn make_waker(job: Arc<dyn Runnable>) -> Waker {
    let raw = RawWaker::new(
        Arc::into_raw(JobWaker::new(job)) as *const (),
        &JobWaker::VTABLE,
    );
    // SAFETY: the vtable functions uphold the `RawWaker` contract for an
    // `Arc<JobWaker>` pointer.
    unsafe { Waker::from_raw(raw) }
}
