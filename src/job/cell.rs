//! Typed job cell: the computation, its terminal outcome and its waiters.
//!
//! # How jobs run
//!
//! 1. The computation is boxed into a [`Job`] and registered with the executor
//! 2. The job is queued in its priority lane
//! 3. A worker polls it with a waker bound to the job
//! 4. On `Poll::Pending` the job is parked as `Suspended`
//! 5. When a timer, completion, group or actor wakes it, it is queued again
//! 6. On `Poll::Ready` the outcome is stored exactly once and awaiters are woken

use crate::error::{Error, panic_message};
use crate::job::header::{Header, Runnable};
use crate::job::outcome::Outcome;
use crate::runtime::{current, make_waker};
use crate::utils::lock;

use futures::future::BoxFuture;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

pub(crate) struct Job<T> {
    header: Header,
    future: Mutex<Option<BoxFuture<'static, Result<T, Error>>>>,
    /// Waker handed to every poll; reusing it lets `Waker::will_wake`
    /// recognise repeat registrations. Cleared on finish to break the cycle.
    waker: Mutex<Option<Waker>>,
    pub(crate) slot: Mutex<Slot<T>>,
}

pub(crate) struct Slot<T> {
    pub(crate) outcome: Option<Outcome<T>>,
    /// The outcome was handed to an awaiter.
    pub(crate) taken: bool,
    pub(crate) waiters: Vec<Waker>,
}

impl<T: Send + 'static> Job<T> {
    pub(crate) fn new(header: Header, future: BoxFuture<'static, Result<T, Error>>) -> Self {
        Self {
            header,
            future: Mutex::new(Some(future)),
            waker: Mutex::new(None),
            slot: Mutex::new(Slot {
                outcome: None,
                taken: false,
                waiters: Vec::new(),
            }),
        }
    }

    /// Stores the terminal outcome and wakes every waiter.
    ///
    /// The computation is dropped before awaiters are woken, so anything it
    /// owned has been released by the time an awaiter resumes.
    fn finish(&self, outcome: Outcome<T>) {
        if !self.header.terminate(outcome.state()) {
            return;
        }

        let future = lock(&self.future).take();
        drop(future);
        drop(lock(&self.waker).take());

        let label = outcome.label();
        let waiters = {
            let mut slot = lock(&self.slot);
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.waiters)
        };

        self.header.retire();

        tracing::debug!(
            job = %self.header.id,
            name = self.header.name.as_deref(),
            lineage = ?self.header.lineage,
            outcome = label,
            "job finished"
        );

        for waiter in waiters {
            waiter.wake();
        }
    }

    /// Registers a waker that fires once the job is terminal (immediately if
    /// it already is).
    pub(crate) fn on_finish(&self, waker: Waker) {
        let mut slot = lock(&self.slot);
        if slot.outcome.is_some() || slot.taken {
            drop(slot);
            waker.wake();
        } else {
            slot.waiters.push(waker);
        }
    }

    /// Clone of the failure, if the job ended `Failed`.
    pub(crate) fn failure(&self) -> Option<Error> {
        match &lock(&self.slot).outcome {
            Some(Outcome::Failed(error)) => Some(error.clone()),
            _ => None,
        }
    }
}

impl<T: Send + 'static> Runnable for Job<T> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn run(self: Arc<Self>) {
        if !self.header.begin_run() {
            return;
        }

        let job: Arc<dyn Runnable> = self.clone();
        let waker = lock(&self.waker)
            .get_or_insert_with(|| make_waker(job.clone()))
            .clone();
        let mut cx = Context::from_waker(&waker);

        let polled = current::enter_job(job, || {
            let mut future = lock(&self.future);
            let future = future.as_mut()?;
            Some(panic::catch_unwind(AssertUnwindSafe(|| {
                future.as_mut().poll(&mut cx)
            })))
        });

        match polled {
            None => {}
            Some(Ok(Poll::Pending)) => {
                if self.header.suspend() {
                    self.header.shared.push(self.clone());
                }
            }
            Some(Ok(Poll::Ready(result))) => self.finish(Outcome::from(result)),
            Some(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(job = %self.header.id, %message, "job panicked");
                self.finish(Outcome::Failed(Error::Panicked(message)));
            }
        }
    }

    fn abandon(&self) {
        self.finish(Outcome::Cancelled);
    }
}
