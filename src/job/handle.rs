//! Join handles: awaiting, inspecting and cancelling a spawned job.

use crate::job::cell::Job;
use crate::job::header::{self, Runnable};
use crate::job::outcome::Outcome;
use crate::job::state::{JobId, JobState, Lineage};
use crate::utils::lock;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A future that resolves to a job's [`Outcome`] once the job terminates.
///
/// Awaiting suspends the caller without occupying a worker. Dropping the
/// handle does not cancel the job.
///
/// # Example
/// ```ignore
/// let handle = jobtree::spawn_child(async { Ok(42) });
/// assert!(matches!(handle.await, jobtree::Outcome::Completed(42)));
/// ```
pub struct JoinHandle<T> {
    pub(crate) job: Arc<Job<T>>,
}

impl<T: Send + 'static> JoinHandle<T> {
    /// Identity token of the job.
    pub fn id(&self) -> JobId {
        self.job.header().id
    }

    /// Requests cancellation of the job and its structured descendants.
    ///
    /// Returns immediately; the job stops only where its code observes the
    /// flag. Idempotent.
    pub fn cancel(&self) {
        header::cancel(&self.runnable());
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.job.header().state()
    }

    /// `true` once the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the job's cancellation flag is set.
    pub fn is_cancelled(&self) -> bool {
        self.job.header().is_cancelled()
    }

    /// Name given through [`Builder::name`](crate::job::Builder::name).
    pub fn name(&self) -> Option<&str> {
        self.job.header().name.as_deref()
    }

    pub fn lineage(&self) -> Lineage {
        self.job.header().lineage
    }

    pub(crate) fn runnable(&self) -> Arc<dyn Runnable> {
        self.job.clone()
    }

    /// Takes the outcome if the job is already terminal.
    pub(crate) fn try_take(&self) -> Option<Outcome<T>> {
        let mut slot = lock(&self.job.slot);
        let outcome = slot.outcome.take();
        if outcome.is_some() {
            slot.taken = true;
        }
        outcome
    }
}

impl<T: Send + 'static> Future for JoinHandle<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.job.slot);

        if let Some(outcome) = slot.outcome.take() {
            slot.taken = true;
            return Poll::Ready(outcome);
        }
        if slot.taken {
            panic!("JoinHandle polled after the job's outcome was taken");
        }

        if !slot.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            slot.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T: Send + 'static> std::fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
