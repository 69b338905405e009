//! Cooperative cancellation as seen from inside a job.
//!
//! Cancellation never interrupts a job. The flag is observed where the job's
//! code asks for it: [`check_cancelled`], [`is_cancelled`], and the
//! cancellation-aware suspension points [`sleep`], [`cancellable`] and
//! [`Completion`](crate::io::Completion). Blocking calls and the plain
//! [`time::sleep`](crate::time::sleep) run to their natural end regardless.

use crate::error::Error;
use crate::job::state::JobId;
use crate::runtime::current;
use crate::time::Sleep;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Identity of the job running on this thread, if any.
pub fn current_id() -> Option<JobId> {
    current::job().map(|job| job.header().id)
}

/// Whether the current job's cancellation flag is set. `false` outside jobs.
pub fn is_cancelled() -> bool {
    current::is_cancelled()
}

/// Returns `Err(Error::Cancelled)` once the current job has been cancelled,
/// so a computation can bail out with `?`.
///
/// # Example
/// ```ignore
/// for chunk in chunks {
///     jobtree::check_cancelled()?;
///     process(chunk);
/// }
/// ```
pub fn check_cancelled() -> Result<(), Error> {
    if current::is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Cancellation-aware timed wait.
///
/// Resolves to `Ok(())` after `duration`, or to `Err(Error::Cancelled)` as
/// soon as the job is cancelled, whichever comes first.
pub fn sleep(duration: Duration) -> CancellableSleep {
    CancellableSleep {
        sleep: crate::time::sleep(duration),
    }
}

/// Future returned by [`sleep`].
#[must_use = "futures do nothing unless awaited"]
pub struct CancellableSleep {
    sleep: Sleep,
}

impl Future for CancellableSleep {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if current::is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        Pin::new(&mut self.sleep).poll(cx).map(Ok)
    }
}

/// Makes any suspension point cancellation-aware.
///
/// The wrapped future is dropped unfinished when the job is cancelled while
/// it is pending.
pub fn cancellable<F: Future>(future: F) -> Cancellable<F> {
    Cancellable {
        inner: Box::pin(future),
    }
}

/// Future returned by [`cancellable`].
#[must_use = "futures do nothing unless awaited"]
pub struct Cancellable<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for Cancellable<F> {
    type Output = Result<F::Output, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if current::is_cancelled() {
            return Poll::Ready(Err(Error::Cancelled));
        }

        self.inner.as_mut().poll(cx).map(Ok)
    }
}
