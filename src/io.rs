//! Suspend/resume contract for external I/O.
//!
//! The runtime does not perform I/O itself. An I/O facility receives a
//! [`Completer`], starts its operation, and calls [`Completer::complete`] or
//! [`Completer::fail`] from whatever thread observes the result. The job
//! awaits the matching [`Completion`] without holding a worker.
//!
//! # Example
//! ```ignore
//! let (completer, completion) = jobtree::io::completion::<Vec<u8>>();
//! std::thread::spawn(move || {
//!     completer.complete(read_blocking());
//! });
//! let bytes = completion.await?;
//! ```

use crate::error::Error;
use crate::runtime::current;

use futures::channel::oneshot;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Creates a linked completer/completion pair.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Completion { rx })
}

/// Sending half, held by the I/O facility.
///
/// Dropping it without delivering a result resolves the completion with
/// [`Error::Abandoned`].
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T, Error>>,
}

impl<T> Completer<T> {
    /// Delivers a value. Returns `false` if the waiting side is gone.
    pub fn complete(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Delivers a failure. Returns `false` if the waiting side is gone.
    pub fn fail(self, error: Error) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// `true` once the [`Completion`] was dropped, e.g. because the waiting
    /// job was cancelled; the facility may stop its work early.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_canceled()
    }
}

/// Receiving half, awaited by a job.
///
/// Cancellation-aware: resolves to `Err(Error::Cancelled)` when the awaiting
/// job is cancelled before a result arrives. A result that is already
/// available wins over cancellation.
#[must_use = "futures do nothing unless awaited"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Abandoned)),
            Poll::Pending if current::is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}
