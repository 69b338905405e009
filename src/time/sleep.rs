//! Timed waits backed by the executor's timer driver.

use crate::runtime::current;
use crate::time::driver::{TimerDriver, TimerKey};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Waits until `duration` has elapsed.
///
/// This wait ignores cancellation: a cancelled job sleeping here resumes only
/// when the deadline passes. Use [`jobtree::sleep`](crate::sleep) for the
/// cancellation-aware variant. A duration too large to be represented as a
/// deadline waits forever.
///
/// # Panics
/// The returned future panics when polled outside of an executor.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now().checked_add(duration),
        entry: None,
    }
}

/// Future returned by [`sleep`].
///
/// Registers with the timer driver on its first pending poll, and rearms only
/// if it is later polled with a waker that would wake a different job.
/// Dropping it unfinished removes its timer.
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    /// `None` never elapses.
    deadline: Option<Instant>,
    entry: Option<Entry>,
}

struct Entry {
    timer: Arc<TimerDriver>,
    key: TimerKey,
    waker: Waker,
}

impl Sleep {
    /// Waits until `deadline`.
    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            entry: None,
        }
    }

    /// The instant this sleep elapses, or `None` if it never does.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_elapsed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn register(&mut self, deadline: Instant, waker: &Waker) {
        if let Some(entry) = &mut self.entry {
            if entry.waker.will_wake(waker) {
                return;
            }
            if entry.timer.rearm(entry.key, waker.clone()) {
                entry.waker = waker.clone();
                return;
            }
        }

        let timer =
            current::timer().unwrap_or_else(|| panic!("sleep() called outside of a jobtree executor"));
        // After shutdown nothing will wake this sleep; the job is resolved by
        // the executor's sweep.
        self.entry = timer.register(deadline, waker.clone()).map(|key| Entry {
            timer,
            key,
            waker: waker.clone(),
        });
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(deadline) = self.deadline else {
            return Poll::Pending;
        };
        if Instant::now() >= deadline {
            if let Some(entry) = self.entry.take() {
                entry.timer.cancel(entry.key);
            }
            return Poll::Ready(());
        }

        self.register(deadline, cx.waker());
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            entry.timer.cancel(entry.key);
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.entry.is_some())
            .finish()
    }
}
