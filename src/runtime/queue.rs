//! Thread-safe run queue shared by all workers of an executor.
//!
//! Holds one FIFO lane per [`Priority`] class. Workers always drain the
//! highest non-empty lane first. Idle workers park on a condition variable;
//! the queue counts them so the executor knows when to grow the pool.

use crate::job::{Priority, Runnable};
use crate::utils::lock;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

pub(crate) struct RunQueue {
    inner: Mutex<Lanes>,
    available: Condvar,
}

struct Lanes {
    lanes: [VecDeque<Arc<dyn Runnable>>; Priority::CLASSES],
    idle: usize,
    shutdown: bool,
}

impl Lanes {
    fn pop(&mut self) -> Option<Arc<dyn Runnable>> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }
}

/// Result of [`RunQueue::push`].
pub(crate) enum Push {
    /// Queued; `idle` tells whether enough parked workers are there to take
    /// every queued job, this one included.
    Queued { idle: bool },
    /// The executor is shutting down; the job was handed back.
    Rejected(Arc<dyn Runnable>),
}

/// Result of [`RunQueue::pop`].
pub(crate) enum Pop {
    Job(Arc<dyn Runnable>),
    /// No work arrived within the idle timeout.
    Idle,
    Shutdown,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Lanes {
                lanes: std::array::from_fn(|_| VecDeque::new()),
                idle: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueues a runnable job at the back of its priority lane and wakes one
    /// parked worker.
    pub(crate) fn push(&self, job: Arc<dyn Runnable>, priority: Priority) -> Push {
        let mut inner = lock(&self.inner);
        if inner.shutdown {
            return Push::Rejected(job);
        }

        inner.lanes[priority.lane()].push_back(job);
        let queued: usize = inner.lanes.iter().map(VecDeque::len).sum();
        let idle = inner.idle >= queued;
        drop(inner);

        self.available.notify_one();
        Push::Queued { idle }
    }

    /// Takes the next job, parking the calling worker while the queue is empty.
    ///
    /// With `idle_timeout` set, returns [`Pop::Idle`] once the worker has
    /// waited that long without work.
    pub(crate) fn pop(&self, idle_timeout: Option<Duration>) -> Pop {
        let mut inner = lock(&self.inner);

        loop {
            if inner.shutdown {
                return Pop::Shutdown;
            }
            if let Some(job) = inner.pop() {
                return Pop::Job(job);
            }

            inner.idle += 1;
            match idle_timeout {
                None => {
                    inner = self
                        .available
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                    inner.idle -= 1;
                }
                Some(timeout) => {
                    let (guard, result) = self
                        .available
                        .wait_timeout(inner, timeout)
                        .unwrap_or_else(PoisonError::into_inner);
                    inner = guard;
                    inner.idle -= 1;

                    if result.timed_out() && inner.is_empty() && !inner.shutdown {
                        return Pop::Idle;
                    }
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).lanes.iter().map(VecDeque::len).sum()
    }

    /// Stops accepting work, wakes every parked worker and returns the jobs
    /// that were still queued.
    pub(crate) fn shutdown(&self) -> Vec<Arc<dyn Runnable>> {
        let mut inner = lock(&self.inner);
        inner.shutdown = true;
        let queued = inner.lanes.iter_mut().flat_map(|lane| lane.drain(..)).collect();
        drop(inner);

        self.available.notify_all();
        queued
    }
}
