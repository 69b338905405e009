//! Timer thread: the collaborator that turns deadlines into wake-ups.
//!
//! Each executor owns one driver. Sleeping jobs register `(deadline, waker)`
//! once and receive a [`TimerKey`]; the driver thread parks until the
//! earliest deadline, then wakes every expired timer. Wakers are always
//! called with the driver lock released.
//!
//! A timer dropped before its deadline releases its waker at once. Its heap
//! slot is a plain `(deadline, key)` pair that is skipped when it surfaces,
//! and the heap is compacted when such slots outnumber the live timers.

use crate::utils::lock;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::task::Waker;
use std::thread;
use std::time::Instant;

pub(crate) struct TimerDriver {
    state: Mutex<TimerState>,
    changed: Condvar,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

struct TimerState {
    /// Deadlines in firing order; `(deadline, key)` keeps equal deadlines FIFO.
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
    /// Live timers. A key missing here marks a cancelled heap slot.
    wakers: HashMap<u64, Waker>,
    next_key: u64,
    shutdown: bool,
}

impl TimerState {
    /// Drops cancelled slots once they make up most of the heap.
    fn compact(&mut self) {
        if self.queue.len() > 64 && self.queue.len() > 2 * self.wakers.len() {
            let wakers = &self.wakers;
            self.queue.retain(|Reverse((_, key))| wakers.contains_key(key));
        }
    }
}

/// Identifies a registered timer for [`TimerDriver::rearm`] and
/// [`TimerDriver::cancel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TimerKey(u64);

impl TimerDriver {
    /// Starts the driver thread, named `{prefix}-timer`.
    pub(crate) fn start(prefix: &str) -> io::Result<Arc<Self>> {
        let driver = Arc::new(Self {
            state: Mutex::new(TimerState {
                queue: BinaryHeap::new(),
                wakers: HashMap::new(),
                next_key: 0,
                shutdown: false,
            }),
            changed: Condvar::new(),
            thread: Mutex::new(None),
        });

        let runner = driver.clone();
        let handle = thread::Builder::new()
            .name(format!("{prefix}-timer"))
            .spawn(move || runner.run())?;
        *lock(&driver.thread) = Some(handle);

        Ok(driver)
    }

    /// Wakes `waker` once `deadline` has passed.
    ///
    /// Registrations made after shutdown are dropped without waking and
    /// yield `None`.
    pub(crate) fn register(&self, deadline: Instant, waker: Waker) -> Option<TimerKey> {
        let mut state = lock(&self.state);
        if state.shutdown {
            return None;
        }

        let key = state.next_key;
        state.next_key += 1;
        state.queue.push(Reverse((deadline, key)));
        state.wakers.insert(key, waker);
        drop(state);

        self.changed.notify_one();
        Some(TimerKey(key))
    }

    /// Replaces the waker of a pending timer. Returns `false` if the timer
    /// already fired or was cancelled.
    pub(crate) fn rearm(&self, key: TimerKey, waker: Waker) -> bool {
        match lock(&self.state).wakers.get_mut(&key.0) {
            Some(slot) => {
                *slot = waker;
                true
            }
            None => false,
        }
    }

    /// Forgets a pending timer and releases its waker.
    pub(crate) fn cancel(&self, key: TimerKey) {
        let waker = {
            let mut state = lock(&self.state);
            let waker = state.wakers.remove(&key.0);
            state.compact();
            waker
        };
        drop(waker);
    }

    fn run(&self) {
        tracing::debug!("timer driver started");
        let mut state = lock(&self.state);

        loop {
            if state.shutdown {
                break;
            }

            let now = Instant::now();
            let mut expired = Vec::new();
            while let Some(&Reverse((deadline, key))) = state.queue.peek() {
                if deadline > now {
                    break;
                }
                state.queue.pop();
                if let Some(waker) = state.wakers.remove(&key) {
                    expired.push(waker);
                }
            }

            if !expired.is_empty() {
                drop(state);
                for waker in expired {
                    waker.wake();
                }
                state = lock(&self.state);
                continue;
            }

            state = match state.queue.peek().map(|Reverse((deadline, _))| *deadline) {
                Some(deadline) => {
                    self.changed
                        .wait_timeout(state, deadline.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        tracing::debug!("timer driver stopped");
    }

    /// Stops the driver thread and drops every pending timer.
    pub(crate) fn shutdown(&self) {
        let wakers = {
            let mut state = lock(&self.state);
            state.shutdown = true;
            state.queue.clear();
            std::mem::take(&mut state.wakers)
        };
        self.changed.notify_all();
        drop(wakers);

        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
