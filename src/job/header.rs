//! Type-erased part of a job: identity, lifecycle, cancellation and lineage.

use crate::context::Snapshot;
use crate::job::state::{JobId, JobState, Lineage, Priority};
use crate::runtime::Shared;
use crate::utils::lock;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Anything the executor can queue and poll.
///
/// Implemented by [`Job<T>`](crate::job::cell::Job) for every output type so
/// that the run queue, the registry and parent/child links can hold jobs of
/// mixed types.
pub(crate) trait Runnable: Send + Sync + 'static {
    fn header(&self) -> &Header;

    /// Advances the computation until its next suspension point or completion.
    fn run(self: Arc<Self>);

    /// Resolves a job that will never be polled again as `Cancelled`.
    fn abandon(&self);
}

struct Lifecycle {
    state: JobState,
    /// Set when a wake arrives while the job is `Running`.
    woken: bool,
}

pub(crate) struct Header {
    pub(crate) id: JobId,
    pub(crate) name: Option<Arc<str>>,
    pub(crate) priority: Priority,
    pub(crate) lineage: Lineage,
    pub(crate) context: Snapshot,
    pub(crate) shared: Arc<Shared>,
    parent: Option<Weak<dyn Runnable>>,
    cancelled: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    children: Mutex<HashMap<JobId, Arc<dyn Runnable>>>,
}

impl Header {
    pub(crate) fn new(
        id: JobId,
        shared: Arc<Shared>,
        lineage: Lineage,
        parent: Option<&Arc<dyn Runnable>>,
        context: Snapshot,
        priority: Priority,
        name: Option<Arc<str>>,
    ) -> Self {
        Self {
            id,
            name,
            priority,
            lineage,
            context,
            shared,
            parent: parent.map(Arc::downgrade),
            cancelled: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle {
                state: JobState::Created,
                woken: false,
            }),
            children: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn state(&self) -> JobState {
        lock(&self.lifecycle).state
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sets the flag without cascading or waking. Only valid before the job
    /// has children or has been scheduled.
    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// `Runnable -> Running`. Returns `false` if the job is not runnable.
    pub(crate) fn begin_run(&self) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state != JobState::Runnable {
            return false;
        }
        lifecycle.state = JobState::Running;
        lifecycle.woken = false;
        true
    }

    /// `Running -> Suspended`, or straight back to `Runnable` if a wake
    /// arrived during the poll. Returns `true` when the job must be re-queued.
    pub(crate) fn suspend(&self) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.woken {
            lifecycle.woken = false;
            lifecycle.state = JobState::Runnable;
            true
        } else {
            lifecycle.state = JobState::Suspended;
            false
        }
    }

    /// Records the terminal state. Returns `false` if one was already recorded.
    pub(crate) fn terminate(&self, terminal: JobState) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state.is_terminal() {
            return false;
        }
        lifecycle.state = terminal;
        true
    }

    /// Registers a structured child. A child attached to a cancelled or
    /// finished parent starts with its flag already set.
    pub(crate) fn attach_child(&self, child: &Arc<dyn Runnable>) {
        let mut children = lock(&self.children);

        if self.state().is_terminal() {
            child.header().mark_cancelled();
            return;
        }

        children.insert(child.header().id, child.clone());
        if self.is_cancelled() {
            child.header().mark_cancelled();
        }
    }

    /// Releases everything a finished job still refers to: outstanding
    /// structured children are cancelled, the parent forgets this job and the
    /// registry stops resolving its id.
    pub(crate) fn retire(&self) {
        let children = std::mem::take(&mut *lock(&self.children));
        for child in children.values() {
            cancel(child);
        }

        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            lock(&parent.header().children).remove(&self.id);
        }

        self.shared.deregister(self.id);
    }
}

/// Makes a job runnable: `Created | Suspended -> Runnable` and queue it.
///
/// A wake that arrives while the job is being polled is remembered and
/// honoured when the poll returns. Wakes for runnable or finished jobs are
/// ignored.
pub(crate) fn schedule(job: &Arc<dyn Runnable>) {
    let header = job.header();
    {
        let mut lifecycle = lock(&header.lifecycle);
        match lifecycle.state {
            JobState::Created | JobState::Suspended => lifecycle.state = JobState::Runnable,
            JobState::Running => {
                lifecycle.woken = true;
                return;
            }
            JobState::Runnable
            | JobState::Completed
            | JobState::Failed
            | JobState::Cancelled => return,
        }
    }

    tracing::trace!(job = %header.id, "job scheduled");
    header.shared.push(job.clone());
}

/// Sets the cancellation flag of `job` and of every structured descendant
/// before returning. Idempotent; a finished job is left untouched.
///
/// Flags are set bottom-up, so a descendant is never observed uncancelled
/// after its ancestor is. The flagged jobs are then woken so that a
/// cancellation-aware suspension point can observe the flag; none of them
/// stops until its own code does.
pub(crate) fn cancel(job: &Arc<dyn Runnable>) {
    let mut flagged = Vec::new();
    flag_tree(job, &mut flagged);

    for job in &flagged {
        schedule(job);
    }
}

/// Holds each job's `children` lock while flagging its subtree, so no child
/// can attach between the cascade and the job's own flag.
fn flag_tree(job: &Arc<dyn Runnable>, flagged: &mut Vec<Arc<dyn Runnable>>) {
    let header = job.header();
    let children = lock(&header.children);
    if header.is_cancelled() || header.state().is_terminal() {
        return;
    }

    for child in children.values() {
        flag_tree(child, flagged);
    }

    header.cancelled.store(true, Ordering::Release);
    tracing::trace!(job = %header.id, "cancellation requested");
    flagged.push(job.clone());
}
