//! Job identity, lifecycle states and scheduling hints.

use std::fmt;

/// Stable, lightweight identity token for a job.
///
/// Callbacks should capture a `JobId` rather than a handle to the job itself;
/// the executor resolves it back to the live job (see
/// [`Executor::cancel`](crate::Executor::cancel)). Ids are slab keys, so an id
/// never resolves to a different job that later reuses the same slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl JobId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}.{}", self.index, self.generation)
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Lifecycle of a job.
///
/// ```text
/// Created -> Runnable -> Running -> Suspended -> Runnable ...
///                               \-> Completed | Failed | Cancelled
/// ```
///
/// Cancellation is a flag next to the state, not a state transition: a
/// flagged job keeps running until its own code observes the flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Allocated but never scheduled.
    Created,
    /// Waiting in the run queue.
    Runnable,
    /// Being polled by a worker.
    Running,
    /// Parked at a suspension point; occupies no worker.
    Suspended,
    /// Finished with a value.
    Completed,
    /// Finished with an error or a panic.
    Failed,
    /// Finished by observing cancellation.
    Cancelled,
}

impl JobState {
    /// Returns `true` for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Ordering hint for the run queue. Higher classes are drained first; order
/// within a class is FIFO. It is a hint, not a guarantee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub(crate) const CLASSES: usize = 3;

    pub(crate) fn lane(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

/// How a job relates to the job that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lineage {
    /// Spawned by the composition root through an [`Executor`](crate::Executor).
    Root,
    /// Structured child: cancelled with its parent, may not outlive it.
    Child,
    /// Default job: inherits context and priority, independent lifetime.
    Inherited,
    /// Detached job: empty context, independent lifetime.
    Detached,
}
