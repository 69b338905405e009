//! Resolves [`JobId`] tokens back to live jobs.

use crate::job::{JobId, Runnable};
use crate::utils::slab::Slab;

use std::sync::{Arc, Weak};

/// Weak index of every job that has not reached a terminal state.
///
/// The registry never keeps a job alive; a job whose last strong reference
/// disappears without finishing simply stops resolving.
pub(crate) struct Registry {
    slab: Slab<Weak<dyn Runnable>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            slab: Slab::with_capacity(64),
        }
    }

    /// Allocates an id, builds the job with it and records the job.
    pub(crate) fn register<J, B>(&mut self, build: B) -> Arc<J>
    where
        J: Runnable,
        B: FnOnce(JobId) -> Arc<J>,
    {
        let (index, generation) = self.slab.vacant_key();
        let job = build(JobId::new(index, generation));

        let weak: Weak<dyn Runnable> = Arc::downgrade(&job) as Weak<dyn Runnable>;
        self.slab.insert(weak);

        job
    }

    pub(crate) fn resolve(&self, id: JobId) -> Option<Arc<dyn Runnable>> {
        self.slab
            .get(id.index as usize, id.generation)
            .and_then(Weak::upgrade)
    }

    pub(crate) fn remove(&mut self, id: JobId) {
        self.slab.remove(id.index as usize, id.generation);
    }

    pub(crate) fn len(&self) -> usize {
        self.slab.len()
    }

    /// Removes every entry, returning the jobs that are still alive.
    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn Runnable>> {
        self.slab
            .drain()
            .into_iter()
            .filter_map(|weak| weak.upgrade())
            .collect()
    }
}
