//! Worker threads that pull runnable jobs from the run queue.

use crate::runtime::core::Shared;
use crate::runtime::current;
use crate::runtime::queue::Pop;

use std::sync::Arc;

pub(crate) struct Worker {
    pub(crate) id: usize,
    /// Core workers never retire; extra workers leave after `keep_alive` idle.
    pub(crate) core: bool,
    pub(crate) shared: Arc<Shared>,
}

impl Worker {
    pub(crate) fn run(self) {
        let shared = self.shared.clone();
        current::enter_executor(shared, || self.run_loop());
    }

    fn run_loop(&self) {
        tracing::debug!(worker = self.id, core = self.core, "worker started");

        let idle_timeout = (!self.core).then_some(self.shared.config.keep_alive);

        loop {
            match self.shared.queue.pop(idle_timeout) {
                Pop::Job(job) => job.run(),
                Pop::Idle => {
                    tracing::debug!(worker = self.id, "idle worker retiring");
                    break;
                }
                Pop::Shutdown => {
                    tracing::debug!(worker = self.id, "worker stopping");
                    break;
                }
            }
        }

        self.shared.worker_exited();
    }
}
