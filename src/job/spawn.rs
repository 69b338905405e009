//! Job creation: structured children, default jobs, detached jobs and roots.
//!
//! | Entry point            | Parent link | Context          | Priority   |
//! |------------------------|-------------|------------------|------------|
//! | [`spawn_child`]        | yes         | current snapshot | inherited  |
//! | [`spawn`]              | no          | current snapshot | inherited  |
//! | [`spawn_detached`]     | no          | empty            | `Normal`   |
//! | [`Executor::spawn`]    | no          | calling thread's | `Normal`   |
//!
//! [`Executor::spawn`]: crate::Executor::spawn

use crate::context::Snapshot;
use crate::error::Error;
use crate::job::cell::Job;
use crate::job::handle::JoinHandle;
use crate::job::header::{self, Header, Runnable};
use crate::job::state::{Lineage, Priority};
use crate::runtime::{Handle, Shared, current};

use std::future::Future;
use std::sync::Arc;

/// Everything a new job inherits from the place it is created.
pub(crate) struct Launch {
    pub(crate) lineage: Lineage,
    pub(crate) parent: Option<Arc<dyn Runnable>>,
    pub(crate) context: Snapshot,
    pub(crate) priority: Priority,
    pub(crate) name: Option<Arc<str>>,
}

impl Launch {
    /// Allocates and registers the job, linking it to its parent, without
    /// scheduling it.
    pub(crate) fn create<T, F>(self, shared: &Arc<Shared>, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let Launch {
            lineage,
            parent,
            context,
            priority,
            name,
        } = self;

        let job = shared.register(|id| {
            let header = Header::new(
                id,
                shared.clone(),
                lineage,
                parent.as_ref(),
                context,
                priority,
                name,
            );
            Arc::new(Job::new(header, Box::pin(future)))
        });

        if let Some(parent) = &parent {
            let child: Arc<dyn Runnable> = job.clone();
            parent.header().attach_child(&child);
        }

        tracing::trace!(
            job = %job.header().id,
            name = job.header().name.as_deref(),
            ?lineage,
            ?priority,
            "job created"
        );

        JoinHandle { job }
    }

    pub(crate) fn spawn<T, F>(self, shared: &Arc<Shared>, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let handle = self.create(shared, future);
        start(&handle);
        handle
    }
}

/// Schedules a created job, or resolves it as `Cancelled` if its executor
/// has already shut down.
pub(crate) fn start<T: Send + 'static>(handle: &JoinHandle<T>) {
    let header = handle.job.header();
    if header.shared.is_shutdown() {
        tracing::warn!(job = %header.id, "spawn on a shut down executor; job cancelled");
        handle.job.abandon();
        return;
    }

    header::schedule(&handle.runnable());
}

/// Configures a job before spawning it.
///
/// # Example
/// ```ignore
/// use jobtree::job::Builder;
/// use jobtree::Priority;
///
/// let handle = Builder::new()
///     .name("flush")
///     .priority(Priority::High)
///     .spawn_child(async { Ok(()) });
/// ```
#[derive(Clone, Debug, Default)]
pub struct Builder {
    name: Option<Arc<str>>,
    priority: Option<Priority>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name reported by [`JoinHandle::name`] and in log events.
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the priority the job would otherwise inherit.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Spawns a structured child of the current job.
    ///
    /// # Panics
    /// Panics when called outside of a job.
    pub fn spawn_child<T, F>(self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let parent = current::job().unwrap_or_else(|| panic!("spawn_child() called outside of a job"));
        self.spawn_child_of(parent, future)
    }

    /// Spawns a structured child of `parent` with the current context.
    pub(crate) fn spawn_child_of<T, F>(self, parent: Arc<dyn Runnable>, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let shared = parent.header().shared.clone();
        self.child_launch(parent).spawn(&shared, future)
    }

    pub(crate) fn child_launch(self, parent: Arc<dyn Runnable>) -> Launch {
        Launch {
            lineage: Lineage::Child,
            priority: self.priority.unwrap_or(parent.header().priority),
            context: current::context(),
            parent: Some(parent),
            name: self.name,
        }
    }

    /// Spawns a default job: it inherits the current context and priority but
    /// is not cancelled with the current job.
    ///
    /// # Panics
    /// Panics outside of an executor's worker threads.
    pub fn spawn<T, F>(self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let shared = current::executor()
            .unwrap_or_else(|| panic!("spawn() called outside of a jobtree executor"));
        let inherited = current::job().map(|job| job.header().priority);

        Launch {
            lineage: Lineage::Inherited,
            parent: None,
            context: current::context(),
            priority: self.priority.or(inherited).unwrap_or_default(),
            name: self.name,
        }
        .spawn(&shared, future)
    }

    /// Spawns a detached job: empty context, independent lifetime.
    ///
    /// # Panics
    /// Panics outside of an executor's worker threads.
    pub fn spawn_detached<T, F>(self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let shared = current::executor()
            .unwrap_or_else(|| panic!("spawn_detached() called outside of a jobtree executor"));
        self.detached_launch().spawn(&shared, future)
    }

    /// Spawns a root job on `handle`'s executor.
    pub fn spawn_on<T, F>(self, handle: &Handle, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        Launch {
            lineage: Lineage::Root,
            parent: None,
            context: current::context(),
            priority: self.priority.unwrap_or_default(),
            name: self.name,
        }
        .spawn(&handle.shared, future)
    }

    /// Spawns a detached job on `handle`'s executor.
    pub fn spawn_detached_on<T, F>(self, handle: &Handle, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        self.detached_launch().spawn(&handle.shared, future)
    }

    fn detached_launch(self) -> Launch {
        Launch {
            lineage: Lineage::Detached,
            parent: None,
            context: Snapshot::empty(),
            priority: self.priority.unwrap_or_default(),
            name: self.name,
        }
    }
}

/// Spawns a structured child of the current job.
///
/// The child captures the current context snapshot at this call, is
/// cancelled whenever its parent is, and is cancelled when its parent
/// finishes. Its failure does not fail the parent: the parent reacts only if
/// it awaits the handle.
///
/// # Panics
/// Panics when called outside of a job.
pub fn spawn_child<T, F>(future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, Error>> + Send + 'static,
{
    Builder::new().spawn_child(future)
}

/// Spawns a default job. See [`Builder::spawn`].
pub fn spawn<T, F>(future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, Error>> + Send + 'static,
{
    Builder::new().spawn(future)
}

/// Spawns a detached job. See [`Builder::spawn_detached`].
pub fn spawn_detached<T, F>(future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, Error>> + Send + 'static,
{
    Builder::new().spawn_detached(future)
}
