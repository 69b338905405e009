//! Inherited, immutable key/value context that travels with jobs.
//!
//! A [`Snapshot`] is captured when a job is created and stays attached to the
//! job for its whole life, whichever worker thread resumes it. Bindings are
//! scoped: [`with`] installs a value for the dynamic extent of a future and
//! the previous snapshot is visible again as soon as that future returns,
//! fails or is dropped.
//!
//! # Example
//! ```ignore
//! use jobtree::context::{self, ContextKey};
//!
//! static REQUEST_ID: ContextKey<u64> = ContextKey::new("request_id");
//!
//! context::with(&REQUEST_ID, 7, async {
//!     let child = jobtree::spawn_child(async { Ok(REQUEST_ID.read()) });
//!     assert!(matches!(child.await, jobtree::Outcome::Completed(7)));
//!     Ok::<_, jobtree::Error>(())
//! })
//! .await?;
//! ```

use crate::runtime::current;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Typed key into the job context. Declare keys as `static` items; a key is
/// identified by its address, the name is only used in messages.
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn id(&'static self) -> usize {
        self as *const Self as usize
    }
}

impl<T: Clone + Send + Sync + 'static> ContextKey<T> {
    /// Value bound to this key in the current context.
    ///
    /// # Panics
    /// Panics if the key is not bound. The context never invents defaults.
    pub fn read(&'static self) -> T {
        self.try_read().unwrap_or_else(|| {
            panic!(
                "context key `{}` is not bound in the current job",
                self.name
            )
        })
    }

    /// Like [`read`](Self::read), returning `None` when unbound.
    pub fn try_read(&'static self) -> Option<T> {
        current::context().get(self)
    }

    /// Runs `future` with this key bound to `value`. See [`with`].
    pub fn scope<F: Future>(&'static self, value: T, future: F) -> WithContext<F> {
        with(self, value, future)
    }
}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

/// Runs `future` with `key` bound to `value`.
///
/// Jobs spawned while `future` is being polled capture the new binding at
/// the moment they are spawned, so they still observe it after `future` has
/// returned.
pub fn with<T, F>(key: &'static ContextKey<T>, value: T, future: F) -> WithContext<F>
where
    T: Clone + Send + Sync + 'static,
    F: Future,
{
    WithContext {
        pending: Some(Binding {
            key: key.id(),
            name: key.name,
            value: Arc::new(value),
            next: None,
        }),
        snapshot: None,
        inner: Box::pin(future),
    }
}

/// Shorthand for [`ContextKey::read`].
pub fn read<T: Clone + Send + Sync + 'static>(key: &'static ContextKey<T>) -> T {
    key.read()
}

/// Shorthand for [`ContextKey::try_read`].
pub fn try_read<T: Clone + Send + Sync + 'static>(key: &'static ContextKey<T>) -> Option<T> {
    key.try_read()
}

struct Binding {
    key: usize,
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    next: Option<Arc<Binding>>,
}

/// Immutable set of context bindings.
///
/// A persistent linked list: binding a key allocates one node pointing at
/// the previous snapshot, which is left untouched. Cloning is an `Arc` bump.
#[derive(Clone, Default)]
pub struct Snapshot {
    head: Option<Arc<Binding>>,
}

impl Snapshot {
    pub const fn empty() -> Self {
        Self { head: None }
    }

    /// Snapshot visible to the code running on this thread.
    pub fn current() -> Self {
        current::context()
    }

    /// Looks `key` up, innermost binding first.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &'static ContextKey<T>) -> Option<T> {
        let id = key.id();
        self.bindings()
            .find(|binding| binding.key == id)
            .and_then(|binding| binding.value.downcast_ref::<T>())
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of bindings, shadowed ones included.
    pub fn len(&self) -> usize {
        self.bindings().count()
    }

    fn bind(&self, mut binding: Binding) -> Self {
        binding.next = self.head.clone();
        Self {
            head: Some(Arc::new(binding)),
        }
    }

    fn bindings(&self) -> impl Iterator<Item = &Binding> {
        std::iter::successors(self.head.as_deref(), |binding| binding.next.as_deref())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings().map(|binding| binding.name))
            .finish()
    }
}

/// Future returned by [`with`].
///
/// The binding is layered over whatever context is current when the future
/// is first polled, and is installed around every poll of the inner future.
#[must_use = "futures do nothing unless awaited"]
pub struct WithContext<F> {
    pending: Option<Binding>,
    snapshot: Option<Snapshot>,
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(binding) = this.pending.take() {
            this.snapshot = Some(current::context().bind(binding));
        }
        let snapshot = this.snapshot.clone().unwrap_or_default();

        let inner = this.inner.as_mut();
        current::enter_context(snapshot, || inner.poll(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static NAME: ContextKey<&'static str> = ContextKey::new("name");
    static DEPTH: ContextKey<u32> = ContextKey::new("depth");

    fn binding<T: Send + Sync + 'static>(key: &'static ContextKey<T>, value: T) -> Binding {
        Binding {
            key: key.id(),
            name: key.name,
            value: Arc::new(value),
            next: None,
        }
    }

    #[test]
    fn binding_leaves_previous_snapshot_untouched() {
        let base = Snapshot::empty().bind(binding(&NAME, "outer"));
        let inner = base.bind(binding(&NAME, "inner"));

        assert_eq!(base.get(&NAME), Some("outer"));
        assert_eq!(inner.get(&NAME), Some("inner"));
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn keys_are_distinguished_by_identity() {
        let snapshot = Snapshot::empty().bind(binding(&DEPTH, 3));

        assert_eq!(snapshot.get(&DEPTH), Some(3));
        assert_eq!(snapshot.get(&NAME), None);
    }

    #[test]
    fn with_restores_outer_context_between_polls() {
        let value = futures::executor::block_on(with(&DEPTH, 1, async {
            let inside = DEPTH.read();
            let nested = with(&DEPTH, 2, async { DEPTH.read() }).await;
            (inside, nested, DEPTH.read())
        }));

        assert_eq!(value, (1, 2, 1));
        assert_eq!(DEPTH.try_read(), None);
    }

    #[test]
    #[should_panic(expected = "context key `name` is not bound")]
    fn reading_unbound_key_panics() {
        NAME.read();
    }
}
