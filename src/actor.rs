//! Isolated actors: exclusive access to private state without exposing locks.
//!
//! An [`Actor`] owns a value and a FIFO mailbox of bodies. Bodies run one at
//! a time against the value, in arrival order, on a detached drain job that
//! exists only while the mailbox is non-empty. Callers await an
//! [`Invocation`], which suspends their job instead of blocking a worker.
//!
//! A body may call back into the same actor, but only by issuing a new
//! invocation: it is queued behind everything already pending. Awaiting that
//! nested invocation from inside the body would wait for itself.
//!
//! # Example
//! ```ignore
//! use jobtree::actor::Actor;
//!
//! let counter = Actor::new(0u64);
//! let value = counter.invoke(|n| {
//!     *n += 1;
//!     *n
//! })
//! .await;
//! ```

use crate::job::Builder;
use crate::runtime::Handle;
use crate::utils::lock;

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

type Envelope<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

fn envelope<S, F>(body: F) -> Envelope<S>
where
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(body)
}

enum Message<S> {
    Run(Envelope<S>),
    /// Hands the state back and stops the actor.
    Stop(oneshot::Sender<S>),
}

struct Mailbox<S> {
    queue: VecDeque<Message<S>>,
    /// `None` while the drain job holds the state.
    state: Option<S>,
    draining: bool,
    closed: bool,
}

struct ActorInner<S> {
    handle: Handle,
    mailbox: Mutex<Mailbox<S>>,
}

/// Serializes access to a value of type `S`.
///
/// Cloning yields another reference to the same actor.
pub struct Actor<S> {
    inner: Arc<ActorInner<S>>,
}

impl<S> Clone for Actor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: Send + 'static> Actor<S> {
    /// Creates an actor whose bodies run on the current executor.
    ///
    /// # Panics
    /// Panics outside of an executor's worker threads.
    pub fn new(state: S) -> Self {
        Self::new_in(&Handle::current(), state)
    }

    /// Creates an actor whose bodies run on `handle`'s executor.
    pub fn new_in(handle: &Handle, state: S) -> Self {
        Self {
            inner: Arc::new(ActorInner {
                handle: handle.clone(),
                mailbox: Mutex::new(Mailbox {
                    queue: VecDeque::new(),
                    state: Some(state),
                    draining: false,
                    closed: false,
                }),
            }),
        }
    }

    /// Queues `body` and returns a future resolving to its result.
    ///
    /// The body is queued immediately, not when the invocation is first
    /// polled, and runs even if the invocation is dropped. If the body
    /// panics, the panic is resumed in the awaiting caller and the actor
    /// keeps serving later invocations.
    ///
    /// # Panics
    /// Panics if the actor has been shut down.
    pub fn invoke<R, F>(&self, body: F) -> Invocation<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Run(envelope(move |state: &mut S| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| body(state)));
            let _ = tx.send(result);
            Box::pin(async {})
        })));

        Invocation { rx }
    }

    /// Like [`invoke`](Self::invoke) for a body that suspends.
    ///
    /// The actor stays reserved for this body across its suspension points,
    /// so no other body observes the state mid-update.
    ///
    /// # Example
    /// ```ignore
    /// let len = log.invoke_async(|lines: &mut Vec<String>| {
    ///     Box::pin(async move {
    ///         jobtree::yield_now().await;
    ///         lines.push("flushed".into());
    ///         lines.len()
    ///     })
    /// })
    /// .await;
    /// ```
    pub fn invoke_async<R, F>(&self, body: F) -> Invocation<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, R> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Run(envelope(move |state: &mut S| {
            Box::pin(async move {
                let result = AssertUnwindSafe(body(state)).catch_unwind().await;
                let _ = tx.send(result);
            })
        })));

        Invocation { rx }
    }

    /// Closes the actor and returns its state once every invocation queued
    /// before this call has run.
    ///
    /// # Panics
    /// Panics if the actor has already been shut down, or if its executor
    /// shut down before the state could be handed back.
    pub async fn shutdown(&self) -> S {
        let (tx, rx) = oneshot::channel();
        self.send(Message::Stop(tx));

        match rx.await {
            Ok(state) => state,
            Err(oneshot::Canceled) => panic!("actor state lost: its executor shut down"),
        }
    }

    /// `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.inner.mailbox).closed
    }

    /// Invocations queued and not yet started.
    pub fn pending(&self) -> usize {
        lock(&self.inner.mailbox).queue.len()
    }

    fn send(&self, message: Message<S>) {
        let start_drain = {
            let mut mailbox = lock(&self.inner.mailbox);
            if mailbox.closed {
                drop(mailbox);
                panic!("invoke on a closed actor");
            }
            if matches!(message, Message::Stop(_)) {
                mailbox.closed = true;
            }
            mailbox.queue.push_back(message);
            !std::mem::replace(&mut mailbox.draining, true)
        };

        if start_drain {
            let inner = self.inner.clone();
            Builder::new()
                .name("actor-drain")
                .spawn_detached_on(&self.inner.handle, drain(inner));
        }
    }
}

/// Runs queued bodies until the mailbox is empty, then puts the state back.
fn drain<S: Send + 'static>(
    inner: Arc<ActorInner<S>>,
) -> impl Future<Output = Result<(), crate::Error>> + Send + 'static {
    // Created outside the async block so that it also fires when the job is
    // dropped before its first poll.
    let mut guard = DrainGuard { inner, armed: true };

    async move {
        let taken = lock(&guard.inner.mailbox).state.take();
        let Some(mut state) = taken else {
            guard.armed = false;
            return Ok(());
        };

        loop {
            let message = {
                let mut mailbox = lock(&guard.inner.mailbox);
                match mailbox.queue.pop_front() {
                    Some(message) => message,
                    None => {
                        mailbox.state = Some(state);
                        mailbox.draining = false;
                        guard.armed = false;
                        return Ok(());
                    }
                }
            };

            match message {
                Message::Run(body) => body(&mut state).await,
                Message::Stop(tx) => {
                    lock(&guard.inner.mailbox).draining = false;
                    guard.armed = false;
                    let _ = tx.send(state);
                    return Ok(());
                }
            }
        }
    }
}

/// Closes the actor if its drain job is dropped unfinished, which happens
/// when the executor shuts down. Queued invocations are dropped so their
/// callers do not wait forever.
struct DrainGuard<S> {
    inner: Arc<ActorInner<S>>,
    armed: bool,
}

impl<S> Drop for DrainGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let queue = {
            let mut mailbox = lock(&self.inner.mailbox);
            mailbox.closed = true;
            mailbox.draining = false;
            std::mem::take(&mut mailbox.queue)
        };
        tracing::warn!(dropped = queue.len(), "actor drain job dropped; actor closed");
        drop(queue);
    }
}

impl<S> fmt::Debug for Actor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mailbox = lock(&self.inner.mailbox);
        f.debug_struct("Actor")
            .field("pending", &mailbox.queue.len())
            .field("draining", &mailbox.draining)
            .field("closed", &mailbox.closed)
            .finish()
    }
}

/// Future returned by [`Actor::invoke`]; resolves to the body's result.
#[must_use = "the body runs regardless; await the invocation to observe its result"]
pub struct Invocation<R> {
    rx: oneshot::Receiver<Result<R, Box<dyn Any + Send>>>,
}

impl<R> Future for Invocation<R> {
    type Output = R;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(value),
            Poll::Ready(Ok(Err(payload))) => panic::resume_unwind(payload),
            Poll::Ready(Err(oneshot::Canceled)) => {
                panic!("actor invocation dropped: its executor shut down")
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> fmt::Debug for Invocation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation").finish_non_exhaustive()
    }
}
