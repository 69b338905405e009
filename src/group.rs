//! Job groups: dynamic fan-out/fan-in bound to a scope.
//!
//! A group is opened by [`scope`] inside a job. Members added to it are
//! structured children of that job. When the scope body returns, by any
//! path, the group closes, cancels every member still running and waits for
//! all of them to reach a terminal state. No member outlives the scope.
//!
//! Results surface in completion order, never in submission order.
//!
//! # Example
//! ```ignore
//! use jobtree::group;
//!
//! let total = group::collect_all(|group| async move {
//!     for i in 0..1000u64 {
//!         group.add(async move { Ok(i) });
//!     }
//!     Ok(group.fold(0, |sum, outcome| sum + outcome.completed().unwrap_or(0)).await)
//! })
//! .await?;
//! assert_eq!(total, 1000 * 999 / 2);
//! ```

use crate::error::Error;
use crate::job::cell::Job;
use crate::job::{self, Builder, JobId, JoinHandle, Outcome, Runnable};
use crate::runtime::current;
use crate::utils::lock;

use futures::Stream;
use futures::future::poll_fn;
use futures::task::ArcWake;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};

/// What a member's failure does to the group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first failure cancels every sibling and becomes the group's result.
    FailFast,
    /// Every member's outcome is reported individually.
    CollectAll,
}

/// Opens a job group for the duration of `body`.
///
/// Returns the body's result, unless a fail-fast group recorded a member
/// failure, which then takes precedence.
///
/// # Panics
/// Panics when called outside of a job.
pub async fn scope<T, R, B, Fut>(policy: FailurePolicy, body: B) -> Result<R, Error>
where
    T: Send + 'static,
    B: FnOnce(JobGroup<T>) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    let group = {
        let owner =
            current::job().unwrap_or_else(|| panic!("job group opened outside of a job"));
        JobGroup::new(policy, &owner)
    };
    let mut guard = ExitGuard {
        group: Some(group.clone()),
    };

    let result = body(group.clone()).await;

    group.close_and_cancel();
    poll_fn(|cx| group.poll_barrier(cx)).await;
    guard.group = None;

    tracing::trace!(?policy, "job group scope exited");

    match group.take_failure() {
        Some(failure) => Err(failure),
        None => result,
    }
}

/// [`scope`] with [`FailurePolicy::FailFast`].
pub async fn fail_fast<T, R, B, Fut>(body: B) -> Result<R, Error>
where
    T: Send + 'static,
    B: FnOnce(JobGroup<T>) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    scope(FailurePolicy::FailFast, body).await
}

/// [`scope`] with [`FailurePolicy::CollectAll`].
pub async fn collect_all<T, R, B, Fut>(body: B) -> Result<R, Error>
where
    T: Send + 'static,
    B: FnOnce(JobGroup<T>) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    scope(FailurePolicy::CollectAll, body).await
}

/// Closes the group and cancels its members if the scope future is dropped
/// before reaching its barrier.
struct ExitGuard<T: Send + 'static> {
    group: Option<JobGroup<T>>,
}

impl<T: Send + 'static> Drop for ExitGuard<T> {
    fn drop(&mut self) {
        if let Some(group) = self.group.take() {
            group.close_and_cancel();
        }
    }
}

/// Handle to an open job group. Cloning yields another handle to the same
/// group.
pub struct JobGroup<T> {
    inner: Arc<GroupInner<T>>,
}

impl<T> Clone for JobGroup<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct GroupInner<T> {
    policy: FailurePolicy,
    owner: Weak<dyn Runnable>,
    state: Mutex<GroupState<T>>,
}

struct GroupState<T> {
    open: bool,
    /// Members whose outcome has not been handed out yet.
    members: HashMap<JobId, JoinHandle<T>>,
    /// Finished members, in completion order. Always a subset of `members`.
    ready: VecDeque<JobId>,
    waiters: Vec<Waker>,
    cancelling: bool,
    failure: Option<Error>,
    failure_reported: bool,
}

/// How a freshly created member is started.
enum Start {
    Run,
    /// Runs with its cancellation flag already set.
    Flagged,
    /// Never runs; resolves as `Cancelled` immediately.
    Skip,
}

impl<T: Send + 'static> JobGroup<T> {
    fn new(policy: FailurePolicy, owner: &Arc<dyn Runnable>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                policy,
                owner: Arc::downgrade(owner),
                state: Mutex::new(GroupState {
                    open: true,
                    members: HashMap::new(),
                    ready: VecDeque::new(),
                    waiters: Vec::new(),
                    cancelling: false,
                    failure: None,
                    failure_reported: false,
                }),
            }),
        }
    }

    /// Spawns `future` as a member of the group.
    ///
    /// A member added to a fail-fast group that is already cancelling never
    /// runs and resolves as `Cancelled`. After [`cancel_all`](Self::cancel_all)
    /// on a collect-all group, new members run with their flag already set.
    ///
    /// # Panics
    /// Panics once the group's scope has exited.
    pub fn add<F>(&self, future: F) -> JobId
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let open = lock(&self.inner.state).open;
        let owner = match (open, self.inner.owner.upgrade()) {
            (true, Some(owner)) => owner,
            _ => panic!("add() on a closed job group"),
        };

        let shared = owner.header().shared.clone();
        let handle = Builder::new().child_launch(owner).create(&shared, future);
        let id = handle.id();
        let job = handle.job.clone();

        let start = {
            let mut state = lock(&self.inner.state);
            if !state.open {
                None
            } else {
                let start = match (state.cancelling, self.inner.policy) {
                    (false, _) => Start::Run,
                    (true, FailurePolicy::CollectAll) => Start::Flagged,
                    (true, FailurePolicy::FailFast) => Start::Skip,
                };
                state.members.insert(id, handle);
                Some(start)
            }
        };

        // The scope exited while the member was being created.
        let Some(start) = start else {
            job.header().mark_cancelled();
            job.abandon();
            panic!("add() on a closed job group");
        };

        let notifier = Arc::new(MemberNotifier {
            id,
            group: Arc::downgrade(&self.inner),
        });
        job.on_finish(futures::task::waker(notifier));

        match start {
            Start::Run => job::start(&JoinHandle { job }),
            Start::Flagged => {
                job.header().mark_cancelled();
                job::start(&JoinHandle { job });
            }
            Start::Skip => {
                job.header().mark_cancelled();
                job.abandon();
            }
        }

        id
    }

    /// Waits for the next member to finish and returns its outcome.
    ///
    /// Returns `None` when no member is outstanding. In a fail-fast group the
    /// first failure is returned once and every later call returns `None`.
    pub async fn next(&self) -> Option<Outcome<T>> {
        poll_fn(|cx| self.poll_next_outcome(cx)).await
    }

    /// Waits for every member and returns the completed values.
    ///
    /// Members that ended `Cancelled` contribute nothing. The first failure
    /// observed is returned once all members have been drained.
    pub async fn collect(&self) -> Result<Vec<T>, Error> {
        let mut values = Vec::new();
        let mut failure = None;

        while let Some(outcome) = self.next().await {
            match outcome {
                Outcome::Completed(value) => values.push(value),
                Outcome::Failed(error) => {
                    failure.get_or_insert(error);
                }
                Outcome::Cancelled => {}
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(values),
        }
    }

    /// Waits for every member and returns all outcomes in completion order.
    pub async fn outcomes(&self) -> Vec<Outcome<T>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Reduces member outcomes, in completion order, into a single value.
    pub async fn fold<A, F>(&self, init: A, mut f: F) -> A
    where
        F: FnMut(A, Outcome<T>) -> A,
    {
        let mut acc = init;
        while let Some(outcome) = self.next().await {
            acc = f(acc, outcome);
        }
        acc
    }

    /// Cancels every member and puts the group in its cancelling state.
    pub fn cancel_all(&self) {
        let members = {
            let mut state = lock(&self.inner.state);
            state.cancelling = true;
            state.running()
        };

        for member in members {
            job::cancel(&member);
        }
    }

    /// `true` after [`cancel_all`](Self::cancel_all) or a fail-fast failure.
    pub fn is_cancelling(&self) -> bool {
        lock(&self.inner.state).cancelling
    }

    /// Members whose outcome has not been handed out yet.
    pub fn len(&self) -> usize {
        lock(&self.inner.state).members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poll_next_outcome(&self, cx: &mut Context<'_>) -> Poll<Option<Outcome<T>>> {
        let mut state = lock(&self.inner.state);

        if self.inner.policy == FailurePolicy::FailFast {
            if let Some(failure) = &state.failure {
                if state.failure_reported {
                    return Poll::Ready(None);
                }
                let failure = failure.clone();
                state.failure_reported = true;
                return Poll::Ready(Some(Outcome::Failed(failure)));
            }
        }

        while let Some(id) = state.ready.pop_front() {
            if let Some(outcome) = state.members.remove(&id).and_then(|handle| handle.try_take()) {
                return Poll::Ready(Some(outcome));
            }
        }

        if state.members.is_empty() {
            return Poll::Ready(None);
        }

        state.register(cx.waker());
        Poll::Pending
    }

    /// Ready once every member has finished and reported to the group.
    fn poll_barrier(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = lock(&self.inner.state);
        if state.ready.len() == state.members.len() {
            return Poll::Ready(());
        }

        state.register(cx.waker());
        Poll::Pending
    }

    fn close_and_cancel(&self) {
        let members = {
            let mut state = lock(&self.inner.state);
            state.open = false;
            state.running()
        };

        for member in members {
            job::cancel(&member);
        }
    }

    fn take_failure(&self) -> Option<Error> {
        lock(&self.inner.state).failure.take()
    }
}

impl<T: Send + 'static> GroupState<T> {
    fn running(&self) -> Vec<Arc<dyn Runnable>> {
        self.members
            .values()
            .filter(|handle| !handle.is_finished())
            .map(JoinHandle::runnable)
            .collect()
    }

    fn register(&mut self, waker: &Waker) {
        if !self.waiters.iter().any(|w| w.will_wake(waker)) {
            self.waiters.push(waker.clone());
        }
    }
}

impl<T: Send + 'static> GroupInner<T> {
    /// Records a finished member and wakes the group's waiters. In a fail-fast
    /// group, the first failure cancels every sibling.
    fn member_finished(&self, id: JobId, job: Option<&Job<T>>) {
        let (siblings, waiters) = {
            let mut state = lock(&self.state);
            if !state.members.contains_key(&id) {
                return;
            }
            state.ready.push_back(id);

            let mut siblings = Vec::new();
            if self.policy == FailurePolicy::FailFast && state.failure.is_none() {
                if let Some(error) = job.and_then(Job::failure) {
                    tracing::debug!(job = %id, error = error.as_label(), "group member failed; cancelling siblings");
                    state.failure = Some(error);
                    state.cancelling = true;
                    siblings = state.running();
                }
            }

            (siblings, std::mem::take(&mut state.waiters))
        };

        for sibling in siblings {
            job::cancel(&sibling);
        }
        for waiter in waiters {
            waiter.wake();
        }
    }

    fn member(&self, id: JobId) -> Option<Arc<Job<T>>> {
        lock(&self.state)
            .members
            .get(&id)
            .map(|handle| handle.job.clone())
    }
}

impl<T: Send + 'static> Stream for JobGroup<T> {
    type Item = Outcome<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_next_outcome(cx)
    }
}

impl<T: Send + 'static> std::fmt::Debug for JobGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("JobGroup")
            .field("policy", &self.inner.policy)
            .field("open", &state.open)
            .field("members", &state.members.len())
            .field("cancelling", &state.cancelling)
            .finish()
    }
}

/// Waker registered on each member; reports its completion to the group.
struct MemberNotifier<T> {
    id: JobId,
    group: Weak<GroupInner<T>>,
}

impl<T: Send + 'static> ArcWake for MemberNotifier<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if let Some(group) = arc_self.group.upgrade() {
            let job = group.member(arc_self.id);
            group.member_finished(arc_self.id, job.as_deref());
        }
    }
}
