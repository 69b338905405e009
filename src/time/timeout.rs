//! Deadline for a computation, modelled as a timer racing a structured child.

use crate::error::Error;
use crate::job::{self, Outcome};
use crate::time::sleep;

use futures::future::{Either, select};
use std::future::Future;
use std::time::Duration;

/// Runs `future` as a structured child of the current job and cancels it if
/// it has not finished after `duration`.
///
/// Returns the child's own result when it finishes first, and
/// [`Error::TimedOut`] when the timer wins and the child then stops on
/// cancellation. A child that ignores cancellation is still awaited to its
/// natural end, and its result is returned as is.
///
/// # Panics
/// Panics when called outside of a job.
///
/// # Example
/// ```ignore
/// use jobtree::{Error, time};
/// use std::time::Duration;
///
/// let result = time::timeout(Duration::from_millis(10), async {
///     jobtree::sleep(Duration::from_secs(5)).await?;
///     Ok("late")
/// })
/// .await;
/// assert!(matches!(result, Err(Error::TimedOut(_))));
/// ```
pub async fn timeout<T, F>(duration: Duration, future: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: Future<Output = Result<T, Error>> + Send + 'static,
{
    let child = job::spawn_child(future);

    match select(child, sleep(duration)).await {
        Either::Left((outcome, _)) => outcome.into_result(),
        Either::Right(((), child)) => {
            tracing::trace!(job = %child.id(), ?duration, "timeout elapsed; cancelling");
            child.cancel();

            match child.await {
                Outcome::Cancelled => Err(Error::TimedOut(duration)),
                outcome => outcome.into_result(),
            }
        }
    }
}
