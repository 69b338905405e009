//! Error types used by the jobtree runtime and by job computations.
//!
//! - [`Error`] is what a job computation returns on the failure path and what
//!   [`Outcome::Failed`](crate::Outcome::Failed) carries.
//! - [`BuildError`] is returned when an executor cannot be configured or started.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error accepted by [`Error::failed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by job computations and runtime suspension points.
///
/// `Error` is cheap to clone so that a fail-fast [`JobGroup`](crate::group::JobGroup)
/// can surface the same failure to its collector and to its scope.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The job observed its cancellation flag.
    ///
    /// Returning this from a computation ends the job as
    /// [`Outcome::Cancelled`](crate::Outcome::Cancelled) rather than `Failed`.
    #[error("job cancelled")]
    Cancelled,

    /// A [`timeout`](crate::time::timeout) elapsed before the computation finished.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The computation panicked; the payload message is preserved.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// An external completion source was dropped without delivering a result.
    #[error("completion source dropped before delivering a result")]
    Abandoned,

    /// The computation's own logic failed.
    #[error("{0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps any error (or message) as a computation failure.
    ///
    /// # Example
    /// ```
    /// let err = jobtree::Error::failed("disk full");
    /// assert_eq!(err.to_string(), "disk full");
    /// ```
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Error::Failed(Arc::from(error.into()))
    }

    /// Returns `true` for [`Error::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Cancelled => "job_cancelled",
            Error::TimedOut(_) => "job_timed_out",
            Error::Panicked(_) => "job_panicked",
            Error::Abandoned => "completion_abandoned",
            Error::Failed(_) => "job_failed",
        }
    }
}

/// Errors raised while building or starting an [`Executor`](crate::Executor).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BuildError {
    /// At least one core worker thread is required.
    #[error("worker_threads must be greater than 0")]
    NoWorkers,

    /// The elastic ceiling cannot be lower than the core pool.
    #[error("max_worker_threads ({max}) is below worker_threads ({core})")]
    CeilingBelowCore { core: usize, max: usize },

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    /// The OS refused to start a worker or timer thread.
    #[error("failed to spawn runtime thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
