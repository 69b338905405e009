use crate::error::Error;
use crate::job::state::JobState;

/// Terminal result of a job.
///
/// Cancellation is a distinct outcome, not a kind of failure.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The computation returned a value.
    Completed(T),
    /// The computation returned an error or panicked.
    Failed(Error),
    /// The computation observed its cancellation flag, or never ran.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Converts to a `Result`, mapping `Cancelled` to [`Error::Cancelled`].
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(error) => Err(error),
            Outcome::Cancelled => Err(Error::Cancelled),
        }
    }

    /// The value, if the job completed.
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// The error, if the job failed.
    pub fn failure(&self) -> Option<&Error> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Applies `f` to a completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Failed(error) => Outcome::Failed(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// The terminal [`JobState`] this outcome corresponds to.
    pub fn state(&self) -> JobState {
        match self {
            Outcome::Completed(_) => JobState::Completed,
            Outcome::Failed(_) => JobState::Failed,
            Outcome::Cancelled => JobState::Cancelled,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::Failed(error) => error.as_label(),
            Outcome::Cancelled => "cancelled",
        }
    }
}

impl<T> From<Result<T, Error>> for Outcome<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Outcome::Completed(value),
            Err(Error::Cancelled) => Outcome::Cancelled,
            Err(error) => Outcome::Failed(error),
        }
    }
}
