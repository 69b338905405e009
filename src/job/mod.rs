//! Jobs: the unit of resumable, cancellable work.
//!
//! A job wraps a `Future<Output = Result<T, Error>>`. Workers poll it until
//! it suspends or finishes; its terminal [`Outcome`] is stored once and
//! handed to whoever awaits its [`JoinHandle`].

mod cancel;
pub(crate) mod cell;
mod handle;
mod header;
mod outcome;
mod spawn;
mod state;

pub use cancel::{
    Cancellable, CancellableSleep, cancellable, check_cancelled, current_id, is_cancelled, sleep,
};
pub use handle::JoinHandle;
pub use outcome::Outcome;
pub use spawn::{Builder, spawn, spawn_child, spawn_detached};
pub use state::{JobId, JobState, Lineage, Priority};

pub(crate) use header::{Runnable, cancel, schedule};
pub(crate) use spawn::start;
