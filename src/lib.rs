//! Structured-concurrency runtime.
//!
//! `jobtree` runs many jobs on a small, bounded pool of worker threads and
//! keeps related work organised as a tree:
//!
//! - **Executor**: an explicitly constructed worker pool with a run queue per
//!   priority class and a timer thread
//! - **Job**: a resumable, cancellable computation with parent/child links
//! - **Context**: immutable key/value bindings captured when a job is created
//! - **Job group**: scope-bound fan-out/fan-in with an exit barrier
//! - **Actor**: FIFO-serialized access to private state without locks
//!
//! Cancellation is cooperative. Cancelling a job sets its flag and, before
//! returning, the flags of all its structured descendants. Each job stops
//! only where its own code observes the flag.
//!
//! # Example
//!
//! ```
//! use jobtree::{Executor, Outcome};
//! use std::time::Duration;
//!
//! let executor = Executor::builder().worker_threads(2).build().unwrap();
//!
//! let total = executor.block_on(async {
//!     let slow = jobtree::spawn_child(async {
//!         jobtree::sleep(Duration::from_secs(60)).await?;
//!         Ok(0)
//!     });
//!     let fast = jobtree::spawn_child(async { Ok(42) });
//!
//!     slow.cancel();
//!     assert!(matches!(slow.await, Outcome::Cancelled));
//!     fast.await.completed()
//! });
//!
//! assert_eq!(total, Some(42));
//! ```

pub mod actor;
mod builder;
pub mod context;
mod error;
pub mod group;
pub mod io;
pub mod job;
mod runtime;
pub mod time;
mod utils;

pub use builder::{Builder, Config};
pub use error::{BoxError, BuildError, Error};
pub use job::{
    JobId, JobState, JoinHandle, Outcome, Priority, cancellable, check_cancelled, current_id,
    is_cancelled, sleep, spawn, spawn_child, spawn_detached,
};
pub use runtime::yield_now::{YieldNow, yield_now};
pub use runtime::{Executor, Handle};

#[cfg(feature = "macros")]
pub use jobtree_macros::{main, test};
