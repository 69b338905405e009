//! Executor internals: worker pool, run queue, wakers and thread-local state.

mod core;
pub(crate) mod current;
pub(crate) mod queue;
pub(crate) mod registry;
pub(crate) mod waker;
mod worker;
pub mod yield_now;

pub(crate) use self::core::Shared;
pub use self::core::{Executor, Handle};
pub(crate) use waker::make_waker;
