//! Time utilities: timed waits and deadlines.
//!
//! - [`sleep`] waits for a duration and ignores cancellation
//! - [`timeout`] races a computation against a deadline
//!
//! The cancellation-aware wait lives at the crate root as
//! [`jobtree::sleep`](crate::sleep).
//!
//! # Example
//!
//! ```ignore
//! use jobtree::time;
//! use std::time::Duration;
//!
//! let value = time::timeout(Duration::from_millis(100), async {
//!     time::sleep(Duration::from_millis(10)).await;
//!     Ok("done")
//! })
//! .await?;
//! assert_eq!(value, "done");
//! ```

pub(crate) mod driver;
mod sleep;
mod timeout;

pub use sleep::{Sleep, sleep};
pub use timeout::timeout;
