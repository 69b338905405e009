pub(crate) mod slab;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a runtime mutex.
///
/// Every critical section in the runtime is short and never calls user code,
/// so a poisoned lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
