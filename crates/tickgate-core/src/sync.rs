use std::sync::{Mutex, MutexGuard};

use log::warn;

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Every guarded value here is a plain record that stays consistent between
/// statements, so a poisoned lock still holds usable state.
pub(crate) fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("{what} lock was poisoned, recovering");
        poisoned.into_inner()
    })
}
