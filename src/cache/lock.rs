//! Poison-tolerant lock acquisition.
//!
//! A panic while holding one of the cache locks must not take the whole
//! read path down with it; the guarded data is always left in a committed
//! state because no mutation spans an await point.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(op, lock_kind = "rwlock.read", "recovered from poisoned cache lock");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(op, lock_kind = "rwlock.write", "recovered from poisoned cache lock");
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(op, lock_kind = "mutex.lock", "recovered from poisoned cache lock");
        poisoned.into_inner()
    })
}
