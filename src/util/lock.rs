//! Lock access that survives poisoning.
//!
//! Snapshot stores, template registries and render slots only hold plain
//! data behind their locks, so a panicked holder leaves nothing half-built
//! that later readers could trip over. The guard is recovered and the event
//! logged with the caller's module and operation.

use std::sync::{LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(result: LockResult<G>, source: &'static str, op: &'static str, kind: &str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            source,
            op,
            lock_kind = kind,
            "lock poisoned by a panicked holder, continuing with its data"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), source, op, "rwlock.read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), source, op, "rwlock.write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), source, op, "mutex")
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_mutex_is_recovered() {
        let lock = Mutex::new(1_u32);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("lock should be acquired");
            panic!("poison lock");
        }));

        assert!(lock.is_poisoned());
        *mutex_lock(&lock, "util::lock::tests", "write") += 1;
        assert_eq!(*mutex_lock(&lock, "util::lock::tests", "read"), 2);
    }

    #[test]
    fn poisoned_rwlock_is_recovered() {
        let lock = RwLock::new(vec![1]);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("lock should be acquired");
            panic!("poison lock");
        }));

        rw_write(&lock, "util::lock::tests", "write").push(2);
        assert_eq!(*rw_read(&lock, "util::lock::tests", "read"), vec![1, 2]);
    }
}
