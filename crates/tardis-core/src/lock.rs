use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

/// In-process advisory locks keyed by datafile id. At most one holder per id;
/// a second request for a held id waits until the holder's guard is dropped.
#[derive(Default)]
pub struct DatafileLocks {
    held: Mutex<HashSet<u64>>,
    released: Condvar,
}

impl DatafileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_held(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the lock for `id` is ours.
    pub fn acquire(&self, id: u64) -> DatafileLockGuard<'_> {
        let mut held = self.lock_held();
        while held.contains(&id) {
            debug!(datafile_id = id, "waiting for datafile lock");
            held = self.released.wait(held).unwrap_or_else(|e| e.into_inner());
        }
        held.insert(id);
        DatafileLockGuard { locks: self, id }
    }

    /// Take the lock for `id` only if nobody holds it.
    pub fn try_acquire(&self, id: u64) -> Option<DatafileLockGuard<'_>> {
        let mut held = self.lock_held();
        held.insert(id).then(|| DatafileLockGuard { locks: self, id })
    }

    /// Wait up to `timeout` for the lock.
    pub fn acquire_timeout(&self, id: u64, timeout: Duration) -> Option<DatafileLockGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut held = self.lock_held();
        while held.contains(&id) {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = self
                .released
                .wait_timeout(held, remaining)
                .unwrap_or_else(|e| e.into_inner());
            held = guard;
        }
        held.insert(id);
        Some(DatafileLockGuard { locks: self, id })
    }

    pub fn is_held(&self, id: u64) -> bool {
        self.lock_held().contains(&id)
    }
}

/// Releases the datafile lock on drop.
pub struct DatafileLockGuard<'a> {
    locks: &'a DatafileLocks,
    id: u64,
}

impl DatafileLockGuard<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for DatafileLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.lock_held().remove(&self.id);
        self.locks.released.notify_all();
    }
}
