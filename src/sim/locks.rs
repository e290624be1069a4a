//! Per-run mutual exclusion.
//!
//! Run status and transcripts live in the database, but two concurrent
//! turn requests for the same run would interleave their reads and writes.
//! Each state-changing run operation takes this lock first, so per run
//! there is at most one turn/end/stop in flight at a time.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Registry of one mutex per run.
///
/// Entries are created on first use and never evicted; run volume is
/// operator-scale, so the map stays small.
pub struct RunLocks {
    locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a run, creating it on first use.
    pub async fn acquire(&self, run_id: Uuid) -> OwnedMutexGuard<()> {
        // Fast path: the read guard must drop before awaiting the mutex,
        // or a waiter here would block writers indefinitely.
        let existing = self.locks.read().await.get(&run_id).cloned();
        if let Some(lock) = existing {
            return lock.lock_owned().await;
        }

        let lock = {
            let mut map = self.locks.write().await;
            map.entry(run_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for RunLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_run_is_serialized() {
        let locks = Arc::new(RunLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = locks2.acquire(id).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second acquire should be blocked");

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_runs_do_not_block() {
        let locks = RunLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        // Completes immediately; a shared lock would deadlock here.
        let _b = locks.acquire(Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn lock_is_reusable_after_release() {
        let locks = RunLocks::new();
        let id = Uuid::new_v4();

        drop(locks.acquire(id).await);
        let _again = locks.acquire(id).await;
    }
}
