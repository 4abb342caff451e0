//! Per-key async mutual exclusion.
//!
//! Read-modify-write sequences on one record or one session must serialize,
//! while sequences on different keys must not wait on each other. A
//! [`KeyLocks`] table hands out one mutex per key and forgets it once nobody
//! holds or waits on it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A table of lazily created per-key mutexes.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// The table lock is only held long enough to find the key's mutex; the
    /// wait for the key itself happens outside it.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().await;
            // Only the table holds an idle entry.
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(table.entry(key.to_owned()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of keys currently held or awaited.
    pub async fn active(&self) -> usize {
        self.table
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.acquire("a").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire("a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = KeyLocks::new();
        {
            let _a = locks.acquire("a").await;
            assert_eq!(locks.active().await, 1);
        }
        let _b = locks.acquire("b").await;
        assert_eq!(locks.active().await, 1);
        assert_eq!(locks.table.lock().await.len(), 1);
    }
}
