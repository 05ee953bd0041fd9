//! Per-key async locks
//!
//! Keyed by registry key when `registry.serialize_writes` is on, so that two
//! registrations of the same key cannot interleave their pin and index
//! steps. Always keyed by content id between a registration's intent and
//! its descriptor, so a reconciliation sweep never acts on in-flight content.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).await.lock_owned().await
    }

    /// Take `key` only if nobody holds it
    pub async fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(key).await.try_lock_owned().ok()
    }

    async fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Drop locks nobody holds or waits on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.acquire("plugin:p:1.0").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("plugin:p:1.0").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire("plugin:a:1").await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("plugin:b:1"))
            .await
            .unwrap();
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn try_acquire_skips_held_keys() {
        let locks = KeyLocks::new();
        let held = locks.acquire("bafyheld").await;
        assert!(locks.try_acquire("bafyheld").await.is_none());
        assert!(locks.try_acquire("bafyfree").await.is_some());

        drop(held);
        assert!(locks.try_acquire("bafyheld").await.is_some());
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = KeyLocks::new();
        drop(locks.acquire("plugin:a:1").await);
        let _b = locks.acquire("plugin:b:1").await;
        assert_eq!(locks.len().await, 1);
    }
}
