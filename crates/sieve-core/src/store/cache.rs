//! In-process cache store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::query::CacheStore;

#[derive(Debug)]
struct Slot {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// Concurrent map with lazy expiry.
///
/// Expired entries are dropped when read or when a prefix delete walks
/// past them; there is no background sweeper.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Slot>,
}

impl MemoryCacheStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entry is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        if let Some(slot) = self.entries.get(key) {
            if slot.expires_at > now {
                return Ok(Some(slot.bytes.clone()));
            }
        }
        self.entries.remove_if(key, |_, slot| slot.expires_at <= now);
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Slot {
                bytes: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|key, slot| {
            if key.starts_with(prefix) {
                // Expired entries go too but are not reported as invalidated.
                if slot.expires_at > now {
                    removed += 1;
                }
                return false;
            }
            true
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryCacheStore::new();
        store
            .set_with_ttl("k", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store.set_with_ttl("sieve:Order:a", vec![1], ttl).await.unwrap();
        store.set_with_ttl("sieve:Order:b", vec![2], ttl).await.unwrap();
        store.set_with_ttl("sieve:Customer:a", vec![3], ttl).await.unwrap();

        assert_eq!(store.delete_prefix("sieve:Order:").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("sieve:Customer:a").await.unwrap().is_some());
    }
}
