//! Response cache.
//!
//! Keys are derived from everything that determines a response: entity,
//! sanitized parameters, effective filter, tenant, page window and execution
//! path. Parameter order never matters because every input is an ordered
//! map before hashing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sieve_proto::{ExecutionPath, FilterExpr, PaginationState, QueryResponse, FORMAT_VERSION};

use super::spec::QuerySpec;
use crate::error::{Result, StoreError};

/// Prefix of every cache key.
pub const KEY_PREFIX: &str = "sieve";

/// Byte store with expiry, shared by every request.
///
/// Writes are last-write-wins; the engine takes no locks around them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live entry.
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, StoreError>;

    /// Store an entry that expires after `ttl`.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> std::result::Result<(), StoreError>;

    /// Delete every entry whose key starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> std::result::Result<usize, StoreError>;
}

/// A cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response as first produced.
    pub data: QueryResponse,
    /// Write time.
    pub cached_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub ttl_secs: u64,
}

#[derive(Serialize)]
struct KeyMaterial<'a> {
    version: u32,
    entity: &'a str,
    spec: &'a QuerySpec,
    filter: &'a FilterExpr,
    tenant: Option<&'a str>,
    pagination: &'a PaginationState,
    path: ExecutionPath,
}

/// Inputs that determine a cached response.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyParts<'a> {
    /// Entity listed.
    pub entity: &'a str,
    /// Sanitized parameters.
    pub spec: &'a QuerySpec,
    /// Effective filter.
    pub filter: &'a FilterExpr,
    /// Caller's tenant.
    pub tenant: Option<&'a str>,
    /// Page window.
    pub pagination: &'a PaginationState,
    /// Execution path.
    pub path: ExecutionPath,
}

/// Cache facade over a [`CacheStore`].
///
/// Store failures never fail a request: reads degrade to a miss and writes
/// are skipped, both with a warning.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
}

impl QueryCache {
    /// Wrap a store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Prefix shared by every key of an entity.
    pub fn entity_prefix(entity: &str) -> String {
        format!("{}:{}:", KEY_PREFIX, entity)
    }

    /// Deterministic key for a request.
    pub fn key_for(parts: CacheKeyParts<'_>) -> Result<String> {
        let material = KeyMaterial {
            version: FORMAT_VERSION,
            entity: parts.entity,
            spec: parts.spec,
            filter: parts.filter,
            tenant: parts.tenant,
            pagination: parts.pagination,
            path: parts.path,
        };
        let bytes = serde_json::to_vec(&material)?;
        let digest = blake3::hash(&bytes);
        Ok(format!(
            "{}{}",
            Self::entity_prefix(parts.entity),
            hex::encode(digest.as_bytes())
        ))
    }

    /// Read an entry; `None` on miss, expiry, store failure or bad data.
    pub async fn read(&self, key: &str) -> Option<CacheEntry> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a response. Returns whether the write happened.
    pub async fn write(&self, key: &str, response: &QueryResponse, ttl: Duration) -> bool {
        let entry = CacheEntry {
            data: response.clone(),
            cached_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache entry encoding failed");
                return false;
            }
        };
        match self.store.set_with_ttl(key, bytes, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Drop every cached response for an entity.
    pub async fn invalidate_entity(&self, entity: &str) -> std::result::Result<usize, StoreError> {
        let removed = self.store.delete_prefix(&Self::entity_prefix(entity)).await?;
        tracing::debug!(entity, removed, "cache invalidated");
        Ok(removed)
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache").finish_non_exhaustive()
    }
}
