//! Read-through cache over the key-value store.
//!
//! Values are stored as JSON with a TTL and registered under zero or more
//! tags. A webhook or a sync run invalidates by tag, which removes every
//! key written under it. The store is never a hard dependency for reads:
//! when it fails the caller gets a live fetch and a warning in the logs.

pub mod keys;

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::kv::{self, KvError, SharedKv};

/// Lifetime of a tag set; refreshed on every write so it outlives its members.
const TAG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("key-value store error: {0}")]
    Kv(#[from] KvError),
}

/// Tag-aware JSON cache.
#[derive(Clone)]
pub struct CacheLayer {
    kv: SharedKv,
}

impl CacheLayer {
    #[must_use]
    pub fn new(kv: SharedKv) -> Self {
        Self { kv }
    }

    /// The underlying store.
    #[must_use]
    pub fn kv(&self) -> &SharedKv {
        &self.kv
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result.
    ///
    /// Store failures and undecodable entries are logged and treated as a
    /// miss. Errors from `fetch` are returned unchanged and nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns whatever `fetch` returns.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[String],
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            debug!(key, "Cache hit");
            return Ok(value);
        }

        debug!(key, "Cache miss");
        let value = fetch().await?;

        if let Err(e) = self.store(key, &value, ttl, tags).await {
            warn!(key, error = %e, "Failed to write cache entry");
        }

        Ok(value)
    }

    /// Read a cached value, treating every failure as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match kv::get_json::<T>(self.kv.as_ref(), key).await {
            Ok(value) => value,
            Err(KvError::Serialization(e)) => {
                // Shape changed between releases; drop the stale entry
                warn!(key, error = %e, "Discarding undecodable cache entry");
                if let Err(e) = self.kv.del(&[key.to_string()]).await {
                    warn!(key, error = %e, "Failed to discard cache entry");
                }
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, fetching live");
                None
            }
        }
    }

    /// Write a value and register it under `tags`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Kv` if the store rejects a write.
    pub async fn store<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        tags: &[String],
    ) -> Result<(), CacheError> {
        kv::set_json(self.kv.as_ref(), key, value, Some(ttl)).await?;

        let member = [key.to_string()];
        for tag in tags {
            self.kv
                .sadd(&keys::tag_set(tag), &member, Some(TAG_TTL))
                .await?;
        }
        Ok(())
    }

    /// Delete every key registered under any of `tags`, and the tag sets.
    ///
    /// Returns the number of cache entries removed.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Kv` if a read or delete fails.
    #[instrument(skip(self), fields(tags = ?tags))]
    pub async fn invalidate_tags(&self, tags: &[String]) -> Result<u64, CacheError> {
        if tags.is_empty() {
            return Ok(0);
        }

        let mut members = Vec::new();
        let mut tag_keys = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag_key = keys::tag_set(tag);
            members.extend(self.kv.smembers(&tag_key).await?);
            tag_keys.push(tag_key);
        }
        members.sort_unstable();
        members.dedup();

        let removed = self.kv.del(&members).await?;
        self.kv.del(&tag_keys).await?;

        tracing::info!(removed, "Invalidated cache tags");
        Ok(removed)
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer").finish_non_exhaustive()
    }
}
