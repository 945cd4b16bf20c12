//! Key-value store used for caching, sessions, locks and one-time codes.
//!
//! # Backends
//!
//! - [`UpstashKv`] - Upstash Redis over its REST API (production)
//! - [`MemoryKv`] - process-local `moka` store (development and tests)
//!
//! Only the handful of Redis commands the portal needs are modelled: plain
//! strings with optional expiry, `SET NX` for locks, counters, and sets for
//! cache tag membership. Values are opaque strings; JSON helpers live in
//! [`get_json`] and [`set_json`].

mod memory;
mod upstash;

pub use memory::MemoryKv;
pub use upstash::UpstashKv;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::config::KvConfig;

/// Errors returned by a key-value backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// HTTP request to the store failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store rejected the command.
    #[error("command error: {0}")]
    Command(String),

    /// The store answered with an unexpected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal Redis-compatible command surface.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// `GET key`.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// `SET key value [EX ttl]`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    /// `SET key value NX EX ttl`; returns true when the key was created.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    /// Delete `key` only while it still holds `expected`; returns true when deleted.
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, KvError>;

    /// `DEL key...`; returns the number of keys removed.
    async fn del(&self, keys: &[String]) -> Result<u64, KvError>;

    /// `SADD key member...` followed by `EXPIRE key ttl` when a ttl is given.
    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), KvError>;

    /// `SMEMBERS key`.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError>;

    /// `INCR key`; the ttl is applied when the counter is created.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError>;

    /// `PING`.
    async fn ping(&self) -> Result<(), KvError>;
}

/// Shared handle to the configured store.
pub type SharedKv = Arc<dyn KvStore>;

/// Build the store selected by configuration.
///
/// # Errors
///
/// Returns `KvError::Http` if the HTTP client for Upstash cannot be built.
pub fn from_config(config: &KvConfig) -> Result<SharedKv, KvError> {
    match config {
        KvConfig::Upstash { url, token } => {
            tracing::info!(url = %url, "Using Upstash key-value store");
            Ok(Arc::new(UpstashKv::new(url, token)?))
        }
        KvConfig::Memory => {
            tracing::warn!("UPSTASH_REDIS_REST_URL not set, using in-memory key-value store");
            Ok(Arc::new(MemoryKv::new()))
        }
    }
}

/// Read and deserialize a JSON value.
///
/// # Errors
///
/// Returns `KvError` if the read fails or the stored value is not valid JSON for `T`.
pub async fn get_json<T: DeserializeOwned>(
    kv: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, KvError> {
    match kv.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
///
/// # Errors
///
/// Returns `KvError` if serialization or the write fails.
pub async fn set_json<T: Serialize + Sync>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), KvError> {
    let raw = serde_json::to_string(value)?;
    kv.set(key, &raw, ttl).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        count: u32,
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let kv = MemoryKv::new();
        set_json(&kv, "snap", &Snapshot { count: 3 }, None)
            .await
            .unwrap();

        let back: Option<Snapshot> = get_json(&kv, "snap").await.unwrap();
        assert_eq!(back, Some(Snapshot { count: 3 }));

        let missing: Option<Snapshot> = get_json(&kv, "nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_json_rejects_garbage() {
        let kv = MemoryKv::new();
        kv.set("snap", "not json", None).await.unwrap();
        let result: Result<Option<Snapshot>, _> = get_json(&kv, "snap").await;
        assert!(matches!(result, Err(KvError::Serialization(_))));
    }
}
