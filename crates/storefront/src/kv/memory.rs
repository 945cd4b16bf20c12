//! In-process key-value store backed by `moka`.
//!
//! Mirrors the Redis semantics the portal relies on (per-key expiry, `NX`,
//! counters, sets) closely enough for local development and tests. Each
//! entry carries an absolute deadline so read-modify-write commands keep the
//! original expiry, as Redis does.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};

use super::{KvError, KvStore};

/// Upper bound on entries; far above anything a dev catalog produces.
const MAX_ENTRIES: u64 = 100_000;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Stored {
    value: Value,
    expires_at: Option<Instant>,
}

impl Stored {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }
}

struct DeadlineExpiry;

impl Expiry<String, Stored> for DeadlineExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Stored,
        created_at: Instant,
    ) -> Option<Duration> {
        value
            .expires_at
            .map(|at| at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value
            .expires_at
            .map(|at| at.saturating_duration_since(updated_at))
    }
}

/// `moka`-backed [`KvStore`].
#[derive(Clone)]
pub struct MemoryKv {
    cache: Cache<String, Stored>,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(DeadlineExpiry)
            .build();
        Self { cache }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKv")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

fn wrong_type(key: &str) -> KvError {
    KvError::Command(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
    ))
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match self.cache.get(key).await {
            Some(Stored {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        self.cache
            .insert(
                key.to_string(),
                Stored::new(Value::Str(value.to_string()), ttl),
            )
            .await;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let value = value.to_string();
        let entry = self
            .cache
            .entry(key.to_string())
            .or_insert_with(async move { Stored::new(Value::Str(value), Some(ttl)) })
            .await;
        Ok(entry.is_fresh())
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        let expected = expected.to_string();
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(|current| async move {
                match current {
                    Some(entry)
                        if matches!(&entry.value().value, Value::Str(s) if *s == expected) =>
                    {
                        Op::Remove
                    }
                    _ => Op::Nop,
                }
            })
            .await;
        Ok(matches!(result, CompResult::Removed(_)))
    }

    async fn del(&self, keys: &[String]) -> Result<u64, KvError> {
        let mut removed = 0;
        for key in keys {
            if self.cache.remove(key).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sadd(
        &self,
        key: &str,
        members: &[String],
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        let members = members.to_vec();
        let mut type_error = false;
        let type_error_ref = &mut type_error;
        self.cache
            .entry(key.to_string())
            .and_compute_with(|current| async move {
                let (mut set, expires_at) = match current.map(moka::Entry::into_value) {
                    Some(Stored {
                        value: Value::Set(set),
                        expires_at,
                    }) => (set, expires_at),
                    Some(_) => {
                        *type_error_ref = true;
                        return Op::Nop;
                    }
                    None => (BTreeSet::new(), None),
                };
                set.extend(members);
                let expires_at = ttl.map(|ttl| Instant::now() + ttl).or(expires_at);
                Op::Put(Stored {
                    value: Value::Set(set),
                    expires_at,
                })
            })
            .await;

        if type_error {
            return Err(wrong_type(key));
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        match self.cache.get(key).await {
            Some(Stored {
                value: Value::Set(set),
                ..
            }) => Ok(set.into_iter().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, KvError> {
        let mut outcome: Result<i64, KvError> = Ok(0);
        let outcome_ref = &mut outcome;
        let key_owned = key.to_string();
        self.cache
            .entry(key_owned.clone())
            .and_compute_with(|current| async move {
                let (count, expires_at) = match current.map(moka::Entry::into_value) {
                    Some(Stored {
                        value: Value::Str(s),
                        expires_at,
                    }) => match s.parse::<i64>().map(|n| n.checked_add(1)) {
                        Ok(Some(n)) => (n, expires_at),
                        Ok(None) => {
                            *outcome_ref = Err(KvError::Command(
                                "ERR increment or decrement would overflow".to_string(),
                            ));
                            return Op::Nop;
                        }
                        Err(_) => {
                            *outcome_ref = Err(KvError::Command(
                                "ERR value is not an integer or out of range".to_string(),
                            ));
                            return Op::Nop;
                        }
                    },
                    Some(_) => {
                        *outcome_ref = Err(wrong_type(&key_owned));
                        return Op::Nop;
                    }
                    None => (1, Some(Instant::now() + ttl)),
                };
                *outcome_ref = Ok(count);
                Op::Put(Stored {
                    value: Value::Str(count.to_string()),
                    expires_at,
                })
            })
            .await;
        outcome
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let kv = MemoryKv::new();
        kv.set("a", "1", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));

        let removed = kv.del(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(kv.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_expires() {
        let kv = MemoryKv::new();
        kv.set("short", "v", Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(kv.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(kv.get("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_nx_only_once() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("lock", "run-1", Duration::from_secs(60)).await.unwrap());
        assert!(!kv.set_nx("lock", "run-2", Duration::from_secs(60)).await.unwrap());
        assert_eq!(kv.get("lock").await.unwrap().as_deref(), Some("run-1"));
    }

    #[tokio::test]
    async fn test_del_if_eq() {
        let kv = MemoryKv::new();
        kv.set("lock", "run-1", None).await.unwrap();

        assert!(!kv.del_if_eq("lock", "run-2").await.unwrap());
        assert!(kv.get("lock").await.unwrap().is_some());

        assert!(kv.del_if_eq("lock", "run-1").await.unwrap());
        assert!(kv.get("lock").await.unwrap().is_none());

        assert!(!kv.del_if_eq("lock", "run-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_sets() {
        let kv = MemoryKv::new();
        kv.sadd("tag:products", &["k1".to_string(), "k2".to_string()], None)
            .await
            .unwrap();
        kv.sadd("tag:products", &["k2".to_string(), "k3".to_string()], None)
            .await
            .unwrap();

        let members = kv.smembers("tag:products").await.unwrap();
        assert_eq!(members, vec!["k1", "k2", "k3"]);
        assert!(kv.smembers("tag:none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let kv = MemoryKv::new();
        kv.set("plain", "v", None).await.unwrap();
        assert!(kv.smembers("plain").await.is_err());
        assert!(kv.sadd("plain", &["m".to_string()], None).await.is_err());
    }

    #[tokio::test]
    async fn test_incr() {
        let kv = MemoryKv::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(kv.incr("count", ttl).await.unwrap(), 1);
        assert_eq!(kv.incr("count", ttl).await.unwrap(), 2);
        assert_eq!(kv.get("count").await.unwrap().as_deref(), Some("2"));

        kv.set("text", "abc", None).await.unwrap();
        assert!(kv.incr("text", ttl).await.is_err());
    }

    #[tokio::test]
    async fn test_incr_overflow_is_an_error() {
        let kv = MemoryKv::new();
        let ttl = Duration::from_secs(60);
        kv.set("count", &i64::MAX.to_string(), None).await.unwrap();
        let err = kv.incr("count", ttl).await.unwrap_err();
        assert!(err.to_string().contains("would overflow"));
        assert_eq!(kv.get("count").await.unwrap(), Some(i64::MAX.to_string()));
    }
}
