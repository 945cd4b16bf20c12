//! Session middleware configuration.
//!
//! Browser sessions live in the key-value store next to the cache, so any
//! instance can serve any request and a logout is effective everywhere.

use async_trait::async_trait;
use tower_sessions::cookie::time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, SessionStore};
use tower_sessions::{Expiry, SessionManagerLayer};

use crate::cache::keys;
use crate::config::PortalConfig;
use crate::kv::SharedKv;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "tsh_session";

/// Session expiry time in seconds (7 days of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// `tower-sessions` store over [`KvStore`].
///
/// Records are JSON under `session:{id}` and expire with the session.
#[derive(Clone)]
pub struct KvSessionStore {
    kv: SharedKv,
}

impl KvSessionStore {
    #[must_use]
    pub fn new(kv: SharedKv) -> Self {
        Self { kv }
    }

    fn encode(record: &Record) -> session_store::Result<(String, std::time::Duration)> {
        let value = serde_json::to_string(record)
            .map_err(|e| session_store::Error::Encode(e.to_string()))?;
        Ok((value, remaining(record.expiry_date)))
    }
}

/// Time until `expiry_date`, at least one second so an expired record is
/// still written and then dropped by the store.
fn remaining(expiry_date: OffsetDateTime) -> std::time::Duration {
    let seconds = (expiry_date - OffsetDateTime::now_utc()).whole_seconds().max(1);
    std::time::Duration::from_secs(u64::try_from(seconds).unwrap_or(1))
}

fn backend(e: impl std::fmt::Display) -> session_store::Error {
    session_store::Error::Backend(e.to_string())
}

#[async_trait]
impl SessionStore for KvSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        loop {
            let (value, ttl) = Self::encode(record)?;
            if self
                .kv
                .set_nx(&keys::session(&record.id.to_string()), &value, ttl)
                .await
                .map_err(backend)?
            {
                return Ok(());
            }
            // Id collision: draw another
            record.id = Id::default();
        }
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let (value, ttl) = Self::encode(record)?;
        self.kv
            .set(&keys::session(&record.id.to_string()), &value, Some(ttl))
            .await
            .map_err(backend)
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let Some(raw) = self
            .kv
            .get(&keys::session(&session_id.to_string()))
            .await
            .map_err(backend)?
        else {
            return Ok(None);
        };

        let record: Record = serde_json::from_str(&raw)
            .map_err(|e| session_store::Error::Decode(e.to_string()))?;
        if record.expiry_date <= OffsetDateTime::now_utc() {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.kv
            .del(&[keys::session(&session_id.to_string())])
            .await
            .map_err(backend)?;
        Ok(())
    }
}

impl std::fmt::Debug for KvSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvSessionStore").finish_non_exhaustive()
    }
}

/// Create the session layer over the key-value store.
#[must_use]
pub fn create_session_layer(kv: SharedKv, config: &PortalConfig) -> SessionManagerLayer<KvSessionStore> {
    SessionManagerLayer::new(KvSessionStore::new(kv))
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
