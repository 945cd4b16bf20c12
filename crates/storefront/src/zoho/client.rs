//! HTTP plumbing shared by every Zoho endpoint.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use super::ZohoError;
use super::auth::{StoredToken, ZohoToken, refresh_access_token};
use crate::cache::keys;
use crate::config::ZohoConfig;
use crate::kv::{self, SharedKv};

/// Which Zoho product an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    Books,
    Inventory,
}

/// Backoff applied to 429 responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
    /// Cap for a single delay, including `Retry-After` values.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), honoring `Retry-After`.
    #[must_use]
    pub fn delay(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        let delay = retry_after.map_or_else(
            || self.base_delay.saturating_mul(2u32.saturating_pow(attempt)),
            Duration::from_secs,
        );
        delay.min(self.max_delay)
    }
}

/// Envelope every Zoho JSON response carries.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Client for Zoho Books and Zoho Inventory.
#[derive(Clone)]
pub struct ZohoClient {
    inner: Arc<ZohoClientInner>,
}

struct ZohoClientInner {
    http: reqwest::Client,
    config: ZohoConfig,
    kv: SharedKv,
    retry: RetryPolicy,
    /// In-memory token cache
    token: RwLock<Option<ZohoToken>>,
    /// Serializes refreshes so concurrent requests mint one token
    refresh_lock: Mutex<()>,
}

impl ZohoClient {
    /// Create a new Zoho client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ZohoConfig, kv: SharedKv) -> Result<Self, ZohoError> {
        Self::with_retry_policy(config, kv, RetryPolicy::default())
    }

    /// Create a client with a custom 429 backoff.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_retry_policy(
        config: &ZohoConfig,
        kv: SharedKv,
        retry: RetryPolicy,
    ) -> Result<Self, ZohoError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(ZohoClientInner {
                http,
                config: config.clone(),
                kv,
                retry,
                token: RwLock::new(None),
                refresh_lock: Mutex::new(()),
            }),
        })
    }

    /// The configuration the client was built with.
    #[must_use]
    pub fn config(&self) -> &ZohoConfig {
        &self.inner.config
    }

    fn base_url(&self, api: Api) -> &str {
        match api {
            Api::Books => self.inner.config.books_url.trim_end_matches('/'),
            Api::Inventory => self.inner.config.inventory_url.trim_end_matches('/'),
        }
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Return a usable access token, minting one if needed.
    ///
    /// Order: memory, key-value store, refresh-token grant.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::TokenRefresh` if a new token cannot be minted.
    pub async fn access_token(&self) -> Result<SecretString, ZohoError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.inner.refresh_lock.lock().await;

        // Another task may have refreshed while we waited
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        match kv::get_json::<StoredToken>(self.inner.kv.as_ref(), keys::ZOHO_ACCESS_TOKEN).await {
            Ok(Some(stored)) => {
                let token = ZohoToken::from_stored(stored);
                if !token.is_expired() {
                    debug!("Reusing Zoho access token from key-value store");
                    let secret = token.access_token.clone();
                    *self.inner.token.write().await = Some(token);
                    return Ok(secret);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read shared Zoho token"),
        }

        let token = refresh_access_token(&self.inner.http, &self.inner.config).await?;
        let ttl = u64::try_from(token.remaining_secs()).unwrap_or(0);
        if ttl > 0
            && let Err(e) = kv::set_json(
                self.inner.kv.as_ref(),
                keys::ZOHO_ACCESS_TOKEN,
                &token.to_stored(),
                Some(Duration::from_secs(ttl)),
            )
            .await
        {
            warn!(error = %e, "Failed to share Zoho token");
        }

        let secret = token.access_token.clone();
        *self.inner.token.write().await = Some(token);
        Ok(secret)
    }

    async fn cached_token(&self) -> Option<SecretString> {
        self.inner
            .token
            .read()
            .await
            .as_ref()
            .filter(|token| !token.is_expired())
            .map(|token| token.access_token.clone())
    }

    /// Drop the cached token everywhere so the next call mints a new one.
    pub async fn invalidate_token(&self) {
        *self.inner.token.write().await = None;
        if let Err(e) = self
            .inner
            .kv
            .del(&[keys::ZOHO_ACCESS_TOKEN.to_string()])
            .await
        {
            warn!(error = %e, "Failed to drop shared Zoho token");
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Execute a GET request and parse the JSON envelope.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        api: Api,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ZohoError> {
        let response = self.send(api, Method::GET, path, query, None).await?;
        Self::parse_json(response).await
    }

    /// Execute a POST request with an optional JSON body.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        api: Api,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, ZohoError> {
        let response = self.send(api, Method::POST, path, query, body).await?;
        Self::parse_json(response).await
    }

    /// Execute a GET request and return the raw body and content type.
    pub(crate) async fn get_bytes(
        &self,
        api: Api,
        path: &str,
    ) -> Result<(Vec<u8>, Option<String>), ZohoError> {
        let response = self.send(api, Method::GET, path, &[], None).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
        {
            // Zoho answers missing images with a JSON envelope and HTTP 200
            let body = response.text().await?;
            let envelope: Envelope =
                serde_json::from_str(&body).map_err(|e| ZohoError::Parse(e.to_string()))?;
            return Err(ZohoError::NotFound(envelope.message));
        }

        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }

    /// Send a request with authentication, 429 backoff and one 401 refresh.
    ///
    /// Returns the response only for 2xx statuses; everything else is
    /// mapped to a `ZohoError`.
    #[instrument(skip(self, query, body), fields(api = ?api, method = %method))]
    async fn send(
        &self,
        api: Api,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ZohoError> {
        let url = format!("{}{}", self.base_url(api), path);
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let token = self.access_token().await?;

            let mut request = self
                .inner
                .http
                .request(method.clone(), &url)
                .header(
                    AUTHORIZATION,
                    format!("Zoho-oauthtoken {}", token.expose_secret()),
                )
                .query(&[("organization_id", self.inner.config.organization_id.as_str())])
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok());

                if attempt >= self.inner.retry.max_retries {
                    warn!(path, attempts = attempt + 1, "Zoho rate limit persisted");
                    return Err(ZohoError::RateLimited(retry_after.unwrap_or(60)));
                }

                let delay = self.inner.retry.delay(attempt, retry_after);
                warn!(path, attempt, delay_ms = delay.as_millis(), "Zoho rate limited, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                if refreshed {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ZohoError::Unauthorized(
                        body.chars().take(200).collect::<String>(),
                    ));
                }
                debug!(path, "Zoho rejected token, refreshing");
                self.invalidate_token().await;
                refreshed = true;
                continue;
            }

            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let envelope = serde_json::from_str::<Envelope>(&body).ok();

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ZohoError::NotFound(
                    envelope.map_or_else(|| path.to_string(), |e| e.message),
                ));
            }

            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Zoho API returned non-success status"
            );
            return Err(match envelope {
                Some(envelope) => ZohoError::Api {
                    status: status.as_u16(),
                    code: envelope.code,
                    message: envelope.message,
                },
                None => ZohoError::Api {
                    status: status.as_u16(),
                    code: -1,
                    message: body.chars().take(200).collect(),
                },
            });
        }
    }

    /// Check the envelope `code` and deserialize the payload.
    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ZohoError> {
        let status = response.status().as_u16();
        let body = response.text().await?;

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Zoho response"
            );
            ZohoError::Parse(e.to_string())
        })?;

        if envelope.code != 0 {
            return Err(ZohoError::Api {
                status,
                code: envelope.code,
                message: envelope.message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Zoho response did not match the expected shape"
            );
            ZohoError::Parse(e.to_string())
        })
    }
}

impl std::fmt::Debug for ZohoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZohoClient")
            .field("config", &self.inner.config)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}
