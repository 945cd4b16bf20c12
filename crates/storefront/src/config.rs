//! Portal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PORTAL_BASE_URL` - Public URL of the portal (used in magic links)
//! - `PORTAL_SESSION_SECRET` - Session/OTP signing secret (min 32 chars, high entropy)
//! - `PORTAL_JWT_SECRET` - Mobile token signing secret (min 32 chars, high entropy)
//! - `ZOHO_CLIENT_ID` - Zoho OAuth client ID
//! - `ZOHO_CLIENT_SECRET` - Zoho OAuth client secret
//! - `ZOHO_REFRESH_TOKEN` - Long-lived Zoho OAuth refresh token
//! - `ZOHO_ORGANIZATION_ID` - Zoho organization the portal reads from
//! - `ZOHO_WHOLESALE_WAREHOUSE_ID` - Location whose stock is shown to customers
//! - `ZOHO_DEFAULT_PRICE_LIST_ID` - Consumer price list for guests and unassigned customers
//!
//! ## Optional
//! - `PORTAL_HOST` - Bind address (default: 127.0.0.1)
//! - `PORTAL_PORT` - Listen port (default: 3000)
//! - `ZOHO_ACCOUNTS_URL` - OAuth host (default: `https://accounts.zoho.com`)
//! - `ZOHO_BOOKS_URL` - Books API base (default: `https://www.zohoapis.com/books/v3`)
//! - `ZOHO_INVENTORY_URL` - Inventory API base (default: `https://www.zohoapis.com/inventory/v1`)
//! - `UPSTASH_REDIS_REST_URL` / `UPSTASH_REDIS_REST_TOKEN` - Key-value store (in-memory when unset)
//! - `CRON_SECRET` - Secret for the stock sync trigger endpoint
//! - `ZOHO_WEBHOOK_SECRET` - Shared secret Zoho sends with webhooks
//! - `RESEND_API_KEY` / `EMAIL_FROM` - Transactional email for login codes
//! - `STOCK_SYNC_INTERVAL_SECS` - Background sync interval (default: 900, 0 disables)
//! - `STOCK_SYNC_BATCH_SIZE` - Item detail requests per batch (default: 10)
//! - `STOCK_SYNC_BATCH_DELAY_MS` - Pause between batches (default: 1500)
//! - `STOCK_CACHE_TTL_SECS` - Stock snapshot lifetime (default: 1800)
//! - `CUSTOMER_CACHE_TTL_SECS` - Customer profile lifetime (default: 300)
//! - `PRICE_LIST_CACHE_TTL_SECS` - Price list lifetime (default: 900)
//! - `PRODUCT_CACHE_TTL_SECS` - Product list/detail lifetime (default: 900)
//! - `SENTRY_DSN` / `SENTRY_ENVIRONMENT` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tsh_core::{PriceListId, WarehouseId};

const MIN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Portal application configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the portal
    pub base_url: String,
    /// Session cookie and OTP hashing secret
    pub session_secret: SecretString,
    /// Mobile access/refresh token signing secret
    pub jwt_secret: SecretString,
    /// Secret required by the cron sync trigger (endpoint disabled when unset)
    pub cron_secret: Option<SecretString>,
    /// Shared secret expected on Zoho webhooks (webhooks rejected when unset)
    pub webhook_secret: Option<SecretString>,
    /// Zoho Books/Inventory configuration
    pub zoho: ZohoConfig,
    /// Key-value store backend
    pub kv: KvConfig,
    /// Transactional email
    pub email: EmailConfig,
    /// Cache lifetimes
    pub cache: CacheTtls,
    /// Stock synchronization tuning
    pub sync: SyncConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Zoho API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ZohoConfig {
    /// OAuth host (region specific, e.g. `https://accounts.zoho.com`)
    pub accounts_url: String,
    /// Zoho Books API base URL
    pub books_url: String,
    /// Zoho Inventory API base URL
    pub inventory_url: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Long-lived refresh token used to mint access tokens
    pub refresh_token: SecretString,
    /// Organization ID sent with every request
    pub organization_id: String,
    /// Warehouse (location) whose stock is authoritative for display
    pub wholesale_warehouse_id: WarehouseId,
    /// Consumer price list used when a customer has none assigned
    pub default_price_list_id: PriceListId,
}

impl std::fmt::Debug for ZohoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZohoConfig")
            .field("accounts_url", &self.accounts_url)
            .field("books_url", &self.books_url)
            .field("inventory_url", &self.inventory_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("organization_id", &self.organization_id)
            .field("wholesale_warehouse_id", &self.wholesale_warehouse_id)
            .field("default_price_list_id", &self.default_price_list_id)
            .finish()
    }
}

/// Key-value store backend selection.
#[derive(Clone)]
pub enum KvConfig {
    /// Upstash Redis over its REST API.
    Upstash { url: String, token: SecretString },
    /// Process-local store (development and tests).
    Memory,
}

impl std::fmt::Debug for KvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstash { url, .. } => f
                .debug_struct("Upstash")
                .field("url", url)
                .field("token", &"[REDACTED]")
                .finish(),
            Self::Memory => f.write_str("Memory"),
        }
    }
}

/// Transactional email configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key; codes are only logged when unset
    pub resend_api_key: Option<SecretString>,
    /// Sender address
    pub from: String,
}

/// Cache lifetimes for mirrored Zoho data.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub customer: Duration,
    pub price_list: Duration,
    pub product: Duration,
    pub stock: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            customer: Duration::from_secs(300),
            price_list: Duration::from_secs(900),
            product: Duration::from_secs(900),
            stock: Duration::from_secs(1800),
        }
    }
}

/// Stock synchronization tuning.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Background interval; `None` disables the in-process schedule
    pub interval: Option<Duration>,
    /// Item detail requests issued concurrently per batch
    pub batch_size: usize,
    /// Fixed pause between batches
    pub batch_delay: Duration,
    /// Lifetime of the overlap lock
    pub lock_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(900)),
            batch_size: 10,
            batch_delay: Duration::from_millis(1500),
            lock_ttl: Duration::from_secs(600),
        }
    }
}

impl PortalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_parsed_or_default::<IpAddr>("PORTAL_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("PORTAL_PORT", "3000")?;
        let base_url = get_required_env("PORTAL_BASE_URL")?
            .trim_end_matches('/')
            .to_string();

        let session_secret = get_validated_secret("PORTAL_SESSION_SECRET")?;
        validate_secret_length(&session_secret, "PORTAL_SESSION_SECRET")?;
        let jwt_secret = get_validated_secret("PORTAL_JWT_SECRET")?;
        validate_secret_length(&jwt_secret, "PORTAL_JWT_SECRET")?;

        Ok(Self {
            host,
            port,
            base_url,
            session_secret,
            jwt_secret,
            cron_secret: get_optional_env("CRON_SECRET").map(SecretString::from),
            webhook_secret: get_optional_env("ZOHO_WEBHOOK_SECRET").map(SecretString::from),
            zoho: ZohoConfig::from_env()?,
            kv: KvConfig::from_env()?,
            email: EmailConfig::from_env(),
            cache: CacheTtls::from_env()?,
            sync: SyncConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns true when cookies must be marked `Secure`.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl ZohoConfig {
    /// Load Zoho settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` for any missing required variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            accounts_url: get_env_or_default("ZOHO_ACCOUNTS_URL", "https://accounts.zoho.com"),
            books_url: get_env_or_default("ZOHO_BOOKS_URL", "https://www.zohoapis.com/books/v3"),
            inventory_url: get_env_or_default(
                "ZOHO_INVENTORY_URL",
                "https://www.zohoapis.com/inventory/v1",
            ),
            client_id: get_required_env("ZOHO_CLIENT_ID")?,
            client_secret: get_required_secret("ZOHO_CLIENT_SECRET")?,
            refresh_token: get_required_secret("ZOHO_REFRESH_TOKEN")?,
            organization_id: get_required_env("ZOHO_ORGANIZATION_ID")?,
            wholesale_warehouse_id: WarehouseId::new(get_required_env(
                "ZOHO_WHOLESALE_WAREHOUSE_ID",
            )?),
            default_price_list_id: PriceListId::new(get_required_env(
                "ZOHO_DEFAULT_PRICE_LIST_ID",
            )?),
        })
    }
}

impl KvConfig {
    fn from_env() -> Result<Self, ConfigError> {
        match (
            get_optional_env("UPSTASH_REDIS_REST_URL"),
            get_optional_env("UPSTASH_REDIS_REST_TOKEN"),
        ) {
            (Some(url), Some(token)) => Ok(Self::Upstash {
                url: url.trim_end_matches('/').to_string(),
                token: SecretString::from(token),
            }),
            (None, None) => Ok(Self::Memory),
            (Some(_), None) => Err(ConfigError::MissingEnvVar(
                "UPSTASH_REDIS_REST_TOKEN".to_string(),
            )),
            (None, Some(_)) => Err(ConfigError::MissingEnvVar(
                "UPSTASH_REDIS_REST_URL".to_string(),
            )),
        }
    }
}

impl EmailConfig {
    fn from_env() -> Self {
        Self {
            resend_api_key: get_optional_env("RESEND_API_KEY").map(SecretString::from),
            from: get_env_or_default("EMAIL_FROM", "TSH <noreply@tsh.sale>"),
        }
    }
}

impl CacheTtls {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            customer: get_secs_or_default("CUSTOMER_CACHE_TTL_SECS", 300)?,
            price_list: get_secs_or_default("PRICE_LIST_CACHE_TTL_SECS", 900)?,
            product: get_secs_or_default("PRODUCT_CACHE_TTL_SECS", 900)?,
            stock: get_secs_or_default("STOCK_CACHE_TTL_SECS", 1800)?,
        })
    }
}

impl SyncConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let interval = get_secs_or_default("STOCK_SYNC_INTERVAL_SECS", 900)?;
        let batch_size = get_parsed_or_default::<usize>("STOCK_SYNC_BATCH_SIZE", "10")?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STOCK_SYNC_BATCH_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let delay_ms = get_parsed_or_default::<u64>("STOCK_SYNC_BATCH_DELAY_MS", "1500")?;

        Ok(Self {
            interval: (!interval.is_zero()).then_some(interval),
            batch_size,
            batch_delay: Duration::from_millis(delay_ms),
            ..Self::default()
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to a default literal.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a whole number of seconds.
fn get_secs_or_default(key: &str, default: u64) -> Result<Duration, ConfigError> {
    get_parsed_or_default::<u64>(key, &default.to_string()).map(Duration::from_secs)
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn zoho_config() -> ZohoConfig {
        ZohoConfig {
            accounts_url: "https://accounts.zoho.com".to_string(),
            books_url: "https://www.zohoapis.com/books/v3".to_string(),
            inventory_url: "https://www.zohoapis.com/inventory/v1".to_string(),
            client_id: "1000.CLIENTID".to_string(),
            client_secret: SecretString::from("super_secret_client_secret"),
            refresh_token: SecretString::from("super_secret_refresh_token"),
            organization_id: "748369814".to_string(),
            wholesale_warehouse_id: WarehouseId::new("2646610000000077024"),
            default_price_list_id: PriceListId::new("2646610000049149103"),
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-jwt-secret-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"a".repeat(40), "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_secret_length() {
        assert!(validate_secret_length(&SecretString::from("short"), "T").is_err());
        assert!(validate_secret_length(&SecretString::from("k".repeat(32)), "T").is_ok());
    }

    #[test]
    fn test_zoho_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", zoho_config());

        assert!(debug_output.contains("1000.CLIENTID"));
        assert!(debug_output.contains("748369814"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_client_secret"));
        assert!(!debug_output.contains("super_secret_refresh_token"));
    }

    #[test]
    fn test_kv_config_debug_redacts_token() {
        let kv = KvConfig::Upstash {
            url: "https://eu1-fine-cat.upstash.io".to_string(),
            token: SecretString::from("AXk5ASQgtoken"),
        };
        let debug_output = format!("{kv:?}");
        assert!(debug_output.contains("fine-cat"));
        assert!(!debug_output.contains("AXk5ASQgtoken"));
    }

    #[test]
    fn test_defaults() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.customer, Duration::from_secs(300));
        assert_eq!(ttls.stock, Duration::from_secs(1800));

        let sync = SyncConfig::default();
        assert_eq!(sync.batch_size, 10);
        assert_eq!(sync.batch_delay, Duration::from_millis(1500));
    }
}
