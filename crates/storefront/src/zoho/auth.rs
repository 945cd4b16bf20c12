//! Zoho OAuth access tokens.
//!
//! Access tokens live for an hour and are minted with the refresh-token
//! grant. Zoho throttles that grant aggressively, so a minted token is
//! cached in memory and in the key-value store where every instance can
//! reuse it.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::ZohoError;
use crate::config::ZohoConfig;

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// A Zoho OAuth access token.
#[derive(Debug, Clone)]
pub struct ZohoToken {
    /// Bearer value for the `Authorization: Zoho-oauthtoken` header.
    pub access_token: SecretString,
    /// Unix timestamp when the access token expires.
    pub expires_at: i64,
}

/// Token as persisted in the key-value store.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct StoredToken {
    pub access_token: String,
    pub expires_at: i64,
}

/// Response from the Zoho token endpoint.
///
/// Zoho reports grant failures with HTTP 200 and an `error` field.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl ZohoToken {
    /// Check if the access token has expired (with a 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - EXPIRY_BUFFER_SECS
    }

    /// Seconds until the token should stop being used.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - EXPIRY_BUFFER_SECS - chrono::Utc::now().timestamp()).max(0)
    }

    pub(super) fn to_stored(&self) -> StoredToken {
        StoredToken {
            access_token: self.access_token.expose_secret().to_string(),
            expires_at: self.expires_at,
        }
    }

    pub(super) fn from_stored(stored: StoredToken) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            expires_at: stored.expires_at,
        }
    }
}

/// Mint a new access token with the refresh-token grant.
///
/// # Errors
///
/// Returns `ZohoError::TokenRefresh` if Zoho rejects the grant, or
/// `ZohoError::Http` if the request fails.
#[instrument(skip(client, config), fields(client_id = %config.client_id))]
pub async fn refresh_access_token(
    client: &reqwest::Client,
    config: &ZohoConfig,
) -> Result<ZohoToken, ZohoError> {
    let now = chrono::Utc::now().timestamp();
    let url = format!(
        "{}/oauth/v2/token",
        config.accounts_url.trim_end_matches('/')
    );

    let response = client
        .post(&url)
        .form(&[
            ("refresh_token", config.refresh_token.expose_secret()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ZohoError::TokenRefresh(format!(
            "HTTP {status}: {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    let parsed: TokenResponse =
        serde_json::from_str(&body).map_err(|e| ZohoError::Parse(e.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(ZohoError::TokenRefresh(error));
    }

    let access_token = parsed
        .access_token
        .ok_or_else(|| ZohoError::TokenRefresh("response has no access_token".to_string()))?;

    tracing::info!(expires_in = ?parsed.expires_in, "Minted Zoho access token");

    Ok(ZohoToken {
        access_token: SecretString::from(access_token),
        expires_at: now + parsed.expires_in.unwrap_or(3600),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn token(expires_in: i64) -> ZohoToken {
        ZohoToken {
            access_token: SecretString::from("1000.abc"),
            expires_at: chrono::Utc::now().timestamp() + expires_in,
        }
    }

    #[test]
    fn test_token_is_expired() {
        assert!(token(-3600).is_expired());
        assert!(!token(3600).is_expired());
        // Within the 60s buffer
        assert!(token(30).is_expired());
    }

    #[test]
    fn test_remaining_secs() {
        assert_eq!(token(-10).remaining_secs(), 0);
        let remaining = token(3600).remaining_secs();
        assert!((3530..=3540).contains(&remaining));
    }

    #[test]
    fn test_stored_roundtrip_keeps_expiry() {
        let original = token(1800);
        let restored = ZohoToken::from_stored(original.to_stored());
        assert_eq!(restored.expires_at, original.expires_at);
        assert_eq!(restored.access_token.expose_secret(), "1000.abc");
    }

    #[test]
    fn test_token_response_error_field() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"error":"invalid_code"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("invalid_code"));
        assert!(parsed.access_token.is_none());
    }
}
