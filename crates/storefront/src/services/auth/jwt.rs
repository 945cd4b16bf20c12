//! Mobile access and refresh tokens.
//!
//! Both are HS256 JWTs signed with `PORTAL_JWT_SECRET`. Refresh tokens carry
//! a `jti` that must exist in the key-value store; refreshing deletes the
//! old `jti` before issuing a new pair, so each refresh token works once.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tsh_core::{CustomerId, Email};
use uuid::Uuid;

use super::AuthError;
use crate::cache::keys;
use crate::kv::SharedKv;
use crate::models::CurrentCustomer;

/// Access token lifetime.
pub const ACCESS_TTL: Duration = Duration::from_secs(60 * 60);

/// Refresh token lifetime.
pub const REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Zoho contact id.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub typ: TokenKind,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn into_customer(self) -> Result<CurrentCustomer, AuthError> {
        Ok(CurrentCustomer {
            id: CustomerId::new(self.sub),
            email: Email::parse(&self.email).map_err(|_| AuthError::InvalidToken)?,
            name: self.name,
        })
    }
}

/// Token pair returned to the mobile app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Signs, verifies and revokes tokens.
#[derive(Clone)]
pub struct JwtIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    kv: SharedKv,
}

impl JwtIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, kv: SharedKv) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            kv,
        }
    }

    fn sign(
        &self,
        customer: &CurrentCustomer,
        typ: TokenKind,
        ttl: Duration,
    ) -> Result<(String, Claims), AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: customer.id.to_string(),
            email: customer.email.to_string(),
            name: customer.name.clone(),
            typ,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    /// Decode and check signature, expiry and kind.
    fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AuthError::InvalidToken)?;
        if data.claims.typ != expected {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    /// Issue a new pair and register the refresh `jti`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if signing or the store write fails.
    pub async fn issue(&self, customer: &CurrentCustomer) -> Result<TokenPair, AuthError> {
        let (access_token, _) = self.sign(customer, TokenKind::Access, ACCESS_TTL)?;
        let (refresh_token, refresh) = self.sign(customer, TokenKind::Refresh, REFRESH_TTL)?;

        self.kv
            .set(
                &keys::refresh_token(&refresh.jti),
                customer.id.as_str(),
                Some(REFRESH_TTL),
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TTL.as_secs(),
        })
    }

    /// Validate an access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for a bad, expired or refresh token.
    pub fn verify_access(&self, token: &str) -> Result<CurrentCustomer, AuthError> {
        self.verify(token, TokenKind::Access)?.into_customer()
    }

    /// Exchange a refresh token for a new pair, revoking the old one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for a bad token and
    /// `AuthError::TokenRevoked` when it was already used or revoked.
    pub async fn refresh(&self, token: &str) -> Result<(CurrentCustomer, TokenPair), AuthError> {
        let claims = self.verify(token, TokenKind::Refresh)?;

        // Deleting claims the jti; a concurrent refresh sees 0 and loses
        let removed = self.kv.del(&[keys::refresh_token(&claims.jti)]).await?;
        if removed == 0 {
            return Err(AuthError::TokenRevoked);
        }

        let customer = claims.into_customer()?;
        let pair = self.issue(&customer).await?;
        Ok((customer, pair))
    }

    /// Revoke a refresh token. Revoking twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for a bad token.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.verify(token, TokenKind::Refresh)?;
        self.kv.del(&[keys::refresh_token(&claims.jti)]).await?;
        Ok(())
    }
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::kv::MemoryKv;

    fn issuer() -> JwtIssuer {
        JwtIssuer::new(
            &SecretString::from("k8#Qz!v2Lr9@Xw4$Tn6^Bp1&Hy3*Jm5%"),
            Arc::new(MemoryKv::new()),
        )
    }

    fn customer() -> CurrentCustomer {
        CurrentCustomer {
            id: CustomerId::new("2646610000000113001"),
            email: Email::parse("buyer@example.com").unwrap(),
            name: "Al Noor Trading".to_string(),
        }
    }

    #[tokio::test]
    async fn test_access_token_round_trip() {
        let jwt = issuer();
        let pair = jwt.issue(&customer()).await.unwrap();

        assert_eq!(jwt.verify_access(&pair.access_token).unwrap(), customer());
        assert_eq!(pair.expires_in, 3600);

        let claims = jwt.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let jwt = issuer();
        let pair = jwt.issue(&customer()).await.unwrap();

        assert!(matches!(
            jwt.verify_access(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates() {
        let jwt = issuer();
        let pair = jwt.issue(&customer()).await.unwrap();

        let (refreshed, next) = jwt.refresh(&pair.refresh_token).await.unwrap();
        assert_eq!(refreshed, customer());
        assert_ne!(next.refresh_token, pair.refresh_token);

        assert!(matches!(
            jwt.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(jwt.refresh(&next.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke() {
        let jwt = issuer();
        let pair = jwt.issue(&customer()).await.unwrap();

        jwt.revoke(&pair.refresh_token).await.unwrap();
        jwt.revoke(&pair.refresh_token).await.unwrap();
        assert!(matches!(
            jwt.refresh(&pair.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let other = JwtIssuer::new(
            &SecretString::from("Zz9!aa7@Qq5#Ww3$Ee1%Rr8^Tt6&Yy4*"),
            Arc::new(MemoryKv::new()),
        );
        let (token, _) = other
            .sign(&customer(), TokenKind::Access, ACCESS_TTL)
            .unwrap();

        assert!(matches!(
            issuer().verify_access(&token),
            Err(AuthError::InvalidToken)
        ));
    }
}
