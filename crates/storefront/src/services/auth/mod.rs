//! Passwordless customer authentication.
//!
//! A customer proves control of the email on their Zoho contact with a
//! 6-digit code or, in the browser, a magic link. Browser logins end in a
//! cookie session; the mobile app gets a JWT pair instead (see [`jwt`]).

mod error;
pub mod jwt;
pub mod otp;

pub use error::AuthError;
pub use jwt::{JwtIssuer, TokenPair};

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};
use tsh_core::{CustomerId, Email, Locale};

use self::otp::{MAX_ATTEMPTS, PendingCode, PendingLink};
use crate::cache::keys;
use crate::kv::{self, SharedKv};
use crate::models::CurrentCustomer;
use crate::services::email::{EmailService, LoginEmail};
use crate::zoho::ZohoClient;

/// Lifetime of a login code.
pub const CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Lifetime of a magic link.
pub const LINK_TTL: Duration = Duration::from_secs(15 * 60);

/// Login requests allowed per email per window.
pub const MAX_REQUESTS: i64 = 3;

/// Window for [`MAX_REQUESTS`].
pub const REQUEST_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Where a login was requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginChannel {
    /// Browser: code and magic link.
    Web,
    /// Mobile app: code only.
    Mobile,
}

/// Passwordless login service.
#[derive(Clone)]
pub struct AuthService {
    kv: SharedKv,
    zoho: ZohoClient,
    email: EmailService,
    jwt: JwtIssuer,
    hash_key: SecretString,
    base_url: String,
}

impl AuthService {
    #[must_use]
    pub fn new(
        kv: SharedKv,
        zoho: ZohoClient,
        email: EmailService,
        jwt: JwtIssuer,
        hash_key: SecretString,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            kv,
            zoho,
            email,
            jwt,
            hash_key,
            base_url: base_url.into(),
        }
    }

    /// Token issuer for the mobile endpoints.
    #[must_use]
    pub fn jwt(&self) -> &JwtIssuer {
        &self.jwt
    }

    fn hash(&self, value: &str) -> String {
        otp::hash_secret(self.hash_key.expose_secret().as_bytes(), value)
    }

    /// Send a login code (and, on the web, a magic link) to a customer.
    ///
    /// A new request replaces any code still pending for the address.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownCustomer` when no active contact uses the
    /// email, `AuthError::RateLimited` after too many requests, and
    /// store, Zoho or delivery errors otherwise.
    #[instrument(skip(self, raw_email), fields(email))]
    pub async fn request_login(
        &self,
        raw_email: &str,
        locale: Locale,
        channel: LoginChannel,
    ) -> Result<(), AuthError> {
        let email = Email::parse(raw_email)?;
        tracing::Span::current().record("email", email.masked().as_str());

        let requests = self
            .kv
            .incr(&keys::login_requests(email.as_str()), REQUEST_WINDOW)
            .await?;
        if requests > MAX_REQUESTS {
            warn!(requests, "Login requests rate limited");
            return Err(AuthError::RateLimited);
        }

        let Some(contact) = self.zoho.find_contact_by_email(email.as_str()).await? else {
            info!("Login requested for an unknown email");
            return Err(AuthError::UnknownCustomer);
        };

        let code = otp::generate_code();
        let pending = PendingCode {
            code_hash: self.hash(&code),
            customer_id: contact.contact_id.clone(),
            expires_at: chrono::Utc::now()
                + chrono::Duration::from_std(CODE_TTL).unwrap_or_default(),
        };
        // Wrong guesses against the previous code do not carry over
        self.kv
            .del(&[keys::otp_attempts(email.as_str())])
            .await?;
        kv::set_json(
            self.kv.as_ref(),
            &keys::otp(email.as_str()),
            &pending,
            Some(CODE_TTL),
        )
        .await?;

        let magic_link = match channel {
            LoginChannel::Web => {
                let token = otp::generate_token();
                let link = PendingLink {
                    customer_id: contact.contact_id.clone(),
                    email: email.clone(),
                };
                kv::set_json(
                    self.kv.as_ref(),
                    &keys::magic_link(&self.hash(&token)),
                    &link,
                    Some(LINK_TTL),
                )
                .await?;
                Some(format!("{}/api/auth/magic?token={token}", self.base_url))
            }
            LoginChannel::Mobile => None,
        };

        self.email
            .send_login(
                &email,
                &LoginEmail {
                    code: &code,
                    magic_link: magic_link.as_deref(),
                    locale,
                    minutes_valid: CODE_TTL.as_secs() / 60,
                },
            )
            .await?;

        info!(customer_id = %contact.contact_id, ?channel, "Login code issued");
        Ok(())
    }

    /// Check a login code. A correct code is consumed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCode` for a wrong, expired or used code
    /// and `AuthError::TooManyAttempts` once the attempt limit is reached.
    #[instrument(skip(self, raw_email, code), fields(email))]
    pub async fn verify_code(&self, raw_email: &str, code: &str) -> Result<CurrentCustomer, AuthError> {
        let email = Email::parse(raw_email)?;
        tracing::Span::current().record("email", email.masked().as_str());
        let key = keys::otp(email.as_str());
        let attempts_key = keys::otp_attempts(email.as_str());

        let Some(pending) = kv::get_json::<PendingCode>(self.kv.as_ref(), &key).await? else {
            return Err(AuthError::InvalidCode);
        };

        if !otp::constant_time_eq(&pending.code_hash, &self.hash(code.trim())) {
            // INCR keeps concurrent guesses from sharing one count
            let ttl = pending.remaining().unwrap_or(CODE_TTL);
            let attempts = self.kv.incr(&attempts_key, ttl).await?;
            if attempts >= i64::from(MAX_ATTEMPTS) {
                warn!(attempts, "Too many wrong login codes, discarding");
                self.kv.del(&[key, attempts_key]).await?;
                return Err(AuthError::TooManyAttempts);
            }
            return Err(AuthError::InvalidCode);
        }

        // Whoever deletes the key owns the login
        if self.kv.del(&[key]).await? == 0 {
            return Err(AuthError::InvalidCode);
        }
        self.kv.del(&[attempts_key]).await?;

        self.load_customer(&pending.customer_id, email).await
    }

    /// Consume a magic-link token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for an unknown, expired or already
    /// used token.
    #[instrument(skip_all)]
    pub async fn consume_magic_link(&self, token: &str) -> Result<CurrentCustomer, AuthError> {
        let key = keys::magic_link(&self.hash(token));

        let Some(link) = kv::get_json::<PendingLink>(self.kv.as_ref(), &key).await? else {
            return Err(AuthError::InvalidToken);
        };
        if self.kv.del(&[key]).await? == 0 {
            return Err(AuthError::InvalidToken);
        }

        // The code sent with the link is no longer needed
        self.kv
            .del(&[
                keys::otp(link.email.as_str()),
                keys::otp_attempts(link.email.as_str()),
            ])
            .await?;

        self.load_customer(&link.customer_id, link.email).await
    }

    /// Re-read the contact so a deactivated account cannot log in.
    async fn load_customer(
        &self,
        customer_id: &CustomerId,
        email: Email,
    ) -> Result<CurrentCustomer, AuthError> {
        let contact = self.zoho.get_contact(customer_id).await?;
        if !contact.is_active() {
            warn!(customer_id = %customer_id, "Login for inactive contact refused");
            return Err(AuthError::InactiveCustomer);
        }

        info!(customer_id = %customer_id, "Customer logged in");
        Ok(CurrentCustomer {
            id: customer_id.clone(),
            email,
            name: contact.display_name().to_string(),
        })
    }

    /// Issue a mobile token pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if signing or the store write fails.
    pub async fn issue_tokens(&self, customer: &CurrentCustomer) -> Result<TokenPair, AuthError> {
        self.jwt.issue(customer).await
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{EmailConfig, ZohoConfig};
    use crate::kv::MemoryKv;
    use tsh_core::{PriceListId, WarehouseId};

    const SECRET: &str = "k8#Qz!v2Lr9@Xw4$Tn6^Bp1&Hy3*Jm5%";

    fn service() -> AuthService {
        let kv: SharedKv = Arc::new(MemoryKv::new());
        let zoho_config = ZohoConfig {
            accounts_url: "http://127.0.0.1:9".to_string(),
            books_url: "http://127.0.0.1:9".to_string(),
            inventory_url: "http://127.0.0.1:9".to_string(),
            client_id: "id".to_string(),
            client_secret: SecretString::from("secret"),
            refresh_token: SecretString::from("refresh"),
            organization_id: "1".to_string(),
            wholesale_warehouse_id: WarehouseId::new("500"),
            default_price_list_id: PriceListId::new("default"),
        };
        let zoho = ZohoClient::new(&zoho_config, Arc::clone(&kv)).unwrap();
        let email = EmailService::new(&EmailConfig {
            resend_api_key: None,
            from: "TSH <noreply@tsh.sale>".to_string(),
        })
        .unwrap();
        let secret = SecretString::from(SECRET);
        let jwt = JwtIssuer::new(&secret, Arc::clone(&kv));
        AuthService::new(kv, zoho, email, jwt, secret, "http://localhost:3000")
    }

    async fn seed_code(auth: &AuthService, email: &str, code: &str) {
        let pending = PendingCode {
            code_hash: auth.hash(code),
            customer_id: CustomerId::new("1"),
            expires_at: chrono::Utc::now() + chrono::Duration::minutes(10),
        };
        kv::set_json(auth.kv.as_ref(), &keys::otp(email), &pending, Some(CODE_TTL))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wrong_code_counts_attempts() {
        let auth = service();
        seed_code(&auth, "buyer@example.com", "123456").await;

        for _ in 0..MAX_ATTEMPTS - 1 {
            assert!(matches!(
                auth.verify_code("buyer@example.com", "000000").await,
                Err(AuthError::InvalidCode)
            ));
        }
        assert!(matches!(
            auth.verify_code("buyer@example.com", "000000").await,
            Err(AuthError::TooManyAttempts)
        ));

        // Discarded: even the right code fails now
        assert!(matches!(
            auth.verify_code("buyer@example.com", "123456").await,
            Err(AuthError::InvalidCode)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_wrong_codes_share_one_limit() {
        let auth = service();
        seed_code(&auth, "buyer@example.com", "123456").await;

        let guesses: Vec<_> = (0..MAX_ATTEMPTS * 3)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move { auth.verify_code("buyer@example.com", "000000").await })
            })
            .collect();
        let mut limited = 0;
        for guess in guesses {
            match guess.await.unwrap() {
                Err(AuthError::TooManyAttempts) => limited += 1,
                Err(AuthError::InvalidCode) => {}
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert!(limited >= 1);

        // The limit was reached, so the code is gone
        assert!(matches!(
            auth.verify_code("buyer@example.com", "123456").await,
            Err(AuthError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn test_right_code_resets_attempts() {
        let auth = service();
        seed_code(&auth, "buyer@example.com", "123456").await;
        assert!(auth.verify_code("buyer@example.com", "000000").await.is_err());

        // The contact lookup fails offline, after the code was consumed
        let _ = auth.verify_code("buyer@example.com", "123456").await;
        assert_eq!(
            auth.kv
                .get(&keys::otp_attempts("buyer@example.com"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_missing_code_is_invalid() {
        let auth = service();
        assert!(matches!(
            auth.verify_code("nobody@example.com", "123456").await,
            Err(AuthError::InvalidCode)
        ));
    }

    #[tokio::test]
    async fn test_invalid_email_is_rejected() {
        let auth = service();
        assert!(matches!(
            auth.request_login("not-an-email", Locale::En, LoginChannel::Web).await,
            Err(AuthError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_request_rate_limit_runs_before_zoho() {
        let auth = service();
        for _ in 0..MAX_REQUESTS {
            auth.kv
                .incr(&keys::login_requests("buyer@example.com"), REQUEST_WINDOW)
                .await
                .unwrap();
        }
        assert!(matches!(
            auth.request_login("Buyer@Example.com", Locale::Ar, LoginChannel::Mobile)
                .await,
            Err(AuthError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_unknown_magic_link() {
        let auth = service();
        assert!(matches!(
            auth.consume_magic_link("bogus").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
