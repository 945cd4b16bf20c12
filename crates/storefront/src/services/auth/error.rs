//! Authentication error types.

use thiserror::Error;

use crate::kv::KvError;
use crate::services::email::EmailError;
use crate::zoho::ZohoError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] tsh_core::EmailError),

    /// No active Zoho contact uses this email.
    #[error("no customer account for this email")]
    UnknownCustomer,

    /// Wrong, expired or already used one-time code.
    #[error("invalid or expired code")]
    InvalidCode,

    /// Too many wrong codes; the pending code was discarded.
    #[error("too many attempts")]
    TooManyAttempts,

    /// Too many login requests for one address.
    #[error("too many login requests")]
    RateLimited,

    /// Magic link or bearer token is invalid or expired.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Refresh token was already rotated or revoked.
    #[error("token revoked")]
    TokenRevoked,

    /// The Zoho contact is no longer active.
    #[error("customer account is inactive")]
    InactiveCustomer,

    /// Key-value store error.
    #[error("key-value store error: {0}")]
    Kv(#[from] KvError),

    /// Zoho lookup failed.
    #[error("Zoho error: {0}")]
    Zoho(#[from] ZohoError),

    /// Email delivery failed.
    #[error("email error: {0}")]
    Email(#[from] EmailError),

    /// Token signing failed.
    #[error("token signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Session state could not be read or written.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}
