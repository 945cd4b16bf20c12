//! One-time codes and magic-link tokens.
//!
//! Neither secret is stored in clear: the key-value store holds an
//! HMAC-SHA256 of the value keyed with the session secret, so a leaked
//! store snapshot cannot be replayed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tsh_core::{CustomerId, Email};

type HmacSha256 = Hmac<Sha256>;

/// Wrong guesses allowed before a code is discarded.
pub const MAX_ATTEMPTS: u32 = 5;

/// Generate a 6-digit code.
#[must_use]
pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

/// Generate a magic-link token: 32 random bytes, base64url without padding.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Keyed hash of a code or token, hex encoded.
#[must_use]
pub fn hash_secret(key: &[u8], value: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(value.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Compare two strings in constant time.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// A code waiting to be entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCode {
    pub code_hash: String,
    pub customer_id: CustomerId,
    pub expires_at: DateTime<Utc>,
}

impl PendingCode {
    /// Seconds left before the code expires.
    #[must_use]
    pub fn remaining(&self) -> Option<std::time::Duration> {
        (self.expires_at - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }
}

/// A magic link waiting to be clicked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLink {
    pub customer_id: CustomerId,
    pub email: Email,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_format() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_token_is_url_safe() {
        let token = generate_token();
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_hash_secret_is_keyed() {
        let a = hash_secret(b"key-one", "123456");
        let b = hash_secret(b"key-two", "123456");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, hash_secret(b"key-one", "123456"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }

    #[test]
    fn test_pending_code_remaining() {
        let mut pending = PendingCode {
            code_hash: String::new(),
            customer_id: CustomerId::new("1"),
            expires_at: Utc::now() + chrono::Duration::minutes(10),
        };
        assert!(pending.remaining().is_some());

        pending.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(pending.remaining().is_none());
    }
}
