//! Zoho Books and Zoho Inventory REST clients.
//!
//! # Architecture
//!
//! - Zoho is the source of truth for customers, items, price lists and
//!   sales documents; nothing here is persisted except through the cache
//! - One [`ZohoClient`] talks to both APIs; each call names which one
//! - OAuth access tokens are minted from a long-lived refresh token and
//!   shared between instances through the key-value store
//! - 429 responses are retried with exponential backoff; a 401 forces one
//!   token refresh and retry
//!
//! # APIs
//!
//! ## Books (`/books/v3`)
//! - Contacts, price books, sales orders, invoices, payments, credit notes
//!
//! ## Inventory (`/inventory/v1`)
//! - Items with per-location stock, item images
//!
//! # Example
//!
//! ```rust,ignore
//! use tsh_storefront::zoho::ZohoClient;
//!
//! let zoho = ZohoClient::new(&config.zoho, kv.clone())?;
//! let item = zoho.get_item(&item_id).await?;
//! let contact = zoho.get_contact(&customer_id).await?;
//! ```

mod auth;
mod client;
mod contacts;
mod documents;
mod items;
mod pricebooks;
pub mod serde_helpers;
pub mod types;

pub use auth::ZohoToken;
pub use client::{Api, RetryPolicy, ZohoClient};
pub use items::MAX_PER_PAGE;
pub use types::*;

use thiserror::Error;

/// Errors that can occur when interacting with Zoho APIs.
#[derive(Debug, Error)]
pub enum ZohoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Zoho answered with a non-zero `code`.
    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited after exhausting retries.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Access token rejected even after a refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The OAuth refresh-token grant failed.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ZohoError {
    /// Returns true if the error is worth retrying later (rate limits, network, 5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
