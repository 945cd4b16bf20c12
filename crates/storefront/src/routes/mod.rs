//! HTTP route handlers for the portal API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness
//! GET  /health/ready                 - Key-value store ping
//!
//! # Browser auth (session cookie)
//! POST /api/auth/request             - Send code + magic link
//! POST /api/auth/verify              - Verify code, start session
//! GET  /api/auth/magic?token=        - Consume magic link, start session
//! GET  /api/auth/me                  - Current customer
//! POST /api/auth/logout              - End session
//!
//! # Mobile auth (JWT)
//! POST /api/mobile/auth/request-otp  - Send code
//! POST /api/mobile/auth/verify-otp   - Verify code, issue tokens
//! POST /api/mobile/auth/refresh      - Rotate refresh token
//! POST /api/mobile/auth/logout       - Revoke refresh token
//!
//! # Catalog (public, priced for the viewer)
//! GET  /api/products                 - Listing (?q, category, in_stock, page, per_page)
//! GET  /api/products/{id}            - Detail
//! GET  /api/products/{id}/image      - Image proxy
//!
//! # Account (session or Bearer)
//! GET  /api/account                  - Dashboard
//! GET  /api/orders[/{id}]            - Sales orders
//! GET  /api/invoices[/{id}]          - Invoices
//! GET  /api/payments                 - Customer payments
//! GET  /api/credit-notes             - Credit notes
//! POST /api/checkout                 - Place order
//!
//! # Machine callers
//! GET|POST /api/sync/stock           - Run stock sync (CRON_SECRET)
//! GET  /api/sync/status              - Last sync report (CRON_SECRET)
//! POST /api/webhooks/zoho            - Zoho webhook (ZOHO_WEBHOOK_SECRET)
//! ```

pub mod account;
pub mod auth;
pub mod checkout;
pub mod health;
pub mod mobile;
pub mod products;
pub mod sync;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Deserialize;

use crate::middleware::{api_rate_limiter, login_rate_limiter};
use crate::state::AppState;

/// `?secret=` for callers that cannot set headers.
#[derive(Debug, Default, Deserialize)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

/// Create the browser auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/request", post(auth::request))
        .route("/verify", post(auth::verify))
        .route("/magic", get(auth::magic))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
}

/// Create the mobile auth routes router.
pub fn mobile_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/request-otp", post(mobile::request_otp))
        .route("/verify-otp", post(mobile::verify_otp))
        .route("/refresh", post(mobile::refresh))
        .route("/logout", post(mobile::logout))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
        .route("/{id}/image", get(products::image))
}

/// Create the customer account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/account", get(account::dashboard))
        .route("/orders", get(account::orders))
        .route("/orders/{id}", get(account::order))
        .route("/invoices", get(account::invoices))
        .route("/invoices/{id}", get(account::invoice))
        .route("/payments", get(account::payments))
        .route("/credit-notes", get(account::credit_notes))
        .route("/checkout", post(checkout::place_order))
}

/// Create the cron and webhook routes router.
pub fn machine_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/stock", get(sync::trigger).post(sync::trigger))
        .route("/sync/status", get(sync::status))
        .route("/webhooks/zoho", post(webhooks::zoho))
}

/// Create all routes for the portal.
///
/// Login endpoints share a tight per-IP limit; browsing and account reads
/// a looser one. Cron and webhook callers are authenticated by secret and
/// not rate limited.
pub fn routes() -> Router<AppState> {
    let login = Router::new()
        .nest("/auth", auth_routes())
        .nest("/mobile/auth", mobile_auth_routes())
        .layer(login_rate_limiter());

    let browse = Router::new()
        .nest("/products", product_routes())
        .merge(account_routes())
        .layer(api_rate_limiter());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", login.merge(browse).merge(machine_routes()))
}
