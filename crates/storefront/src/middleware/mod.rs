//! HTTP middleware stack for the portal API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction per route)
//! 2. `TraceLayer` (request span with an empty `request_id` field)
//! 3. Request ID (accept or mint `x-request-id`, fill the span field)
//! 4. Security headers (CSP, HSTS, `no-store` default)
//! 5. Session layer (tower-sessions over the key-value store)
//! 6. Rate limiting (governor, per route group)

pub mod auth;
pub mod locale;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    AuthenticatedCustomer, OptionalCustomer, bearer_token, clear_current_customer,
    set_current_customer,
};
pub use locale::RequestLocale;
pub use rate_limit::{api_rate_limiter, login_rate_limiter};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
