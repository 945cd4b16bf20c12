//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as
//!
//! ```json
//! {"error": {"code": "insufficient_stock",
//!            "message": {"en": "...", "ar": "..."},
//!            "details": {...}}}
//! ```
//!
//! Server-side failures are captured to Sentry and never expose internals.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tsh_core::Bilingual;

use crate::catalog::sync::SyncError;
use crate::kv::KvError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::webhooks::WebhookError;
use crate::zoho::ZohoError;

/// Application-level error type for the portal.
#[derive(Debug, Error)]
pub enum AppError {
    /// Zoho call failed.
    #[error("Zoho error: {0}")]
    Zoho(#[from] ZohoError),

    /// Key-value store failed.
    #[error("Key-value store error: {0}")]
    Kv(#[from] KvError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Checkout failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Webhook rejected or failed.
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Stock sync failed.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Session could not be read or written.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Customer is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// What the client sees.
struct Rendered {
    status: StatusCode,
    code: &'static str,
    message: Bilingual,
    details: Option<Value>,
}

impl Rendered {
    fn new(status: StatusCode, code: &'static str, en: &str, ar: &str) -> Self {
        Self {
            status,
            code,
            message: Bilingual::new(en, ar),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn internal() -> Rendered {
    Rendered::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Something went wrong. Please try again.",
        "حدث خطأ ما. يرجى المحاولة مرة أخرى.",
    )
}

fn upstream() -> Rendered {
    Rendered::new(
        StatusCode::BAD_GATEWAY,
        "upstream_error",
        "Our inventory system is not responding. Please try again shortly.",
        "نظام المخزون لا يستجيب حالياً. يرجى المحاولة بعد قليل.",
    )
}

fn not_found() -> Rendered {
    Rendered::new(
        StatusCode::NOT_FOUND,
        "not_found",
        "The requested item was not found.",
        "العنصر المطلوب غير موجود.",
    )
}

fn unauthorized() -> Rendered {
    Rendered::new(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Please sign in to continue.",
        "يرجى تسجيل الدخول للمتابعة.",
    )
}

fn rate_limited() -> Rendered {
    Rendered::new(
        StatusCode::TOO_MANY_REQUESTS,
        "rate_limited",
        "Too many requests. Please wait a few minutes and try again.",
        "طلبات كثيرة جداً. يرجى الانتظار بضع دقائق ثم المحاولة مرة أخرى.",
    )
}

fn bad_request() -> Rendered {
    Rendered::new(
        StatusCode::BAD_REQUEST,
        "bad_request",
        "The request is invalid.",
        "الطلب غير صالح.",
    )
}

fn render_zoho(err: &ZohoError) -> Rendered {
    match err {
        ZohoError::NotFound(_) => not_found(),
        _ => upstream(),
    }
}

fn render_auth(err: &AuthError) -> Rendered {
    match err {
        AuthError::InvalidEmail(_) => Rendered::new(
            StatusCode::BAD_REQUEST,
            "invalid_email",
            "Please enter a valid email address.",
            "يرجى إدخال بريد إلكتروني صحيح.",
        ),
        AuthError::UnknownCustomer => Rendered::new(
            StatusCode::NOT_FOUND,
            "unknown_customer",
            "No customer account uses this email. Contact your TSH sales representative.",
            "لا يوجد حساب عميل بهذا البريد الإلكتروني. تواصل مع مندوب مبيعات TSH.",
        ),
        AuthError::InvalidCode => Rendered::new(
            StatusCode::UNAUTHORIZED,
            "invalid_code",
            "The code is wrong or has expired.",
            "الرمز غير صحيح أو منتهي الصلاحية.",
        ),
        AuthError::TooManyAttempts => Rendered::new(
            StatusCode::TOO_MANY_REQUESTS,
            "too_many_attempts",
            "Too many wrong codes. Please request a new one.",
            "محاولات خاطئة كثيرة. يرجى طلب رمز جديد.",
        ),
        AuthError::RateLimited => rate_limited(),
        AuthError::InvalidToken | AuthError::TokenRevoked => Rendered::new(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Your sign-in link or session has expired. Please sign in again.",
            "انتهت صلاحية رابط الدخول أو الجلسة. يرجى تسجيل الدخول مرة أخرى.",
        ),
        AuthError::InactiveCustomer => Rendered::new(
            StatusCode::FORBIDDEN,
            "inactive_customer",
            "This customer account is inactive.",
            "حساب العميل هذا غير نشط.",
        ),
        AuthError::Zoho(e) => render_zoho(e),
        AuthError::Email(_) => Rendered::new(
            StatusCode::BAD_GATEWAY,
            "email_failed",
            "We could not send the email. Please try again.",
            "تعذر إرسال البريد الإلكتروني. يرجى المحاولة مرة أخرى.",
        ),
        AuthError::Kv(_) | AuthError::Signing(_) | AuthError::Session(_) => internal(),
    }
}

fn render_checkout(err: &CheckoutError) -> Rendered {
    match err {
        CheckoutError::EmptyCart => Rendered::new(
            StatusCode::BAD_REQUEST,
            "empty_cart",
            "Your cart is empty.",
            "سلة التسوق فارغة.",
        ),
        CheckoutError::InvalidQuantity(item_id) => Rendered::new(
            StatusCode::BAD_REQUEST,
            "invalid_quantity",
            "Quantities must be at least 1.",
            "يجب أن تكون الكميات 1 على الأقل.",
        )
        .with_details(json!({ "item_id": item_id })),
        CheckoutError::TooManyLines(lines) => Rendered::new(
            StatusCode::BAD_REQUEST,
            "too_many_lines",
            "An order can have at most 100 different items.",
            "يمكن أن يحتوي الطلب على 100 صنف مختلف كحد أقصى.",
        )
        .with_details(json!({ "lines": lines })),
        CheckoutError::UnknownItems(items) => Rendered::new(
            StatusCode::BAD_REQUEST,
            "unknown_items",
            "Some items are no longer available.",
            "بعض الأصناف لم تعد متوفرة.",
        )
        .with_details(json!({ "items": items })),
        CheckoutError::Unpriced(items) => Rendered::new(
            StatusCode::BAD_REQUEST,
            "unpriced_items",
            "Some items have no price on your price list.",
            "بعض الأصناف ليس لها سعر في قائمة أسعارك.",
        )
        .with_details(json!({ "items": items })),
        CheckoutError::InsufficientStock(shortages) => Rendered::new(
            StatusCode::CONFLICT,
            "insufficient_stock",
            "Some items do not have enough stock.",
            "بعض الأصناف لا تتوفر بالكمية المطلوبة.",
        )
        .with_details(json!({ "items": shortages })),
        CheckoutError::Zoho(e) => render_zoho(e),
        CheckoutError::Incomplete {
            step,
            salesorder_id,
            ..
        } => Rendered::new(
            StatusCode::BAD_GATEWAY,
            "order_incomplete",
            "Your order was received but could not be completed. Our team will follow up.",
            "تم استلام طلبك لكن تعذر إكماله. سيتواصل معك فريقنا.",
        )
        .with_details(json!({ "step": step, "salesorder_id": salesorder_id })),
    }
}

fn render_webhook(err: &WebhookError) -> Rendered {
    match err {
        WebhookError::NotConfigured => not_found(),
        WebhookError::Unauthorized => unauthorized(),
        WebhookError::InvalidPayload(_) => bad_request(),
        WebhookError::Kv(_) | WebhookError::Cache(_) => internal(),
    }
}

impl AppError {
    fn render(&self) -> Rendered {
        match self {
            Self::Zoho(e) => render_zoho(e),
            Self::Auth(e) => render_auth(e),
            Self::Checkout(e) => render_checkout(e),
            Self::Webhook(e) => render_webhook(e),
            Self::Sync(SyncError::Zoho(e)) => render_zoho(e),
            Self::Sync(_) | Self::Kv(_) | Self::Session(_) | Self::Internal(_) => internal(),
            Self::NotFound(_) => not_found(),
            Self::Unauthorized(_) => unauthorized(),
        }
    }

    /// Seconds Zoho asked us to wait, wherever the rate limit surfaced.
    ///
    /// A partially completed checkout is left out: retrying it would place
    /// a second order.
    fn upstream_retry_after(&self) -> Option<u64> {
        let zoho = match self {
            Self::Zoho(e)
            | Self::Auth(AuthError::Zoho(e))
            | Self::Checkout(CheckoutError::Zoho(e))
            | Self::Sync(SyncError::Zoho(e)) => e,
            _ => return None,
        };
        match zoho {
            ZohoError::RateLimited(secs) => Some(*secs),
            _ => None,
        }
    }

    /// HTTP status this error renders with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.render().status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let rendered = self.render();

        // Capture server errors to Sentry
        if rendered.status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                status = rendered.status.as_u16(),
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = rendered.status.as_u16(), "Request rejected");
        }

        let mut error = json!({
            "code": rendered.code,
            "message": rendered.message,
        });
        if let Some(details) = rendered.details {
            error["details"] = details;
        }

        let mut response = (rendered.status, Json(json!({ "error": error }))).into_response();
        if let Some(secs) = self.upstream_retry_after() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context after a customer is identified.
pub fn set_sentry_user(customer_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(customer_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context on logout.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for customer actions.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb
            .data
            .insert((*key).to_string(), Value::String((*value).to_string()));
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use tsh_core::{ItemId, SalesOrderId};

    use super::*;
    use crate::services::checkout::{CheckoutStep, Shortage};

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn body(err: AppError) -> Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Auth(AuthError::RateLimited)),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Zoho(ZohoError::Parse("bad".to_string()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Zoho(ZohoError::NotFound("item".to_string()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Kv(KvError::Command("down".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Auth(AuthError::InvalidCode)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Auth(AuthError::InactiveCustomer)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::Webhook(WebhookError::Unauthorized)),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_envelope_is_bilingual() {
        let json = body(AppError::Auth(AuthError::InvalidCode)).await;
        assert_eq!(json["error"]["code"], "invalid_code");
        assert!(json["error"]["message"]["en"].as_str().unwrap().contains("code"));
        assert!(!json["error"]["message"]["ar"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let json = body(AppError::Internal("password=hunter2".to_string())).await;
        assert!(!json.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_stock_conflict_lists_items() {
        let err = AppError::Checkout(CheckoutError::InsufficientStock(vec![Shortage {
            item_id: ItemId::new("9001"),
            requested: 5,
            available: 2.0,
        }]));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let json = body(err).await;
        assert_eq!(json["error"]["code"], "insufficient_stock");
        assert_eq!(json["error"]["details"]["items"][0]["item_id"], "9001");
        assert_eq!(json["error"]["details"]["items"][0]["available"], 2.0);
    }

    #[tokio::test]
    async fn test_incomplete_checkout_names_order() {
        let err = AppError::Checkout(CheckoutError::Incomplete {
            step: CheckoutStep::Confirm,
            salesorder_id: SalesOrderId::new("SO-77"),
            source: ZohoError::Parse("timeout".to_string()),
        });
        let json = body(err).await;
        assert_eq!(json["error"]["details"]["step"], "confirm");
        assert_eq!(json["error"]["details"]["salesorder_id"], "SO-77");
    }

    #[tokio::test]
    async fn test_upstream_rate_limit_sets_retry_after() {
        let response = AppError::Zoho(ZohoError::RateLimited(30)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn test_wrapped_rate_limit_sets_retry_after() {
        let wrapped = [
            AppError::Checkout(CheckoutError::Zoho(ZohoError::RateLimited(12))),
            AppError::Auth(AuthError::Zoho(ZohoError::RateLimited(12))),
            AppError::Sync(SyncError::Zoho(ZohoError::RateLimited(12))),
        ];
        for err in wrapped {
            let response = err.into_response();
            assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "12");
        }
    }

    #[test]
    fn test_incomplete_checkout_has_no_retry_after() {
        let response = AppError::Checkout(CheckoutError::Incomplete {
            step: CheckoutStep::Invoice,
            salesorder_id: SalesOrderId::new("SO-78"),
            source: ZohoError::RateLimited(12),
        })
        .into_response();
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
