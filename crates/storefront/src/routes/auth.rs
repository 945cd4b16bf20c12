//! Browser authentication handlers.
//!
//! Login is passwordless: the customer asks for a code, then either types
//! the 6-digit code or follows the magic link from the same email. Both
//! end in a cookie session.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tsh_core::{Bilingual, Locale};

use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{
    AuthenticatedCustomer, RequestLocale, clear_current_customer, set_current_customer,
};
use crate::models::CurrentCustomer;
use crate::services::auth::{CODE_TTL, LoginChannel};
use crate::state::AppState;

/// Where a browser lands after following a magic link.
const AFTER_LOGIN_PATH: &str = "/account";

/// Where a browser lands when the link is invalid.
const LINK_FAILED_PATH: &str = "/login?error=link_expired";

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

/// Code verification body.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

/// Magic link query.
#[derive(Debug, Deserialize)]
pub struct MagicQuery {
    pub token: String,
}

/// Acknowledgement of a login request.
#[derive(Debug, Serialize)]
pub struct LoginRequested {
    pub sent: bool,
    pub expires_in: u64,
    pub message: Bilingual,
}

impl LoginRequested {
    pub(crate) fn new() -> Self {
        Self {
            sent: true,
            expires_in: CODE_TTL.as_secs(),
            message: Bilingual::new(
                "We sent a sign-in code to your email.",
                "أرسلنا رمز تسجيل الدخول إلى بريدك الإلكتروني.",
            ),
        }
    }
}

/// The signed-in customer.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub customer: CurrentCustomer,
    pub locale: Locale,
}

/// Send a login code and magic link.
pub async fn request(
    State(state): State<AppState>,
    RequestLocale(locale): RequestLocale,
    Json(body): Json<LoginRequest>,
) -> Result<(StatusCode, Json<LoginRequested>)> {
    state
        .auth()
        .request_login(&body.email, locale, LoginChannel::Web)
        .await?;

    add_breadcrumb("auth", "Login code requested", &[("channel", "web")]);
    Ok((StatusCode::ACCEPTED, Json(LoginRequested::new())))
}

/// Verify a login code and start a session.
pub async fn verify(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<CurrentCustomer>> {
    let customer = state.auth().verify_code(&body.email, &body.code).await?;
    set_current_customer(&session, &customer).await?;

    set_sentry_user(&customer.id, None);
    tracing::info!(customer_id = %customer.id, "Customer signed in with code");
    Ok(Json(customer))
}

/// Consume a magic link and start a session.
///
/// Browsers follow this link from email, so both outcomes redirect.
pub async fn magic(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<MagicQuery>,
) -> Response {
    let customer = match state.auth().consume_magic_link(&query.token).await {
        Ok(customer) => customer,
        Err(e) => {
            tracing::warn!(error = %e, "Magic link rejected");
            return Redirect::to(LINK_FAILED_PATH).into_response();
        }
    };

    if let Err(e) = set_current_customer(&session, &customer).await {
        tracing::error!(error = %e, "Failed to set session");
        return Redirect::to(LINK_FAILED_PATH).into_response();
    }

    set_sentry_user(&customer.id, None);
    tracing::info!(customer_id = %customer.id, "Customer signed in with magic link");
    Redirect::to(AFTER_LOGIN_PATH).into_response()
}

/// Current customer.
pub async fn me(
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    RequestLocale(locale): RequestLocale,
) -> Json<MeResponse> {
    Json(MeResponse { customer, locale })
}

/// End the session.
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_customer(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}
