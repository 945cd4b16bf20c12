//! Mobile app authentication.
//!
//! Same code flow as the browser, without magic links, ending in a JWT
//! pair instead of a cookie.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequestLocale;
use crate::models::CurrentCustomer;
use crate::routes::auth::{LoginRequest, LoginRequested, VerifyRequest};
use crate::services::auth::{LoginChannel, TokenPair};
use crate::state::AppState;

/// Refresh or logout body.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Tokens plus the customer they belong to.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub customer: CurrentCustomer,
}

/// Send a login code.
pub async fn request_otp(
    State(state): State<AppState>,
    RequestLocale(locale): RequestLocale,
    Json(body): Json<LoginRequest>,
) -> Result<(StatusCode, Json<LoginRequested>)> {
    state
        .auth()
        .request_login(&body.email, locale, LoginChannel::Mobile)
        .await?;

    add_breadcrumb("auth", "Login code requested", &[("channel", "mobile")]);
    Ok((StatusCode::ACCEPTED, Json(LoginRequested::new())))
}

/// Verify a login code and issue tokens.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<TokenResponse>> {
    let customer = state.auth().verify_code(&body.email, &body.code).await?;
    let tokens = state.auth().issue_tokens(&customer).await?;

    tracing::info!(customer_id = %customer.id, "Mobile sign-in");
    Ok(Json(TokenResponse { tokens, customer }))
}

/// Rotate a refresh token.
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>> {
    let (customer, tokens) = state.auth().jwt().refresh(&body.refresh_token).await?;
    Ok(Json(TokenResponse { tokens, customer }))
}

/// Revoke a refresh token.
pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<StatusCode> {
    state.auth().jwt().revoke(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
