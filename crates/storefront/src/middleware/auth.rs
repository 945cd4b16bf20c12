//! Authentication extractors.
//!
//! Browser clients authenticate with the session cookie; the mobile app
//! sends `Authorization: Bearer <access token>`. Both resolve to the same
//! [`CurrentCustomer`], so account routes serve either client.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tower_sessions::Session;

use crate::error::{AppError, set_sentry_user};
use crate::models::{CurrentCustomer, session_keys};
use crate::state::AppState;

/// Extractor that requires an authenticated customer.
///
/// Rejects with `401` and the standard error envelope.
///
/// # Example
///
/// ```rust,ignore
/// async fn orders(
///     AuthenticatedCustomer(customer): AuthenticatedCustomer,
/// ) -> impl IntoResponse {
///     format!("Orders for {}", customer.id)
/// }
/// ```
pub struct AuthenticatedCustomer(pub CurrentCustomer);

/// Extractor that optionally gets the current customer.
///
/// Unlike [`AuthenticatedCustomer`], an invalid or missing credential
/// yields `None` and the request proceeds as a guest.
pub struct OptionalCustomer(pub Option<CurrentCustomer>);

/// Token from an `Authorization: Bearer` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn session_customer(parts: &Parts) -> Option<CurrentCustomer> {
    let session = parts.extensions.get::<Session>()?;
    match session
        .get::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
        .await
    {
        Ok(customer) => customer,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read customer from session");
            None
        }
    }
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<CurrentCustomer>, AppError> {
    if let Some(customer) = session_customer(parts).await {
        return Ok(Some(customer));
    }

    match bearer_token(&parts.headers) {
        Some(token) => Ok(Some(state.auth().jwt().verify_access(token)?)),
        None => Ok(None),
    }
}

impl<S> FromRequestParts<S> for AuthenticatedCustomer
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let customer = resolve(parts, &state)
            .await?
            .ok_or_else(|| AppError::Unauthorized("no session or bearer token".to_string()))?;

        set_sentry_user(&customer.id, None);
        Ok(Self(customer))
    }
}

impl<S> FromRequestParts<S> for OptionalCustomer
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let customer = match resolve(parts, &state).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid credential");
                None
            }
        };
        Ok(Self(customer))
    }
}

/// Helper to set the current customer in the session.
///
/// The session id is cycled first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_customer(
    session: &Session,
    customer: &CurrentCustomer,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session
        .insert(session_keys::CURRENT_CUSTOMER, customer)
        .await
}

/// Helper to end the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be deleted.
pub async fn clear_current_customer(
    session: &Session,
) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
