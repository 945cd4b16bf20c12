//! Stock sync trigger for cron.
//!
//! The cron caller proves itself with `CRON_SECRET`, either as `?secret=`
//! or as a Bearer token. Without a configured secret these routes are off.

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use serde::Serialize;

use super::SecretQuery;
use crate::catalog::sync::{SyncOutcome, SyncReport};
use crate::error::{AppError, Result};
use crate::middleware::bearer_token;
use crate::services::auth::otp::constant_time_eq;
use crate::state::AppState;

/// Sync state for monitoring.
#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub running: bool,
    pub holder: Option<String>,
    pub last: Option<SyncReport>,
}

fn authorize(state: &AppState, headers: &HeaderMap, query: &SecretQuery) -> Result<()> {
    use secrecy::ExposeSecret;

    let expected = state
        .config()
        .cron_secret
        .as_ref()
        .ok_or_else(|| AppError::NotFound("sync trigger disabled".to_string()))?;

    let provided = query.secret.as_deref().or_else(|| bearer_token(headers));
    match provided {
        Some(provided) if constant_time_eq(provided, expected.expose_secret()) => Ok(()),
        _ => Err(AppError::Unauthorized("bad cron secret".to_string())),
    }
}

/// Run a stock sync now. Answers `skipped` when one is already running.
pub async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<Json<SyncOutcome>> {
    authorize(&state, &headers, &query)?;
    Ok(Json(state.sync().run().await?))
}

/// Last report and lock holder.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
) -> Result<Json<SyncStatusResponse>> {
    authorize(&state, &headers, &query)?;

    let (holder, last) = tokio::join!(state.sync().lock_holder(), state.sync().last_report());
    let holder = holder?;
    Ok(Json(SyncStatusResponse {
        running: holder.is_some(),
        holder,
        last: last?,
    }))
}
