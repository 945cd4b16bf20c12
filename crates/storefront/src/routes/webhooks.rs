//! Zoho webhook receiver.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
};

use super::SecretQuery;
use crate::error::Result;
use crate::services::webhooks::WebhookOutcome;
use crate::state::AppState;

/// Header Zoho is configured to send the shared secret in.
pub const WEBHOOK_SECRET_HEADER: &str = "x-zoho-webhook-secret";

/// Receive one delivery. Duplicates and unhandled modules are
/// acknowledged with `200` so Zoho stops retrying.
pub async fn zoho(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
    body: Bytes,
) -> Result<Json<WebhookOutcome>> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query.secret.as_deref());
    state.webhooks().verify_secret(provided)?;

    let outcome = state.webhooks().handle(&body).await?;
    tracing::info!(
        status = ?outcome.status,
        kind = ?outcome.kind,
        entity_id = ?outcome.entity_id,
        invalidated = outcome.invalidated,
        "Webhook handled"
    );
    Ok(Json(outcome))
}
