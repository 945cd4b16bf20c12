//! Zoho connectivity check.

use tsh_storefront::state::AppState;

/// Refresh a token and read one item to prove organization access.
///
/// # Errors
///
/// Returns the Zoho error that stopped the check.
pub async fn check(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    let zoho = state.zoho();
    let config = zoho.config();
    tracing::info!(organization_id = %config.organization_id, "Checking Zoho access");

    zoho.access_token().await?;
    tracing::info!("OAuth refresh succeeded");

    let page = zoho.list_items(1, 1).await?;
    tracing::info!(items = page.items.len(), has_more = page.has_more, "Inventory reachable");

    let default_list = state
        .catalog()
        .pricing()
        .price_list(&config.default_price_list_id)
        .await?;

    super::print_json(&serde_json::json!({
        "ok": true,
        "organization_id": config.organization_id,
        "default_price_list": {
            "id": default_list.id,
            "name": default_list.name,
            "currency": default_list.currency,
            "rates": default_list.rates.len(),
        },
    }))?;
    Ok(())
}
