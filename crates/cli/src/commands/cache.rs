//! Cache maintenance commands.

use tsh_storefront::state::AppState;

/// Invalidate cache tags.
///
/// # Errors
///
/// Returns an error if the store rejects a read or delete.
pub async fn invalidate(state: &AppState, tags: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let removed = state.cache().invalidate_tags(tags).await?;
    tracing::info!(removed, tags = ?tags, "Cache tags invalidated");
    super::print_json(&serde_json::json!({ "tags": tags, "removed": removed }))?;
    Ok(())
}
