//! Stock sync commands.
//!
//! # Usage
//!
//! ```bash
//! tsh-cli sync stock
//! tsh-cli sync status
//! ```

use serde_json::json;
use tsh_storefront::catalog::sync::SyncOutcome;
use tsh_storefront::state::AppState;

/// Run a sync and print its report.
///
/// # Errors
///
/// Returns an error if the sync fails or the report cannot be printed.
pub async fn stock(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    if state.kv().ping().await.is_err() {
        tracing::warn!("Key-value store unreachable; the sync will fail to take its lock");
    }

    let outcome = state.sync().run().await?;
    if let SyncOutcome::Skipped { holder } = &outcome {
        tracing::warn!(holder = ?holder, "Another sync is running");
    }
    super::print_json(&outcome)?;
    Ok(())
}

/// Print the last report and the current lock holder.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn status(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    let holder = state.sync().lock_holder().await?;
    let last = state.sync().last_report().await?;

    if last.is_none() {
        tracing::info!("No sync has been recorded yet");
    }
    super::print_json(&json!({
        "running": holder.is_some(),
        "holder": holder,
        "last": last,
    }))?;
    Ok(())
}
