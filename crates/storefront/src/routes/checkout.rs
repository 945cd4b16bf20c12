//! Checkout handler.

use axum::{Json, extract::State, http::StatusCode};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::AuthenticatedCustomer;
use crate::services::checkout::{CheckoutReceipt, CheckoutRequest};
use crate::state::AppState;

/// Place an order: sales order, confirmation and invoice.
pub async fn place_order(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>)> {
    let receipt = state.checkout().place_order(&customer.id, &request).await?;

    add_breadcrumb(
        "checkout",
        "Order placed",
        &[
            ("salesorder_id", receipt.salesorder_id.as_str()),
            ("invoice_id", receipt.invoice_id.as_str()),
        ],
    );
    Ok((StatusCode::CREATED, Json(receipt)))
}
