//! Customer account handlers.
//!
//! Every handler is scoped to the authenticated customer; documents of
//! other customers answer 404.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tsh_core::{InvoiceId, SalesOrderId};

use crate::error::Result;
use crate::middleware::AuthenticatedCustomer;
use crate::services::portal::Dashboard;
use crate::state::AppState;
use crate::zoho::{CreditNote, CustomerPayment, Invoice, Page, SalesOrder};

/// Pagination query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

/// Account dashboard: profile, balance, recent orders, unpaid invoices.
pub async fn dashboard(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
) -> Result<Json<Dashboard>> {
    Ok(Json(state.portal().dashboard(&customer.id).await?))
}

pub async fn orders(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<SalesOrder>>> {
    Ok(Json(state.portal().orders(&customer.id, query.page()).await?))
}

pub async fn order(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    Path(id): Path<SalesOrderId>,
) -> Result<Json<SalesOrder>> {
    Ok(Json(state.portal().order(&customer.id, &id).await?))
}

pub async fn invoices(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Invoice>>> {
    Ok(Json(state.portal().invoices(&customer.id, query.page()).await?))
}

pub async fn invoice(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    Path(id): Path<InvoiceId>,
) -> Result<Json<Invoice>> {
    Ok(Json(state.portal().invoice(&customer.id, &id).await?))
}

pub async fn payments(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<CustomerPayment>>> {
    Ok(Json(state.portal().payments(&customer.id, query.page()).await?))
}

pub async fn credit_notes(
    State(state): State<AppState>,
    AuthenticatedCustomer(customer): AuthenticatedCustomer,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<CreditNote>>> {
    Ok(Json(
        state
            .portal()
            .credit_notes(&customer.id, query.page())
            .await?,
    ))
}
