//! Checkout: turn a cart into a confirmed, invoiced sales order.
//!
//! Zoho has no transaction spanning documents, so an order is placed as a
//! chain of three calls (create, confirm, invoice). A failure after the
//! order exists is reported with the order id and the failed step; the
//! back office finishes or voids it by hand.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use tsh_core::{CurrencyCode, CustomerId, InvoiceId, ItemId, Money, SalesOrderId};

use crate::cache::{CacheLayer, keys};
use crate::catalog::CatalogService;
use crate::catalog::pricing::PriceSource;
use crate::zoho::{CreateSalesOrder, NewLineItem, ZohoClient, ZohoError};

/// Most lines accepted in one order.
pub const MAX_LINES: usize = 100;

/// Remote step that failed after the order was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    Confirm,
    Invoice,
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirm => f.write_str("confirm"),
            Self::Invoice => f.write_str("invoice"),
        }
    }
}

/// A line the warehouse cannot cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shortage {
    pub item_id: ItemId,
    pub requested: u32,
    pub available: f64,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("quantity for item {0} must be positive")]
    InvalidQuantity(ItemId),

    #[error("cart has {0} lines, at most {MAX_LINES} allowed")]
    TooManyLines(usize),

    #[error("items not in the catalog: {0:?}")]
    UnknownItems(Vec<ItemId>),

    #[error("items without a price: {0:?}")]
    Unpriced(Vec<ItemId>),

    #[error("insufficient stock for {} item(s)", .0.len())]
    InsufficientStock(Vec<Shortage>),

    /// Nothing was created.
    #[error("Zoho error: {0}")]
    Zoho(#[from] ZohoError),

    /// The order exists but a later step failed.
    #[error("sales order {salesorder_id} created but {step} failed: {source}")]
    Incomplete {
        step: CheckoutStep,
        salesorder_id: SalesOrderId,
        #[source]
        source: ZohoError,
    },
}

/// One cart line as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CartLine {
    pub item_id: ItemId,
    pub quantity: u32,
}

/// Checkout request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A priced order line.
#[derive(Debug, Clone, Serialize)]
pub struct PricedLine {
    pub item_id: ItemId,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub price_source: PriceSource,
}

/// Result of a completed checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub salesorder_id: SalesOrderId,
    pub salesorder_number: String,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub lines: Vec<PricedLine>,
    pub total: Money,
}

/// Check line count and quantities and merge repeated items, keeping the
/// order in which items first appear.
///
/// # Errors
///
/// Returns the first validation failure.
pub fn validate_cart(lines: &[CartLine]) -> Result<Vec<CartLine>, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    let mut index: HashMap<&ItemId, usize> = HashMap::new();
    for line in lines {
        if line.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(line.item_id.clone()));
        }
        match index.get(&line.item_id) {
            Some(&i) => {
                merged[i].quantity = merged[i].quantity.saturating_add(line.quantity);
            }
            None => {
                index.insert(&line.item_id, merged.len());
                merged.push(line.clone());
            }
        }
    }

    if merged.len() > MAX_LINES {
        return Err(CheckoutError::TooManyLines(merged.len()));
    }
    Ok(merged)
}

/// Lines that ask for more than is available.
#[must_use]
pub fn find_shortages(lines: &[CartLine], stock: &HashMap<ItemId, f64>) -> Vec<Shortage> {
    lines
        .iter()
        .filter_map(|line| {
            let available = stock.get(&line.item_id).copied().unwrap_or_default();
            (available < f64::from(line.quantity)).then(|| Shortage {
                item_id: line.item_id.clone(),
                requested: line.quantity,
                available,
            })
        })
        .collect()
}

/// Places orders.
#[derive(Clone)]
pub struct CheckoutService {
    zoho: ZohoClient,
    catalog: CatalogService,
    cache: CacheLayer,
}

impl CheckoutService {
    #[must_use]
    pub fn new(zoho: ZohoClient, catalog: CatalogService, cache: CacheLayer) -> Self {
        Self {
            zoho,
            catalog,
            cache,
        }
    }

    /// Validate, price and place an order for `customer_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error before anything is sent to Zoho,
    /// `CheckoutError::Zoho` when the order could not be created and
    /// `CheckoutError::Incomplete` when it was created but not finished.
    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn place_order(
        &self,
        customer_id: &CustomerId,
        request: &CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let lines = validate_cart(&request.lines)?;
        let ids: Vec<ItemId> = lines.iter().map(|l| l.item_id.clone()).collect();

        let entries = self.catalog.entries().await?;
        let entries: HashMap<&ItemId, _> = entries.iter().map(|e| (&e.item_id, e)).collect();
        let unknown: Vec<ItemId> = ids
            .iter()
            .filter(|id| !entries.contains_key(id))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(CheckoutError::UnknownItems(unknown));
        }

        let (stock, prices) = self.catalog.quote(&ids, customer_id).await?;

        let shortages = find_shortages(&lines, &stock);
        if !shortages.is_empty() {
            info!(short = shortages.len(), "Checkout refused for insufficient stock");
            return Err(CheckoutError::InsufficientStock(shortages));
        }

        // One order, one currency: the list the order is placed against
        let currency = prices
            .customer
            .as_ref()
            .map_or(&prices.default.currency, |list| &list.currency)
            .clone();

        let mut priced = Vec::with_capacity(lines.len());
        let mut unpriced = Vec::new();
        for line in &lines {
            let Some(entry) = entries.get(&line.item_id) else {
                continue;
            };
            match prices.price_for(&line.item_id, Some(entry.rate)) {
                Some((unit_price, source)) if unit_price.currency == currency => {
                    priced.push(PricedLine {
                        item_id: line.item_id.clone(),
                        name: entry.name.clone(),
                        sku: entry.sku.clone(),
                        quantity: line.quantity,
                        line_total: unit_price.times(line.quantity),
                        unit_price,
                        price_source: source,
                    });
                }
                _ => unpriced.push(line.item_id.clone()),
            }
        }
        if !unpriced.is_empty() {
            return Err(CheckoutError::Unpriced(unpriced));
        }

        let total = order_total(&priced, currency);
        let warehouse_id = self.catalog.stock().warehouse_id().to_string();
        let order = CreateSalesOrder {
            customer_id: customer_id.clone(),
            date: chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            reference_number: request.reference.clone(),
            pricebook_id: Some(prices.effective_list_id().clone()),
            notes: request.notes.clone(),
            line_items: priced
                .iter()
                .map(|line| NewLineItem {
                    item_id: line.item_id.clone(),
                    quantity: line.quantity,
                    rate: line.unit_price.amount,
                    location_id: Some(warehouse_id.clone()),
                })
                .collect(),
        };

        let sales_order = self.zoho.create_sales_order(&order).await?;
        let salesorder_id = sales_order.salesorder_id.clone();
        info!(salesorder_id = %salesorder_id, "Sales order created");

        // From here on the order exists; refresh what the customer sees
        // whatever happens next.
        let result = self.finish(&salesorder_id).await;
        self.after_order(customer_id, &lines).await;

        let invoice = result.inspect_err(|e| error!(error = %e, "Checkout left incomplete"))?;

        info!(
            salesorder_id = %salesorder_id,
            invoice_id = %invoice.invoice_id,
            "Checkout completed"
        );
        Ok(CheckoutReceipt {
            salesorder_id,
            salesorder_number: sales_order.salesorder_number,
            invoice_id: invoice.invoice_id,
            invoice_number: invoice.invoice_number,
            lines: priced,
            total,
        })
    }

    /// Confirm the order and invoice it.
    async fn finish(
        &self,
        salesorder_id: &SalesOrderId,
    ) -> Result<crate::zoho::Invoice, CheckoutError> {
        self.zoho
            .confirm_sales_order(salesorder_id)
            .await
            .map_err(|source| CheckoutError::Incomplete {
                step: CheckoutStep::Confirm,
                salesorder_id: salesorder_id.clone(),
                source,
            })?;

        self.zoho
            .create_invoice_from_sales_order(salesorder_id)
            .await
            .map_err(|source| CheckoutError::Incomplete {
                step: CheckoutStep::Invoice,
                salesorder_id: salesorder_id.clone(),
                source,
            })
    }

    async fn after_order(&self, customer_id: &CustomerId, lines: &[CartLine]) {
        let mut tags = keys::tags::customer_documents(customer_id);
        // Outstanding balance on the profile changed too
        tags.push(keys::tags::customer(customer_id));
        if let Err(e) = self.cache.invalidate_tags(&tags).await {
            warn!(error = %e, "Failed to invalidate customer documents after checkout");
        }

        let ordered: Vec<(ItemId, f64)> = lines
            .iter()
            .map(|line| (line.item_id.clone(), f64::from(line.quantity)))
            .collect();
        self.catalog.stock().decrement(&ordered).await;
    }
}

fn order_total(lines: &[PricedLine], currency: CurrencyCode) -> Money {
    let amount = lines
        .iter()
        .map(|line| line.line_total.amount)
        .sum::<Decimal>();
    Money::new(amount, currency)
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService").finish_non_exhaustive()
    }
}
