//! Zoho wire types.
//!
//! Only the fields the portal reads are modelled. Everything else in the
//! payload is ignored, and every optional field defaults so that Books,
//! Inventory and webhook variants of the same entity all deserialize.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tsh_core::{
    CreditNoteId, CustomerId, InvoiceId, InvoiceStatus, ItemId, PaymentId, PriceListId,
    SalesOrderId, SalesOrderStatus,
};

use super::serde_helpers::{decimal_or_zero, f64_or_zero, opt_decimal, opt_f64, opt_string};

// =============================================================================
// Pagination
// =============================================================================

/// Zoho's `page_context` block on list responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub has_more_page: bool,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub(super) fn new(items: Vec<T>, page: u32, context: Option<PageContext>) -> Self {
        Self {
            items,
            page,
            has_more: context.is_some_and(|c| c.has_more_page),
        }
    }
}

// =============================================================================
// Contacts
// =============================================================================

/// A customer contact.
///
/// Books names the assigned price list `pricebook_id`, Inventory names it
/// `price_list_id`; both are kept and reconciled by the pricing module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: CustomerId,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub email: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub pricebook_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub price_list_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub currency_code: Option<String>,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub outstanding_receivable_amount: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub unused_credits_receivable_amount: Decimal,
    #[serde(default, deserialize_with = "opt_string")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub contact_persons: Vec<ContactPerson>,
}

impl Contact {
    /// Price list id assigned on this record, whichever field carried it.
    #[must_use]
    pub fn assigned_price_list(&self) -> Option<PriceListId> {
        self.pricebook_id
            .as_deref()
            .or(self.price_list_id.as_deref())
            .map(PriceListId::from)
    }

    /// Inactive contacts may not sign in or order.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("active")
    }

    /// True when the address belongs to the contact or one of its persons.
    #[must_use]
    pub fn has_email(&self, email: &str) -> bool {
        let matches = |candidate: Option<&str>| {
            candidate.is_some_and(|c| c.trim().eq_ignore_ascii_case(email))
        };
        matches(self.email.as_deref())
            || self
                .contact_persons
                .iter()
                .any(|p| matches(p.email.as_deref()))
    }

    /// Name shown in the portal header.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.company_name.trim().is_empty() {
            &self.contact_name
        } else {
            &self.company_name
        }
    }
}

/// A person attached to a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactPerson {
    #[serde(default, deserialize_with = "opt_string")]
    pub contact_person_id: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_primary_contact: bool,
}

/// Contact row from the list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactSummary {
    pub contact_id: CustomerId,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub email: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContactResponse {
    pub contact: Contact,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContactsResponse {
    #[serde(default)]
    pub contacts: Vec<ContactSummary>,
}

// =============================================================================
// Items
// =============================================================================

/// An Inventory item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub category_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub brand: Option<String>,
    /// Base selling rate; only used when no price list covers the item.
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub rate: Decimal,
    #[serde(default, deserialize_with = "opt_string")]
    pub image_document_id: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub available_for_sale_stock: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub actual_available_stock: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub stock_on_hand: Option<f64>,
    /// Per-location stock (multi-location organizations).
    #[serde(default)]
    pub locations: Vec<ItemLocation>,
    /// Per-warehouse stock (older organizations and some webhooks).
    #[serde(default)]
    pub warehouses: Vec<ItemWarehouse>,
}

impl Item {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("active")
    }

    /// True when the payload carries any per-location breakdown.
    #[must_use]
    pub fn has_location_stock(&self) -> bool {
        !self.locations.is_empty() || !self.warehouses.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemLocation {
    #[serde(default, deserialize_with = "opt_string")]
    pub location_id: Option<String>,
    #[serde(default)]
    pub location_name: String,
    #[serde(default, deserialize_with = "opt_f64")]
    pub location_available_for_sale_stock: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub location_stock_on_hand: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemWarehouse {
    #[serde(default, deserialize_with = "opt_string")]
    pub warehouse_id: Option<String>,
    #[serde(default)]
    pub warehouse_name: String,
    #[serde(default, deserialize_with = "opt_f64")]
    pub warehouse_available_for_sale_stock: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub warehouse_stock_on_hand: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ItemResponse {
    pub item: Item,
}

#[derive(Debug, Deserialize)]
pub(super) struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub page_context: Option<PageContext>,
}

// =============================================================================
// Price books
// =============================================================================

/// How a price book derives its rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBookType {
    /// Explicit rate per item.
    #[default]
    PerItem,
    /// Markup or markdown applied to every item's base rate.
    FixedPercentage,
    #[serde(other)]
    Unknown,
}

/// A Books price book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBook {
    #[serde(alias = "price_list_id")]
    pub pricebook_id: PriceListId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub pricebook_type: PriceBookType,
    #[serde(default)]
    pub is_increase: bool,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub percentage: Decimal,
    #[serde(default, alias = "items")]
    pub pricebook_items: Vec<PriceBookItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBookItem {
    pub item_id: ItemId,
    #[serde(default, deserialize_with = "opt_decimal")]
    pub pricebook_rate: Option<Decimal>,
    /// Inventory price lists report the list rate as `rate`.
    #[serde(default, deserialize_with = "opt_decimal")]
    pub rate: Option<Decimal>,
}

impl PriceBookItem {
    #[must_use]
    pub fn list_rate(&self) -> Option<Decimal> {
        self.pricebook_rate.or(self.rate)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct PriceBookResponse {
    #[serde(alias = "price_list")]
    pub pricebook: PriceBook,
}

// =============================================================================
// Sales documents
// =============================================================================

/// A line on a sales order or invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "opt_string")]
    pub line_item_id: Option<String>,
    pub item_id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub rate: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub item_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub salesorder_id: SalesOrderId,
    #[serde(default)]
    pub salesorder_number: String,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status: SalesOrderStatus,
    #[serde(default, deserialize_with = "opt_string")]
    pub reference_number: Option<String>,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub total: Decimal,
    #[serde(default, deserialize_with = "opt_string")]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: InvoiceId,
    #[serde(default)]
    pub invoice_number: String,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub total: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub balance: Decimal,
    #[serde(default, deserialize_with = "opt_string")]
    pub currency_code: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub salesorder_id: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInvoice {
    pub invoice_id: InvoiceId,
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub amount_applied: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerPayment {
    pub payment_id: PaymentId,
    #[serde(default)]
    pub payment_number: String,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub payment_mode: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub reference_number: Option<String>,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "opt_string")]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub invoices: Vec<PaymentInvoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditNote {
    pub creditnote_id: CreditNoteId,
    #[serde(default)]
    pub creditnote_number: String,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub total: Decimal,
    #[serde(default, deserialize_with = "decimal_or_zero")]
    pub balance: Decimal,
    #[serde(default, deserialize_with = "opt_string")]
    pub currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SalesOrderResponse {
    pub salesorder: SalesOrder,
}

#[derive(Debug, Deserialize)]
pub(super) struct SalesOrdersResponse {
    #[serde(default)]
    pub salesorders: Vec<SalesOrder>,
    #[serde(default)]
    pub page_context: Option<PageContext>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InvoiceResponse {
    pub invoice: Invoice,
}

#[derive(Debug, Deserialize)]
pub(super) struct InvoicesResponse {
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    #[serde(default)]
    pub page_context: Option<PageContext>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PaymentsResponse {
    #[serde(default)]
    pub customerpayments: Vec<CustomerPayment>,
    #[serde(default)]
    pub page_context: Option<PageContext>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreditNotesResponse {
    #[serde(default)]
    pub creditnotes: Vec<CreditNote>,
    #[serde(default)]
    pub page_context: Option<PageContext>,
}

// =============================================================================
// Requests
// =============================================================================

/// Line of a sales order to create.
#[derive(Debug, Clone, Serialize)]
pub struct NewLineItem {
    pub item_id: ItemId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
}

/// Body of `POST /salesorders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSalesOrder {
    pub customer_id: CustomerId,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricebook_id: Option<PriceListId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub line_items: Vec<NewLineItem>,
}
