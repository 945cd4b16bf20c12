//! Customer portal: profile, balance and sales documents.
//!
//! Every read is scoped to the logged-in customer. Lists are cached per
//! customer and page under the customer's document tags, so checkout and
//! webhooks can drop them; single documents are always read live.

use std::future::Future;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{instrument, warn};
use tsh_core::{CurrencyCode, CustomerId, InvoiceId, Money, PriceListId, SalesOrderId};

use crate::cache::{CacheLayer, keys};
use crate::config::CacheTtls;
use crate::zoho::{
    Contact, CreditNote, CustomerPayment, Invoice, Page, SalesOrder, ZohoClient, ZohoError,
};

/// Page size of every document list.
pub const DOCUMENTS_PER_PAGE: u32 = 25;

/// Orders shown on the dashboard.
const RECENT_ORDERS: usize = 5;

/// Customer profile as the portal shows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub id: CustomerId,
    pub name: String,
    pub company_name: String,
    pub email: Option<String>,
    pub currency: CurrencyCode,
    pub outstanding_balance: Money,
    pub unused_credits: Money,
    pub price_list_id: Option<PriceListId>,
    pub language: Option<String>,
}

impl From<Contact> for CustomerProfile {
    fn from(contact: Contact) -> Self {
        let currency = contact
            .currency_code
            .as_deref()
            .map(CurrencyCode::parse)
            .unwrap_or_default();
        Self {
            name: contact.display_name().to_string(),
            price_list_id: contact.assigned_price_list(),
            id: contact.contact_id,
            company_name: contact.company_name,
            email: contact.email,
            outstanding_balance: Money::new(
                contact.outstanding_receivable_amount,
                currency.clone(),
            ),
            unused_credits: Money::new(contact.unused_credits_receivable_amount, currency.clone()),
            currency,
            language: contact.language_code,
        }
    }
}

/// Account overview.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub profile: CustomerProfile,
    pub recent_orders: Vec<SalesOrder>,
    pub unpaid_invoices: usize,
    pub unpaid_total: Money,
}

/// Reads scoped to one customer.
#[derive(Clone)]
pub struct PortalService {
    zoho: ZohoClient,
    cache: CacheLayer,
    ttls: CacheTtls,
}

impl PortalService {
    #[must_use]
    pub fn new(zoho: ZohoClient, cache: CacheLayer, ttls: CacheTtls) -> Self {
        Self { zoho, cache, ttls }
    }

    /// Profile and balance, cached briefly.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the contact cannot be fetched.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn profile(&self, customer_id: &CustomerId) -> Result<CustomerProfile, ZohoError> {
        self.cache
            .get_or_fetch(
                &keys::customer(customer_id),
                self.ttls.customer,
                &[keys::tags::customer(customer_id)],
                || async {
                    let contact = self.zoho.get_contact(customer_id).await?;
                    Ok::<_, ZohoError>(CustomerProfile::from(contact))
                },
            )
            .await
    }

    /// Profile, latest orders and unpaid invoices.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the profile cannot be loaded. Failing order or
    /// invoice lookups leave those sections empty.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn dashboard(&self, customer_id: &CustomerId) -> Result<Dashboard, ZohoError> {
        let (profile, orders, unpaid) = tokio::join!(
            self.profile(customer_id),
            self.orders(customer_id, 1),
            self.unpaid_invoices(customer_id),
        );
        let profile = profile?;

        let recent_orders = match orders {
            Ok(page) => page.items.into_iter().take(RECENT_ORDERS).collect(),
            Err(e) => {
                warn!(error = %e, "Dashboard orders unavailable");
                Vec::new()
            }
        };
        let unpaid = unpaid.unwrap_or_else(|e| {
            warn!(error = %e, "Dashboard invoices unavailable");
            Vec::new()
        });

        let unpaid_total = unpaid.iter().map(|invoice| invoice.balance).sum::<Decimal>();
        Ok(Dashboard {
            unpaid_invoices: unpaid.len(),
            unpaid_total: Money::new(unpaid_total, profile.currency.clone()),
            recent_orders,
            profile,
        })
    }

    async fn cached_page<T, F, Fut>(
        &self,
        kind: &str,
        tag: String,
        customer_id: &CustomerId,
        page: u32,
        fetch: F,
    ) -> Result<Page<T>, ZohoError>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<Page<T>, ZohoError>>,
    {
        let page = page.max(1);
        self.cache
            .get_or_fetch(
                &keys::documents(kind, customer_id, page),
                self.ttls.customer,
                &[tag],
                || fetch(page),
            )
            .await
    }

    /// Unpaid invoices (first 200), cached with the invoice lists.
    async fn unpaid_invoices(&self, customer_id: &CustomerId) -> Result<Vec<Invoice>, ZohoError> {
        let page = self
            .cached_page("unpaid", keys::tags::invoices(customer_id), customer_id, 1, |page| {
                self.zoho.list_unpaid_invoices(customer_id, page, 200)
            })
            .await?;
        Ok(page
            .items
            .into_iter()
            .filter(|invoice| invoice.status.is_outstanding() || invoice.balance > Decimal::ZERO)
            .collect())
    }

    /// A page of sales orders.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the list cannot be fetched.
    pub async fn orders(
        &self,
        customer_id: &CustomerId,
        page: u32,
    ) -> Result<Page<SalesOrder>, ZohoError> {
        self.cached_page("orders", keys::tags::orders(customer_id), customer_id, page, |page| {
            self.zoho
                .list_sales_orders(customer_id, page, DOCUMENTS_PER_PAGE)
        })
        .await
    }

    /// One sales order, if it belongs to the customer.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` for a missing order or one owned by
    /// another customer.
    #[instrument(skip(self), fields(customer_id = %customer_id, salesorder_id = %id))]
    pub async fn order(
        &self,
        customer_id: &CustomerId,
        id: &SalesOrderId,
    ) -> Result<SalesOrder, ZohoError> {
        let order = self.zoho.get_sales_order(id).await?;
        owned_by(order, |o| &o.customer_id, customer_id, "sales order")
    }

    /// A page of invoices.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the list cannot be fetched.
    pub async fn invoices(
        &self,
        customer_id: &CustomerId,
        page: u32,
    ) -> Result<Page<Invoice>, ZohoError> {
        self.cached_page("invoices", keys::tags::invoices(customer_id), customer_id, page, |page| {
            self.zoho.list_invoices(customer_id, page, DOCUMENTS_PER_PAGE)
        })
        .await
    }

    /// One invoice, if it belongs to the customer.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` for a missing invoice or one owned by
    /// another customer.
    #[instrument(skip(self), fields(customer_id = %customer_id, invoice_id = %id))]
    pub async fn invoice(
        &self,
        customer_id: &CustomerId,
        id: &InvoiceId,
    ) -> Result<Invoice, ZohoError> {
        let invoice = self.zoho.get_invoice(id).await?;
        owned_by(invoice, |i| &i.customer_id, customer_id, "invoice")
    }

    /// A page of payments.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the list cannot be fetched.
    pub async fn payments(
        &self,
        customer_id: &CustomerId,
        page: u32,
    ) -> Result<Page<CustomerPayment>, ZohoError> {
        self.cached_page("payments", keys::tags::payments(customer_id), customer_id, page, |page| {
            self.zoho
                .list_customer_payments(customer_id, page, DOCUMENTS_PER_PAGE)
        })
        .await
    }

    /// A page of credit notes.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the list cannot be fetched.
    pub async fn credit_notes(
        &self,
        customer_id: &CustomerId,
        page: u32,
    ) -> Result<Page<CreditNote>, ZohoError> {
        self.cached_page(
            "creditnotes",
            keys::tags::credit_notes(customer_id),
            customer_id,
            page,
            |page| {
                self.zoho
                    .list_credit_notes(customer_id, page, DOCUMENTS_PER_PAGE)
            },
        )
        .await
    }
}

/// Hide documents of other customers behind the same error as a missing one.
fn owned_by<T>(
    document: T,
    owner: impl FnOnce(&T) -> &CustomerId,
    customer_id: &CustomerId,
    kind: &str,
) -> Result<T, ZohoError> {
    if owner(&document) == customer_id {
        Ok(document)
    } else {
        warn!(customer_id = %customer_id, kind, "Document requested by another customer");
        Err(ZohoError::NotFound(kind.to_string()))
    }
}

impl std::fmt::Debug for PortalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalService")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_contact() {
        let contact: Contact = serde_json::from_str(
            r#"{
                "contact_id": "77",
                "contact_name": "Ali Hassan",
                "company_name": "Al Noor Trading",
                "email": "ali@alnoor.iq",
                "currency_code": "USD",
                "outstanding_receivable_amount": "1,250.50",
                "unused_credits_receivable_amount": 0,
                "pricebook_id": "900"
            }"#,
        )
        .unwrap();
        let profile = CustomerProfile::from(contact);

        assert_eq!(profile.id, CustomerId::new("77"));
        assert_eq!(profile.name, "Al Noor Trading");
        assert_eq!(profile.currency, CurrencyCode::USD);
        assert_eq!(profile.outstanding_balance.amount, Decimal::new(125_050, 2));
        assert_eq!(profile.price_list_id, Some(PriceListId::new("900")));
    }

    #[test]
    fn test_owned_by_hides_foreign_documents() {
        let order: SalesOrder = serde_json::from_str(
            r#"{"salesorder_id": "SO-1", "customer_id": "77"}"#,
        )
        .unwrap();

        let mine = owned_by(order.clone(), |o| &o.customer_id, &CustomerId::new("77"), "sales order");
        assert!(mine.is_ok());

        let theirs = owned_by(order, |o| &o.customer_id, &CustomerId::new("78"), "sales order");
        assert!(matches!(theirs, Err(ZohoError::NotFound(_))));
    }
}
