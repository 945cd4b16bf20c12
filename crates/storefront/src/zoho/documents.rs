//! Sales document endpoints (Books).

use serde_json::json;
use tracing::instrument;
use tsh_core::{CustomerId, InvoiceId, SalesOrderId};

use super::client::{Api, ZohoClient};
use super::types::{
    CreateSalesOrder, CreditNote, CreditNotesResponse, CustomerPayment, Invoice, InvoiceResponse,
    InvoicesResponse, Page, PaymentsResponse, SalesOrder, SalesOrderResponse, SalesOrdersResponse,
};
use super::ZohoError;

fn customer_page_query(customer_id: &CustomerId, page: u32, per_page: u32) -> Vec<(&'static str, String)> {
    vec![
        ("customer_id", customer_id.to_string()),
        ("page", page.max(1).to_string()),
        ("per_page", per_page.clamp(1, 200).to_string()),
        ("sort_column", "date".to_string()),
        ("sort_order", "D".to_string()),
    ]
}

impl ZohoClient {
    // =========================================================================
    // Sales orders
    // =========================================================================

    /// List a customer's sales orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the request fails.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_sales_orders(
        &self,
        customer_id: &CustomerId,
        page: u32,
        per_page: u32,
    ) -> Result<Page<SalesOrder>, ZohoError> {
        let response: SalesOrdersResponse = self
            .get(
                Api::Books,
                "/salesorders",
                &customer_page_query(customer_id, page, per_page),
            )
            .await?;
        Ok(Page::new(response.salesorders, page.max(1), response.page_context))
    }

    /// Fetch a sales order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the order does not exist.
    #[instrument(skip(self), fields(salesorder_id = %id))]
    pub async fn get_sales_order(&self, id: &SalesOrderId) -> Result<SalesOrder, ZohoError> {
        let response: SalesOrderResponse = self
            .get(Api::Books, &format!("/salesorders/{id}"), &[])
            .await?;
        Ok(response.salesorder)
    }

    /// Create a draft sales order.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if Zoho rejects the order.
    #[instrument(skip(self, order), fields(customer_id = %order.customer_id, lines = order.line_items.len()))]
    pub async fn create_sales_order(
        &self,
        order: &CreateSalesOrder,
    ) -> Result<SalesOrder, ZohoError> {
        let body = serde_json::to_value(order).map_err(|e| ZohoError::Parse(e.to_string()))?;
        let response: SalesOrderResponse = self
            .post(Api::Books, "/salesorders", &[], Some(&body))
            .await?;
        Ok(response.salesorder)
    }

    /// Mark a draft sales order as confirmed (open).
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if Zoho rejects the status change.
    #[instrument(skip(self), fields(salesorder_id = %id))]
    pub async fn confirm_sales_order(&self, id: &SalesOrderId) -> Result<(), ZohoError> {
        let _: serde_json::Value = self
            .post(
                Api::Books,
                &format!("/salesorders/{id}/status/confirmed"),
                &[],
                None,
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    /// List a customer's invoices, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the request fails.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_invoices(
        &self,
        customer_id: &CustomerId,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Invoice>, ZohoError> {
        let response: InvoicesResponse = self
            .get(
                Api::Books,
                "/invoices",
                &customer_page_query(customer_id, page, per_page),
            )
            .await?;
        Ok(Page::new(response.invoices, page.max(1), response.page_context))
    }

    /// List a customer's invoices that still have a balance due.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the request fails.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_unpaid_invoices(
        &self,
        customer_id: &CustomerId,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Invoice>, ZohoError> {
        let mut query = customer_page_query(customer_id, page, per_page);
        query.push(("filter_by", "Status.Unpaid".to_string()));
        let response: InvoicesResponse = self.get(Api::Books, "/invoices", &query).await?;
        Ok(Page::new(response.invoices, page.max(1), response.page_context))
    }

    /// Fetch an invoice with its lines.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the invoice does not exist.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn get_invoice(&self, id: &InvoiceId) -> Result<Invoice, ZohoError> {
        let response: InvoiceResponse = self
            .get(Api::Books, &format!("/invoices/{id}"), &[])
            .await?;
        Ok(response.invoice)
    }

    /// Convert a confirmed sales order into an invoice.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if Zoho rejects the conversion.
    #[instrument(skip(self), fields(salesorder_id = %salesorder_id))]
    pub async fn create_invoice_from_sales_order(
        &self,
        salesorder_id: &SalesOrderId,
    ) -> Result<Invoice, ZohoError> {
        let response: InvoiceResponse = self
            .post(
                Api::Books,
                "/invoices/fromsalesorder",
                &[("salesorder_id", salesorder_id.to_string())],
                Some(&json!({})),
            )
            .await?;
        Ok(response.invoice)
    }

    // =========================================================================
    // Payments and credit notes
    // =========================================================================

    /// List a customer's payments, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the request fails.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_customer_payments(
        &self,
        customer_id: &CustomerId,
        page: u32,
        per_page: u32,
    ) -> Result<Page<CustomerPayment>, ZohoError> {
        let response: PaymentsResponse = self
            .get(
                Api::Books,
                "/customerpayments",
                &customer_page_query(customer_id, page, per_page),
            )
            .await?;
        Ok(Page::new(
            response.customerpayments,
            page.max(1),
            response.page_context,
        ))
    }

    /// List a customer's credit notes, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the request fails.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_credit_notes(
        &self,
        customer_id: &CustomerId,
        page: u32,
        per_page: u32,
    ) -> Result<Page<CreditNote>, ZohoError> {
        let response: CreditNotesResponse = self
            .get(
                Api::Books,
                "/creditnotes",
                &customer_page_query(customer_id, page, per_page),
            )
            .await?;
        Ok(Page::new(
            response.creditnotes,
            page.max(1),
            response.page_context,
        ))
    }
}
