//! Status enums for Zoho sales documents.
//!
//! Zoho adds statuses without notice, so every enum has an `Unknown`
//! catch-all instead of failing deserialization.

use serde::{Deserialize, Serialize};

/// Sales order status.
///
/// Maps to Zoho's `status` field on sales orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SalesOrderStatus {
    #[default]
    Draft,
    PendingApproval,
    Approved,
    Open,
    Confirmed,
    PartiallyInvoiced,
    Invoiced,
    Closed,
    Void,
    #[serde(other)]
    Unknown,
}

impl SalesOrderStatus {
    /// Returns true once the order has been accepted by the back office.
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(
            self,
            Self::Open | Self::Confirmed | Self::PartiallyInvoiced | Self::Invoiced | Self::Closed
        )
    }
}

/// Invoice status.
///
/// Maps to Zoho's `status` field on invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Viewed,
    Unpaid,
    Overdue,
    PartiallyPaid,
    Paid,
    Void,
    #[serde(other)]
    Unknown,
}

impl InvoiceStatus {
    /// Returns true if the invoice still has an amount due.
    #[must_use]
    pub const fn is_outstanding(self) -> bool {
        matches!(
            self,
            Self::Sent | Self::Viewed | Self::Unpaid | Self::Overdue | Self::PartiallyPaid
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_status_deserializes() {
        let status: InvoiceStatus = serde_json::from_str("\"partially_paid\"").unwrap();
        assert_eq!(status, InvoiceStatus::PartiallyPaid);
        assert!(status.is_outstanding());
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let status: SalesOrderStatus = serde_json::from_str("\"on_hold\"").unwrap();
        assert_eq!(status, SalesOrderStatus::Unknown);
        assert!(!status.is_confirmed());
    }

    #[test]
    fn test_paid_is_not_outstanding() {
        assert!(!InvoiceStatus::Paid.is_outstanding());
        assert!(!InvoiceStatus::Void.is_outstanding());
    }
}
