//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use tsh_core::{CustomerId, Email};

/// Logged-in customer identity.
///
/// Stored in the browser session and carried in mobile access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCustomer {
    /// Zoho contact id.
    pub id: CustomerId,
    /// Login email.
    pub email: Email,
    /// Company or contact name as shown in Zoho.
    pub name: String,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in customer.
    pub const CURRENT_CUSTOMER: &str = "current_customer";
}
