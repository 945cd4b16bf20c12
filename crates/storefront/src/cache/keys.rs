//! Key-value store keys and cache tags.
//!
//! Every key the portal writes is built here so that invalidation and the
//! CLI agree on the layout.

use tsh_core::{CustomerId, ItemId, PriceListId, WarehouseId};

/// Shared Zoho OAuth access token.
pub const ZOHO_ACCESS_TOKEN: &str = "zoho:access_token";

/// Overlap lock for stock sync runs.
pub const SYNC_LOCK: &str = "stock:sync:lock";

/// Metadata of the last stock sync run.
pub const SYNC_LAST: &str = "stock:sync:last";

/// Compact catalog rows used by product listing.
pub const CATALOG_ITEMS: &str = "catalog:items";

/// Stock snapshot for one warehouse.
#[must_use]
pub fn stock_snapshot(warehouse_id: &WarehouseId) -> String {
    format!("stock:snapshot:{warehouse_id}")
}

#[must_use]
pub fn product(id: &ItemId) -> String {
    format!("product:{id}")
}

#[must_use]
pub fn customer(id: &CustomerId) -> String {
    format!("customer:{id}:profile")
}

#[must_use]
pub fn customer_price_list(id: &CustomerId) -> String {
    format!("customer:{id}:pricelist")
}

#[must_use]
pub fn price_list(id: &PriceListId) -> String {
    format!("pricelist:{id}")
}

/// One page of a customer's document list, e.g. `orders`.
#[must_use]
pub fn documents(kind: &str, customer_id: &CustomerId, page: u32) -> String {
    format!("{kind}:{customer_id}:page:{page}")
}

/// Pending one-time code for an email address.
#[must_use]
pub fn otp(email: &str) -> String {
    format!("auth:otp:{email}")
}

/// Wrong guesses against the pending code for an email address.
#[must_use]
pub fn otp_attempts(email: &str) -> String {
    format!("auth:otp-attempts:{email}")
}

/// Pending magic link, keyed by the token's hash.
#[must_use]
pub fn magic_link(token_hash: &str) -> String {
    format!("auth:magic:{token_hash}")
}

/// Login request counter for an email address.
#[must_use]
pub fn login_requests(email: &str) -> String {
    format!("auth:requests:{email}")
}

/// Live mobile refresh token.
#[must_use]
pub fn refresh_token(jti: &str) -> String {
    format!("auth:refresh:{jti}")
}

/// Web session record.
#[must_use]
pub fn session(id: &str) -> String {
    format!("session:{id}")
}

/// Marker for an already processed webhook delivery.
#[must_use]
pub fn webhook_seen(body_hash: &str) -> String {
    format!("webhook:seen:{body_hash}")
}

/// Set holding the member keys of a tag.
#[must_use]
pub fn tag_set(tag: &str) -> String {
    format!("tag:{tag}")
}

/// Cache tags.
pub mod tags {
    use tsh_core::{CustomerId, ItemId, PriceListId};

    /// Product listing and every product detail.
    pub const PRODUCTS: &str = "products";

    #[must_use]
    pub fn item(id: &ItemId) -> String {
        format!("item:{id}")
    }

    #[must_use]
    pub fn customer(id: &CustomerId) -> String {
        format!("customer:{id}")
    }

    #[must_use]
    pub fn pricebook(id: &PriceListId) -> String {
        format!("pricebook:{id}")
    }

    #[must_use]
    pub fn orders(customer_id: &CustomerId) -> String {
        format!("orders:{customer_id}")
    }

    #[must_use]
    pub fn invoices(customer_id: &CustomerId) -> String {
        format!("invoices:{customer_id}")
    }

    #[must_use]
    pub fn payments(customer_id: &CustomerId) -> String {
        format!("payments:{customer_id}")
    }

    #[must_use]
    pub fn credit_notes(customer_id: &CustomerId) -> String {
        format!("creditnotes:{customer_id}")
    }

    /// Every document tag of a customer.
    #[must_use]
    pub fn customer_documents(customer_id: &CustomerId) -> Vec<String> {
        vec![
            orders(customer_id),
            invoices(customer_id),
            payments(customer_id),
            credit_notes(customer_id),
        ]
    }
}
