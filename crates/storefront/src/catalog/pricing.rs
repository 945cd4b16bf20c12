//! Customer-specific pricing.
//!
//! Each customer may be assigned a Zoho price book. Books and Inventory
//! both store the assignment and do not always agree; Books wins. Guests
//! and unassigned customers see the default consumer list.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use tsh_core::{CurrencyCode, CustomerId, ItemId, Money, PriceListId};

use crate::cache::{CacheLayer, keys};
use crate::config::CacheTtls;
use crate::zoho::{Contact, PriceBook, PriceBookType, ZohoClient, ZohoError};

/// Pick the price list for a customer.
///
/// Books' assignment wins, then Inventory's, then `default`. A disagreement
/// between the two is logged so the back office can fix the contact.
#[must_use]
pub fn resolve_price_list_id(
    books: Option<&Contact>,
    inventory: Option<&Contact>,
    default: &PriceListId,
) -> PriceListId {
    let from_books = books.and_then(Contact::assigned_price_list);
    let from_inventory = inventory.and_then(Contact::assigned_price_list);

    if let (Some(b), Some(i)) = (&from_books, &from_inventory)
        && b != i
    {
        let contact_id = books.map(|c| c.contact_id.as_str()).unwrap_or_default();
        warn!(
            contact_id,
            books = %b,
            inventory = %i,
            "Books and Inventory disagree on the contact's price list"
        );
    }

    from_books
        .or(from_inventory)
        .unwrap_or_else(|| default.clone())
}

/// A price list as the portal uses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceList {
    pub id: PriceListId,
    pub name: String,
    pub currency: CurrencyCode,
    /// Explicit per-item rates.
    pub rates: HashMap<ItemId, Decimal>,
    /// Signed percentage applied to the item's base rate when the list has
    /// no explicit rate (`fixed_percentage` price books).
    pub adjustment_percent: Option<Decimal>,
}

impl PriceList {
    /// Convert a Zoho price book.
    #[must_use]
    pub fn from_pricebook(book: PriceBook) -> Self {
        let rates = book
            .pricebook_items
            .iter()
            .filter_map(|item| item.list_rate().map(|rate| (item.item_id.clone(), rate)))
            .collect();

        let adjustment_percent = match book.pricebook_type {
            PriceBookType::FixedPercentage => Some(if book.is_increase {
                book.percentage
            } else {
                -book.percentage
            }),
            PriceBookType::PerItem | PriceBookType::Unknown => None,
        };

        Self {
            id: book.pricebook_id,
            name: book.name,
            currency: book
                .currency_code
                .as_deref()
                .map(CurrencyCode::parse)
                .unwrap_or_default(),
            rates,
            adjustment_percent,
        }
    }

    /// Price of an item on this list, if the list covers it.
    #[must_use]
    pub fn price_for(&self, item_id: &ItemId, base_rate: Option<Decimal>) -> Option<Money> {
        let amount = match (self.rates.get(item_id), self.adjustment_percent, base_rate) {
            (Some(rate), _, _) => *rate,
            (None, Some(percent), Some(base)) if base > Decimal::ZERO => {
                let factor = Decimal::ONE + percent / Decimal::ONE_HUNDRED;
                (base * factor).round_dp_with_strategy(
                    self.currency.minor_units(),
                    RoundingStrategy::MidpointAwayFromZero,
                )
            }
            _ => return None,
        };
        Some(Money::new(amount, self.currency.clone()))
    }
}

/// Which list a price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Customer,
    Default,
}

/// The lists that apply to one viewer.
#[derive(Debug, Clone)]
pub struct ViewerPrices {
    /// The customer's own list, when it differs from the default.
    pub customer: Option<PriceList>,
    pub default: PriceList,
}

impl ViewerPrices {
    /// Customer list first, then the default consumer list, then no price.
    #[must_use]
    pub fn price_for(
        &self,
        item_id: &ItemId,
        base_rate: Option<Decimal>,
    ) -> Option<(Money, PriceSource)> {
        self.customer
            .as_ref()
            .and_then(|list| list.price_for(item_id, base_rate))
            .map(|price| (price, PriceSource::Customer))
            .or_else(|| {
                self.default
                    .price_for(item_id, base_rate)
                    .map(|price| (price, PriceSource::Default))
            })
    }

    /// Id of the list orders are placed against.
    #[must_use]
    pub fn effective_list_id(&self) -> &PriceListId {
        self.customer.as_ref().map_or(&self.default.id, |list| &list.id)
    }
}

/// Cached price list lookups.
#[derive(Clone)]
pub struct PricingService {
    zoho: ZohoClient,
    cache: CacheLayer,
    ttls: CacheTtls,
    default_id: PriceListId,
}

impl PricingService {
    #[must_use]
    pub fn new(zoho: ZohoClient, cache: CacheLayer, ttls: CacheTtls) -> Self {
        let default_id = zoho.config().default_price_list_id.clone();
        Self {
            zoho,
            cache,
            ttls,
            default_id,
        }
    }

    #[must_use]
    pub fn default_id(&self) -> &PriceListId {
        &self.default_id
    }

    /// Load a price list, cached per id.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the price book cannot be fetched.
    #[instrument(skip(self), fields(price_list_id = %id))]
    pub async fn price_list(&self, id: &PriceListId) -> Result<PriceList, ZohoError> {
        self.cache
            .get_or_fetch(
                &keys::price_list(id),
                self.ttls.price_list,
                &[keys::tags::pricebook(id)],
                || async {
                    let book = self.zoho.get_pricebook(id).await?;
                    Ok::<_, ZohoError>(PriceList::from_pricebook(book))
                },
            )
            .await
    }

    /// Resolve the price list assigned to a customer, cached per customer.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the Books contact cannot be fetched. A failing
    /// Inventory lookup only loses the disagreement check.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn customer_price_list_id(
        &self,
        customer_id: &CustomerId,
    ) -> Result<PriceListId, ZohoError> {
        self.cache
            .get_or_fetch(
                &keys::customer_price_list(customer_id),
                self.ttls.customer,
                &[keys::tags::customer(customer_id)],
                || async {
                    let (books, inventory) = tokio::join!(
                        self.zoho.get_contact(customer_id),
                        self.zoho.get_inventory_contact(customer_id),
                    );
                    let books = books?;
                    let inventory = match inventory {
                        Ok(contact) => Some(contact),
                        Err(e) => {
                            warn!(error = %e, "Inventory contact lookup failed");
                            None
                        }
                    };
                    Ok::<_, ZohoError>(resolve_price_list_id(
                        Some(&books),
                        inventory.as_ref(),
                        &self.default_id,
                    ))
                },
            )
            .await
    }

    /// Lists applying to a viewer; `None` is a guest.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the default list cannot be loaded. A customer
    /// list that fails to load degrades to default pricing.
    pub async fn for_viewer(&self, viewer: Option<&CustomerId>) -> Result<ViewerPrices, ZohoError> {
        let default = self.price_list(&self.default_id).await?;

        let customer = match viewer {
            Some(customer_id) => {
                let list_id = self.customer_price_list_id(customer_id).await?;
                if list_id == self.default_id {
                    None
                } else {
                    match self.price_list(&list_id).await {
                        Ok(list) => Some(list),
                        Err(e) => {
                            warn!(
                                customer_id = %customer_id,
                                price_list_id = %list_id,
                                error = %e,
                                "Customer price list unavailable, using default"
                            );
                            None
                        }
                    }
                }
            }
            None => None,
        };

        Ok(ViewerPrices { customer, default })
    }
}

impl std::fmt::Debug for PricingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingService")
            .field("default_id", &self.default_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn contact(json: &str) -> Contact {
        serde_json::from_str(json).unwrap()
    }

    fn list(id: &str, rates: &[(&str, i64)]) -> PriceList {
        PriceList {
            id: PriceListId::new(id),
            name: id.to_string(),
            currency: CurrencyCode::IQD,
            rates: rates
                .iter()
                .map(|(item, rate)| (ItemId::new(*item), Decimal::from(*rate)))
                .collect(),
            adjustment_percent: None,
        }
    }

    #[test]
    fn test_resolve_prefers_books() {
        let default = PriceListId::new("default");
        let books = contact(r#"{"contact_id":"1","pricebook_id":"A"}"#);
        let inventory = contact(r#"{"contact_id":"1","price_list_id":"B"}"#);

        assert_eq!(
            resolve_price_list_id(Some(&books), Some(&inventory), &default),
            PriceListId::new("A")
        );
    }

    #[test]
    fn test_resolve_falls_back_to_inventory_then_default() {
        let default = PriceListId::new("default");
        let books = contact(r#"{"contact_id":"1","pricebook_id":""}"#);
        let inventory = contact(r#"{"contact_id":"1","price_list_id":"B"}"#);

        assert_eq!(
            resolve_price_list_id(Some(&books), Some(&inventory), &default),
            PriceListId::new("B")
        );
        assert_eq!(resolve_price_list_id(Some(&books), None, &default), default);
        assert_eq!(resolve_price_list_id(None, None, &default), default);
    }

    #[test]
    fn test_viewer_price_fallback_chain() {
        let prices = ViewerPrices {
            customer: Some(list("wholesale", &[("1", 900)])),
            default: list("consumer", &[("1", 1000), ("2", 2000)]),
        };

        let (price, source) = prices.price_for(&ItemId::new("1"), None).unwrap();
        assert_eq!(price.amount, Decimal::from(900));
        assert_eq!(source, PriceSource::Customer);

        let (price, source) = prices.price_for(&ItemId::new("2"), None).unwrap();
        assert_eq!(price.amount, Decimal::from(2000));
        assert_eq!(source, PriceSource::Default);

        assert!(prices.price_for(&ItemId::new("3"), None).is_none());
        assert_eq!(prices.effective_list_id(), &PriceListId::new("wholesale"));
    }

    #[test]
    fn test_percentage_pricebook() {
        let book: PriceBook = serde_json::from_str(
            r#"{
                "pricebook_id": "P",
                "name": "Wholesale -10%",
                "currency_code": "IQD",
                "pricebook_type": "fixed_percentage",
                "is_increase": false,
                "percentage": 10
            }"#,
        )
        .unwrap();
        let list = PriceList::from_pricebook(book);

        let price = list
            .price_for(&ItemId::new("1"), Some(Decimal::from(1255)))
            .unwrap();
        // 1255 * 0.9 = 1129.5, IQD has no minor unit
        assert_eq!(price.amount, Decimal::from(1130));
        assert!(list.price_for(&ItemId::new("1"), None).is_none());
    }
}
