//! Product catalog: listing, detail, images, stock and pricing.
//!
//! # Architecture
//!
//! - The active catalog is cached as compact [`CatalogEntry`] rows under one
//!   key, rebuilt by the stock sync or on first request
//! - Stock comes from [`stock::UnifiedStock`] (snapshot first, live fallback)
//! - Prices come from [`pricing::PricingService`] for the viewer; nothing
//!   priced is cached per customer
//! - Images are proxied from Inventory and held in-process with `moka`

pub mod pricing;
pub mod stock;
pub mod sync;

use std::collections::HashMap;
use std::time::Duration;

use axum::body::Bytes;
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use tsh_core::{CustomerId, ItemId, Money};

use crate::cache::{CacheLayer, keys};
use crate::config::CacheTtls;
use crate::zoho::{Item, MAX_PER_PAGE, ZohoClient, ZohoError};
use pricing::{PriceSource, PricingService, ViewerPrices};
use stock::UnifiedStock;

/// Upper bound on catalog pages pulled on a cold cache.
const MAX_CATALOG_PAGES: u32 = 500;

/// In-process image cache budget (bytes).
const IMAGE_CACHE_BYTES: u64 = 64 * 1024 * 1024;

/// Images change rarely; webhooks do not cover them.
const IMAGE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default and maximum page sizes for listings.
pub const DEFAULT_PER_PAGE: u32 = 24;
pub const MAX_LISTING_PER_PAGE: u32 = 100;

/// Catalog row kept for listing and search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item_id: ItemId,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub brand: Option<String>,
    pub rate: Decimal,
    pub image_document_id: Option<String>,
}

impl From<&Item> for CatalogEntry {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.item_id.clone(),
            name: item.name.clone(),
            sku: item.sku.clone(),
            unit: item.unit.clone(),
            category_id: item.category_id.clone(),
            category_name: item.category_name.clone(),
            brand: item.brand.clone(),
            rate: item.rate,
            image_document_id: item.image_document_id.clone(),
        }
    }
}

impl CatalogEntry {
    /// Case-insensitive match on name or SKU.
    fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.sku.to_lowercase().contains(needle)
    }

    /// Match on category id or name.
    fn matches_category(&self, category: &str) -> bool {
        self.category_id.as_deref() == Some(category)
            || self
                .category_name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(category))
    }
}

/// Listing filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl ProductQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_LISTING_PER_PAGE)
    }

    /// Index of the first row on the requested page. Saturates, so a
    /// page past the end is just empty.
    fn offset(&self) -> usize {
        usize::try_from(self.page() - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.per_page() as usize)
    }
}

/// A product as shown to one viewer.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub id: ItemId,
    pub name: String,
    pub sku: String,
    pub unit: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub price: Option<Money>,
    pub price_source: Option<PriceSource>,
    pub stock: f64,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl ProductSummary {
    fn build(entry: &CatalogEntry, prices: &ViewerPrices, stock: f64) -> Self {
        let priced = prices.price_for(&entry.item_id, Some(entry.rate));
        Self {
            id: entry.item_id.clone(),
            name: entry.name.clone(),
            sku: entry.sku.clone(),
            unit: entry.unit.clone(),
            category: entry.category_name.clone(),
            brand: entry.brand.clone(),
            price_source: priced.as_ref().map(|(_, source)| *source),
            price: priced.map(|(price, _)| price),
            stock,
            in_stock: stock > 0.0,
            image_url: entry
                .image_document_id
                .as_ref()
                .map(|_| format!("/api/products/{}/image", entry.item_id)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub summary: ProductSummary,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<ProductSummary>,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
    pub has_more: bool,
}

/// Proxied product image.
#[derive(Debug, Clone)]
pub struct ProductImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Catalog reads.
#[derive(Clone)]
pub struct CatalogService {
    zoho: ZohoClient,
    cache: CacheLayer,
    stock: UnifiedStock,
    pricing: PricingService,
    ttls: CacheTtls,
    images: Cache<ItemId, ProductImage>,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        zoho: ZohoClient,
        cache: CacheLayer,
        stock: UnifiedStock,
        pricing: PricingService,
        ttls: CacheTtls,
    ) -> Self {
        let images = Cache::builder()
            .weigher(|_id: &ItemId, image: &ProductImage| {
                u32::try_from(image.bytes.len()).unwrap_or(u32::MAX)
            })
            .max_capacity(IMAGE_CACHE_BYTES)
            .time_to_live(IMAGE_TTL)
            .build();

        Self {
            zoho,
            cache,
            stock,
            pricing,
            ttls,
            images,
        }
    }

    #[must_use]
    pub fn stock(&self) -> &UnifiedStock {
        &self.stock
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingService {
        &self.pricing
    }

    /// All active catalog rows.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the cache is cold and the catalog cannot be pulled.
    pub async fn entries(&self) -> Result<Vec<CatalogEntry>, ZohoError> {
        self.cache
            .get_or_fetch(
                keys::CATALOG_ITEMS,
                self.ttls.product,
                &[keys::tags::PRODUCTS.to_string()],
                || self.pull_entries(),
            )
            .await
    }

    async fn pull_entries(&self) -> Result<Vec<CatalogEntry>, ZohoError> {
        let mut entries = Vec::new();
        for page in 1..=MAX_CATALOG_PAGES {
            let batch = self.zoho.list_items(page, MAX_PER_PAGE).await?;
            entries.extend(
                batch
                    .items
                    .iter()
                    .filter(|item| item.is_active())
                    .map(CatalogEntry::from),
            );
            if !batch.has_more {
                debug!(count = entries.len(), "Pulled catalog");
                return Ok(entries);
            }
        }
        warn!(
            pages = MAX_CATALOG_PAGES,
            count = entries.len(),
            "Catalog pull stopped at the page limit, listing is truncated"
        );
        Ok(entries)
    }

    /// Filtered, paginated listing priced for `viewer`.
    ///
    /// The in-stock filter uses the stock snapshot. Without a snapshot it
    /// is applied to the requested page only, after live lookups.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if catalog, price list or stock data cannot be loaded.
    #[instrument(skip(self, query), fields(q = ?query.q, category = ?query.category))]
    pub async fn list(
        &self,
        query: &ProductQuery,
        viewer: Option<&CustomerId>,
    ) -> Result<ProductPage, ZohoError> {
        let entries = self.entries().await?;
        let needle = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let category = query.category.as_deref().filter(|c| !c.is_empty());

        let mut matched: Vec<&CatalogEntry> = entries
            .iter()
            .filter(|e| needle.as_deref().is_none_or(|n| e.matches_search(n)))
            .filter(|e| category.is_none_or(|c| e.matches_category(c)))
            .collect();

        let snapshot = if query.in_stock {
            self.stock.snapshot().await
        } else {
            None
        };
        if let Some(snapshot) = &snapshot {
            matched.retain(|e| snapshot.items.get(&e.item_id).is_some_and(|q| *q > 0.0));
        }

        matched.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        let page = query.page();
        let per_page = query.per_page();
        let total = matched.len();
        let start = query.offset();
        let page_entries: Vec<&CatalogEntry> = matched
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();

        let ids: Vec<ItemId> = page_entries.iter().map(|e| e.item_id.clone()).collect();
        let (stock, prices) = tokio::join!(self.stock.quantities(&ids), self.pricing.for_viewer(viewer));
        let stock = stock?;
        let prices = prices?;

        let mut items: Vec<ProductSummary> = page_entries
            .into_iter()
            .map(|e| {
                let qty = stock.get(&e.item_id).copied().unwrap_or_default();
                ProductSummary::build(e, &prices, qty)
            })
            .collect();
        if query.in_stock && snapshot.is_none() {
            items.retain(|p| p.in_stock);
        }

        Ok(ProductPage {
            items,
            page,
            per_page,
            total,
            has_more: start.saturating_add(per_page as usize) < total,
        })
    }

    /// One product priced for `viewer`.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` for unknown or inactive items.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn product(
        &self,
        id: &ItemId,
        viewer: Option<&CustomerId>,
    ) -> Result<ProductDetail, ZohoError> {
        let item: Item = self
            .cache
            .get_or_fetch(
                &keys::product(id),
                self.ttls.product,
                &[keys::tags::PRODUCTS.to_string(), keys::tags::item(id)],
                || self.zoho.get_item(id),
            )
            .await?;

        if !item.is_active() {
            return Err(ZohoError::NotFound(format!("item {id}")));
        }

        let (stock, prices) = tokio::join!(self.stock.quantity(id), self.pricing.for_viewer(viewer));
        let entry = CatalogEntry::from(&item);

        Ok(ProductDetail {
            summary: ProductSummary::build(&entry, &prices?, stock?),
            description: item.description,
        })
    }

    /// Product image bytes, cached in-process.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the item has no image.
    pub async fn image(&self, id: &ItemId) -> Result<ProductImage, ZohoError> {
        if let Some(image) = self.images.get(id).await {
            return Ok(image);
        }

        let (bytes, content_type) = self.zoho.get_item_image(id).await?;
        let image = ProductImage {
            bytes: Bytes::from(bytes),
            content_type: content_type.unwrap_or_else(|| "image/jpeg".to_string()),
        };
        self.images.insert(id.clone(), image.clone()).await;
        Ok(image)
    }

    /// Stock and list prices for a set of items, used by checkout.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if stock or prices cannot be loaded.
    pub async fn quote(
        &self,
        ids: &[ItemId],
        viewer: &CustomerId,
    ) -> Result<(HashMap<ItemId, f64>, ViewerPrices), ZohoError> {
        let (stock, prices) = tokio::join!(
            self.stock.quantities(ids),
            self.pricing.for_viewer(Some(viewer))
        );
        Ok((stock?, prices?))
    }

    /// Drop a cached image.
    pub async fn invalidate_image(&self, id: &ItemId) {
        self.images.invalidate(id).await;
    }
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("stock", &self.stock)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tsh_core::{CurrencyCode, PriceListId};

    use super::*;
    use crate::catalog::pricing::PriceList;

    fn entry(id: &str, name: &str, sku: &str, category: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            item_id: ItemId::new(id),
            name: name.to_string(),
            sku: sku.to_string(),
            unit: "pcs".to_string(),
            category_id: category.map(|c| format!("cat-{c}")),
            category_name: category.map(ToString::to_string),
            brand: None,
            rate: Decimal::from(1000),
            image_document_id: None,
        }
    }

    #[test]
    fn test_search_matches_name_or_sku() {
        let e = entry("1", "Copper Cable 2.5mm", "CBL-25", None);
        assert!(e.matches_search("copper"));
        assert!(e.matches_search("cbl-"));
        assert!(!e.matches_search("switch"));
    }

    #[test]
    fn test_category_matches_id_or_name() {
        let e = entry("1", "Cable", "CBL", Some("Wiring"));
        assert!(e.matches_category("wiring"));
        assert!(e.matches_category("cat-Wiring"));
        assert!(!e.matches_category("Lighting"));
    }

    #[test]
    fn test_query_bounds() {
        let query = ProductQuery {
            page: Some(0),
            per_page: Some(1000),
            ..ProductQuery::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), MAX_LISTING_PER_PAGE);
        assert_eq!(ProductQuery::default().per_page(), DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_offset_saturates_for_huge_pages() {
        let query = ProductQuery {
            page: Some(3),
            per_page: Some(10),
            ..ProductQuery::default()
        };
        assert_eq!(query.offset(), 20);

        let query = ProductQuery {
            page: Some(u32::MAX),
            per_page: Some(MAX_LISTING_PER_PAGE),
            ..ProductQuery::default()
        };
        assert_eq!(
            query.offset(),
            (u32::MAX as usize - 1).saturating_mul(MAX_LISTING_PER_PAGE as usize)
        );
        assert!(query.offset() > 1_000_000);
    }

    #[test]
    fn test_summary_without_price() {
        let prices = ViewerPrices {
            customer: None,
            default: PriceList {
                id: PriceListId::new("consumer"),
                name: "Consumer".to_string(),
                currency: CurrencyCode::IQD,
                rates: HashMap::new(),
                adjustment_percent: None,
            },
        };
        let mut e = entry("1", "Cable", "CBL", None);
        e.image_document_id = Some("doc-1".to_string());

        let summary = ProductSummary::build(&e, &prices, 0.0);
        assert!(summary.price.is_none());
        assert!(summary.price_source.is_none());
        assert!(!summary.in_stock);
        assert_eq!(summary.image_url.as_deref(), Some("/api/products/1/image"));
    }
}
