//! Inventory item endpoints.

use tracing::instrument;
use tsh_core::ItemId;

use super::client::{Api, ZohoClient};
use super::types::{Item, ItemResponse, ItemsResponse, Page};
use super::ZohoError;

/// Largest page Zoho serves.
pub const MAX_PER_PAGE: u32 = 200;

impl ZohoClient {
    /// Fetch one page of active items.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_items(&self, page: u32, per_page: u32) -> Result<Page<Item>, ZohoError> {
        let page = page.max(1);
        let response: ItemsResponse = self
            .get(
                Api::Inventory,
                "/items",
                &[
                    ("page", page.to_string()),
                    ("per_page", per_page.clamp(1, MAX_PER_PAGE).to_string()),
                    ("filter_by", "Status.Active".to_string()),
                ],
            )
            .await?;
        Ok(Page::new(response.items, page, response.page_context))
    }

    /// Fetch a single item with its per-location stock.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the item does not exist.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn get_item(&self, id: &ItemId) -> Result<Item, ZohoError> {
        let response: ItemResponse = self
            .get(Api::Inventory, &format!("/items/{id}"), &[])
            .await?;
        Ok(response.item)
    }

    /// Fetch an item's primary image.
    ///
    /// Returns the image bytes and the upstream content type.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the item has no image.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn get_item_image(
        &self,
        id: &ItemId,
    ) -> Result<(Vec<u8>, Option<String>), ZohoError> {
        self.get_bytes(Api::Inventory, &format!("/items/{id}/image"))
            .await
    }
}
