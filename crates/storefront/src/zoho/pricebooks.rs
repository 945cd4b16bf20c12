//! Price book endpoints.

use tracing::instrument;
use tsh_core::PriceListId;

use super::client::{Api, ZohoClient};
use super::types::{PriceBook, PriceBookResponse};
use super::ZohoError;

impl ZohoClient {
    /// Fetch a price book with its item rates.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the price book does not exist.
    #[instrument(skip(self), fields(pricebook_id = %id))]
    pub async fn get_pricebook(&self, id: &PriceListId) -> Result<PriceBook, ZohoError> {
        let response: PriceBookResponse = self
            .get(Api::Books, &format!("/pricebooks/{id}"), &[])
            .await?;
        Ok(response.pricebook)
    }
}
