//! Contact endpoints.

use tracing::instrument;
use tsh_core::CustomerId;

use super::client::{Api, ZohoClient};
use super::types::{Contact, ContactResponse, ContactsResponse};
use super::ZohoError;

impl ZohoClient {
    /// Fetch a contact from Books.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the contact does not exist.
    #[instrument(skip(self), fields(contact_id = %id))]
    pub async fn get_contact(&self, id: &CustomerId) -> Result<Contact, ZohoError> {
        let response: ContactResponse = self
            .get(Api::Books, &format!("/contacts/{id}"), &[])
            .await?;
        Ok(response.contact)
    }

    /// Fetch the same contact as Inventory sees it.
    ///
    /// Inventory keeps its own copy of the price list assignment, which can
    /// lag behind or disagree with Books.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError::NotFound` if the contact does not exist.
    #[instrument(skip(self), fields(contact_id = %id))]
    pub async fn get_inventory_contact(&self, id: &CustomerId) -> Result<Contact, ZohoError> {
        let response: ContactResponse = self
            .get(Api::Inventory, &format!("/contacts/{id}"), &[])
            .await?;
        Ok(response.contact)
    }

    /// Find the active customer contact owning an email address.
    ///
    /// Zoho's `email` filter also matches contact persons, and the list row
    /// omits them, so each candidate is re-read and checked.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if a request fails.
    #[instrument(skip(self, email))]
    pub async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, ZohoError> {
        let response: ContactsResponse = self
            .get(
                Api::Books,
                "/contacts",
                &[
                    ("email", email.to_string()),
                    ("contact_type", "customer".to_string()),
                    ("filter_by", "Status.Active".to_string()),
                ],
            )
            .await?;

        for summary in response.contacts {
            let contact = self.get_contact(&summary.contact_id).await?;
            if contact.is_active() && contact.has_email(email) {
                return Ok(Some(contact));
            }
        }

        Ok(None)
    }
}
