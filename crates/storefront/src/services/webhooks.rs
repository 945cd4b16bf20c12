//! Zoho webhook receiver: turns change notifications into cache
//! invalidation.
//!
//! Zoho's webhook payloads are not uniform. Depending on how the workflow
//! rule was set up a delivery is one of:
//!
//! - JSON with the entity at the top level: `{"item": {...}}`
//! - JSON with an event envelope: `{"event_type": "salesorder.created", "data": {...}}`
//!   (or `module` instead of `event_type`, `entity_id` instead of `data`)
//! - a form post whose `JSONString` field holds either of the above
//!
//! Deliveries may repeat and arrive out of order. Repeats within five
//! minutes (same body) are acknowledged without reprocessing; ordering does
//! not matter because every event only deletes cache entries, apart from
//! item stock which is patched from the payload itself.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use tsh_core::{CustomerId, ItemId, PriceListId};

use crate::cache::{CacheError, CacheLayer, keys};
use crate::catalog::CatalogService;
use crate::kv::KvError;
use crate::services::auth::otp::constant_time_eq;
use crate::zoho::Item;

/// Window in which a repeated body is treated as a duplicate.
pub const DEDUPE_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum WebhookError {
    /// No webhook secret is configured, so nothing is accepted.
    #[error("webhooks are not configured")]
    NotConfigured,

    #[error("invalid webhook secret")]
    Unauthorized,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("key-value store error: {0}")]
    Kv(#[from] KvError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Zoho modules the portal reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Item,
    Contact,
    SalesOrder,
    Invoice,
    PriceBook,
    CustomerPayment,
    CreditNote,
}

impl EntityKind {
    /// Top-level payload keys, in lookup order.
    const PAYLOAD_KEYS: [(&'static str, Self); 7] = [
        ("item", Self::Item),
        ("contact", Self::Contact),
        ("salesorder", Self::SalesOrder),
        ("invoice", Self::Invoice),
        ("pricebook", Self::PriceBook),
        ("customerpayment", Self::CustomerPayment),
        ("creditnote", Self::CreditNote),
    ];

    /// Map a module or event name (`items`, `salesorder.created`,
    /// `Credit Notes`, `price_list_updated`) to a kind.
    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        // Longer names first so "customerpayment" is not read as "customer"
        const PREFIXES: [(&str, EntityKind); 12] = [
            ("customerpayment", EntityKind::CustomerPayment),
            ("creditnote", EntityKind::CreditNote),
            ("salesorder", EntityKind::SalesOrder),
            ("pricebook", EntityKind::PriceBook),
            ("pricelist", EntityKind::PriceBook),
            ("invoice", EntityKind::Invoice),
            ("contact", EntityKind::Contact),
            ("customer", EntityKind::Contact),
            ("payment", EntityKind::CustomerPayment),
            ("item", EntityKind::Item),
            ("product", EntityKind::Item),
            ("inventory", EntityKind::Item),
        ];

        let normalized: String = name
            .to_ascii_lowercase()
            .chars()
            .filter(char::is_ascii_alphabetic)
            .collect();

        PREFIXES
            .iter()
            .find(|(prefix, _)| normalized.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    /// Field holding the entity's own id.
    const fn id_field(self) -> &'static str {
        match self {
            Self::Item => "item_id",
            Self::Contact => "contact_id",
            Self::SalesOrder => "salesorder_id",
            Self::Invoice => "invoice_id",
            Self::PriceBook => "pricebook_id",
            Self::CustomerPayment => "payment_id",
            Self::CreditNote => "creditnote_id",
        }
    }
}

/// A delivery reduced to what invalidation needs.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub kind: EntityKind,
    pub event_type: Option<String>,
    pub entity_id: Option<String>,
    pub customer_id: Option<CustomerId>,
    /// The item payload, when it carries stock figures.
    pub item: Option<Item>,
}

impl WebhookEvent {
    /// Cache tags this event invalidates.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        match self.kind {
            EntityKind::Item => {
                let mut tags = vec![keys::tags::PRODUCTS.to_string()];
                if let Some(id) = &self.entity_id {
                    tags.push(keys::tags::item(&ItemId::new(id.as_str())));
                }
                tags
            }
            EntityKind::Contact => self
                .customer_id
                .iter()
                .map(keys::tags::customer)
                .collect(),
            EntityKind::PriceBook => {
                let mut tags = vec![keys::tags::PRODUCTS.to_string()];
                if let Some(id) = &self.entity_id {
                    tags.push(keys::tags::pricebook(&PriceListId::new(id.as_str())));
                }
                tags
            }
            EntityKind::SalesOrder => self.customer_tags(keys::tags::orders),
            EntityKind::Invoice => self.customer_tags(keys::tags::invoices),
            EntityKind::CustomerPayment => self.customer_tags(keys::tags::payments),
            EntityKind::CreditNote => self.customer_tags(keys::tags::credit_notes),
        }
    }

    /// The document tag plus the profile, whose balance moves with documents.
    fn customer_tags(&self, document: fn(&CustomerId) -> String) -> Vec<String> {
        match &self.customer_id {
            Some(customer_id) => vec![document(customer_id), keys::tags::customer(customer_id)],
            None => Vec::new(),
        }
    }
}

/// Decode a delivery.
///
/// Returns `Ok(None)` for well-formed payloads about modules the portal
/// does not cache.
///
/// # Errors
///
/// Returns `WebhookError::InvalidPayload` when the body is neither JSON nor
/// a form carrying `JSONString`.
pub fn parse_payload(body: &[u8]) -> Result<Option<WebhookEvent>, WebhookError> {
    let value = decode_body(body)?;
    let Value::Object(root) = value else {
        return Err(WebhookError::InvalidPayload("expected a JSON object".into()));
    };

    // Top-level entity object
    for (key, kind) in EntityKind::PAYLOAD_KEYS {
        if let Some(Value::Object(entity)) = root.get(key) {
            return Ok(Some(build_event(kind, None, entity, &root)));
        }
    }

    // Event envelope
    let event_type = string_field(&root, "event_type").or_else(|| string_field(&root, "module"));
    let Some(kind) = event_type.as_deref().and_then(EntityKind::from_event_name) else {
        debug!(event_type = ?event_type, "Webhook for an unhandled module");
        return Ok(None);
    };

    let entity = match root.get("data") {
        Some(Value::Object(data)) => {
            // Some rules nest the entity once more: {"data": {"item": {...}}}
            EntityKind::PAYLOAD_KEYS
                .iter()
                .find_map(|(key, _)| match data.get(*key) {
                    Some(Value::Object(inner)) => Some(inner),
                    _ => None,
                })
                .unwrap_or(data)
        }
        _ => &root,
    };

    Ok(Some(build_event(kind, event_type, entity, &root)))
}

fn decode_body(body: &[u8]) -> Result<Value, WebhookError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| WebhookError::InvalidPayload("body is not UTF-8".into()))?
        .trim();

    if text.starts_with('{') {
        return serde_json::from_str(text).map_err(|e| WebhookError::InvalidPayload(e.to_string()));
    }

    let json_string = url::form_urlencoded::parse(text.as_bytes())
        .find(|(key, _)| key == "JSONString")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| WebhookError::InvalidPayload("missing JSONString field".into()))?;

    serde_json::from_str(&json_string).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

fn build_event(
    kind: EntityKind,
    event_type: Option<String>,
    entity: &Map<String, Value>,
    root: &Map<String, Value>,
) -> WebhookEvent {
    let entity_id = string_field(entity, kind.id_field())
        .or_else(|| string_field(entity, "entity_id"))
        .or_else(|| string_field(root, "entity_id"));

    let customer_id = match kind {
        EntityKind::Contact => entity_id.clone(),
        _ => string_field(entity, "customer_id").or_else(|| string_field(root, "customer_id")),
    }
    .map(CustomerId::new);

    let item = match kind {
        EntityKind::Item => serde_json::from_value::<Item>(Value::Object(entity.clone()))
            .ok()
            .filter(carries_stock),
        _ => None,
    };

    WebhookEvent {
        kind,
        event_type: event_type.or_else(|| string_field(root, "event_type")),
        entity_id,
        customer_id,
        item,
    }
}

fn carries_stock(item: &Item) -> bool {
    item.has_location_stock()
        || item.available_for_sale_stock.is_some()
        || item.actual_available_stock.is_some()
        || item.stock_on_hand.is_some()
}

/// Ids arrive as strings or numbers; blanks count as missing.
fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// How a delivery was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Processed,
    Duplicate,
    Ignored,
}

/// Response body for a delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub status: WebhookStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub tags: Vec<String>,
    pub invalidated: u64,
    pub stock_patched: bool,
}

impl WebhookOutcome {
    const fn skipped(status: WebhookStatus) -> Self {
        Self {
            status,
            kind: None,
            entity_id: None,
            tags: Vec::new(),
            invalidated: 0,
            stock_patched: false,
        }
    }
}

/// Applies webhook deliveries.
#[derive(Clone)]
pub struct WebhookService {
    cache: CacheLayer,
    catalog: CatalogService,
    secret: Option<SecretString>,
}

impl WebhookService {
    #[must_use]
    pub fn new(cache: CacheLayer, catalog: CatalogService, secret: Option<SecretString>) -> Self {
        Self {
            cache,
            catalog,
            secret,
        }
    }

    /// Check the shared secret sent with a delivery.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::NotConfigured` when no secret is set and
    /// `WebhookError::Unauthorized` when it is missing or wrong.
    pub fn verify_secret(&self, provided: Option<&str>) -> Result<(), WebhookError> {
        let expected = self.secret.as_ref().ok_or(WebhookError::NotConfigured)?;
        match provided {
            Some(provided) if constant_time_eq(provided, expected.expose_secret()) => Ok(()),
            _ => Err(WebhookError::Unauthorized),
        }
    }

    /// Process one delivery.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::InvalidPayload` for undecodable bodies and
    /// store errors otherwise. A failed delivery is not marked as seen, so
    /// Zoho's retry is processed.
    #[instrument(skip_all, fields(bytes = body.len()))]
    pub async fn handle(&self, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
        let Some(event) = parse_payload(body)? else {
            return Ok(WebhookOutcome::skipped(WebhookStatus::Ignored));
        };

        let seen_key = keys::webhook_seen(&hex::encode(Sha256::digest(body)));
        if !self
            .cache
            .kv()
            .set_nx(&seen_key, "1", DEDUPE_WINDOW)
            .await?
        {
            info!(kind = ?event.kind, entity_id = ?event.entity_id, "Duplicate webhook delivery");
            return Ok(WebhookOutcome::skipped(WebhookStatus::Duplicate));
        }

        match self.apply(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(release) = self.cache.kv().del(&[seen_key]).await {
                    warn!(error = %release, "Failed to clear webhook dedupe key");
                }
                Err(e)
            }
        }
    }

    async fn apply(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        let tags = event.tags();
        if tags.is_empty() {
            warn!(
                kind = ?event.kind,
                entity_id = ?event.entity_id,
                "Webhook without the ids needed to invalidate anything"
            );
            return Ok(WebhookOutcome {
                kind: Some(event.kind),
                entity_id: event.entity_id.clone(),
                ..WebhookOutcome::skipped(WebhookStatus::Ignored)
            });
        }

        let invalidated = self.cache.invalidate_tags(&tags).await?;

        let mut stock_patched = false;
        if event.kind == EntityKind::Item {
            if let Some(id) = &event.entity_id {
                self.catalog.invalidate_image(&ItemId::new(id.as_str())).await;
            }
            if let Some(item) = &event.item {
                let quantity = self.catalog.stock().apply_item(item).await;
                debug!(item_id = %item.item_id, quantity, "Stock patched from webhook");
                stock_patched = true;
            }
        }

        info!(
            kind = ?event.kind,
            event_type = ?event.event_type,
            entity_id = ?event.entity_id,
            invalidated,
            stock_patched,
            "Webhook processed"
        );

        Ok(WebhookOutcome {
            status: WebhookStatus::Processed,
            kind: Some(event.kind),
            entity_id: event.entity_id.clone(),
            tags,
            invalidated,
            stock_patched,
        })
    }
}

impl std::fmt::Debug for WebhookService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookService")
            .field("configured", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(body: &str) -> WebhookEvent {
        parse_payload(body.as_bytes()).unwrap().unwrap()
    }

    #[test]
    fn test_top_level_item_with_stock() {
        let event = parse(
            r#"{"item": {"item_id": "9001", "name": "HDMI cable",
                "locations": [{"location_id": "500", "location_available_for_sale_stock": 12}]}}"#,
        );
        assert_eq!(event.kind, EntityKind::Item);
        assert_eq!(event.entity_id.as_deref(), Some("9001"));
        assert!(event.item.is_some());
        assert_eq!(event.tags(), vec!["products".to_string(), "item:9001".to_string()]);
    }

    #[test]
    fn test_item_without_stock_is_not_patched() {
        let event = parse(r#"{"item": {"item_id": "9001", "name": "HDMI cable"}}"#);
        assert!(event.item.is_none());
    }

    #[test]
    fn test_event_envelope_with_data() {
        let event = parse(
            r#"{"event_type": "salesorder.created",
                "data": {"salesorder_id": "SO-1", "customer_id": "77"}}"#,
        );
        assert_eq!(event.kind, EntityKind::SalesOrder);
        assert_eq!(event.entity_id.as_deref(), Some("SO-1"));
        assert_eq!(
            event.tags(),
            vec!["orders:77".to_string(), "customer:77".to_string()]
        );
    }

    #[test]
    fn test_numeric_ids_are_read() {
        let event = parse(r#"{"contact": {"contact_id": 77}}"#);
        assert_eq!(event.customer_id, Some(CustomerId::new("77")));
    }

    #[test]
    fn test_module_envelope_with_entity_id() {
        let event = parse(r#"{"module": "Contacts", "entity_id": "77"}"#);
        assert_eq!(event.kind, EntityKind::Contact);
        assert_eq!(event.tags(), vec!["customer:77".to_string()]);
    }

    #[test]
    fn test_nested_data_entity() {
        let event = parse(
            r#"{"event_type": "invoice_updated",
                "data": {"invoice": {"invoice_id": "INV-1", "customer_id": "77"}}}"#,
        );
        assert_eq!(event.kind, EntityKind::Invoice);
        assert_eq!(event.entity_id.as_deref(), Some("INV-1"));
        assert_eq!(event.customer_id, Some(CustomerId::new("77")));
    }

    #[test]
    fn test_form_encoded_json_string() {
        let body = "JSONString=%7B%22pricebook%22%3A%7B%22pricebook_id%22%3A%22900%22%7D%7D";
        let event = parse(body);
        assert_eq!(event.kind, EntityKind::PriceBook);
        assert_eq!(
            event.tags(),
            vec!["products".to_string(), "pricebook:900".to_string()]
        );
    }

    #[test]
    fn test_payment_without_customer_has_no_tags() {
        let event = parse(r#"{"customerpayment": {"payment_id": "P-1"}}"#);
        assert_eq!(event.kind, EntityKind::CustomerPayment);
        assert!(event.tags().is_empty());
    }

    #[test]
    fn test_unhandled_module_is_ignored() {
        assert!(parse_payload(br#"{"module": "vendors", "entity_id": "1"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            parse_payload(b"not a payload"),
            Err(WebhookError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_payload(b"[1, 2]"),
            Err(WebhookError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EntityKind::from_event_name("items"), Some(EntityKind::Item));
        assert_eq!(
            EntityKind::from_event_name("Customer Payments"),
            Some(EntityKind::CustomerPayment)
        );
        assert_eq!(
            EntityKind::from_event_name("creditnote.updated"),
            Some(EntityKind::CreditNote)
        );
        assert_eq!(
            EntityKind::from_event_name("price_list_updated"),
            Some(EntityKind::PriceBook)
        );
        assert_eq!(EntityKind::from_event_name("bills"), None);
    }
}
