//! Zoho webhook deliveries.

#![allow(clippy::unwrap_used)]

use serde_json::{Value, json};
use tsh_core::ItemId;
use tsh_integration_tests::{TestPortal, WEBHOOK_SECRET};
use url::form_urlencoded;

const SECRET_HEADER: &str = "x-zoho-webhook-secret";

async fn deliver(portal: &TestPortal, body: String, content_type: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(portal.at("/api/webhooks/zoho"))
        .header(SECRET_HEADER, WEBHOOK_SECRET)
        .header("content-type", content_type)
        .body(body)
        .send()
        .await
        .unwrap()
}

fn item_update(quantity: f64) -> String {
    json!({
        "item": {
            "item_id": "1001",
            "name": "HDMI Cable 2m",
            "sku": "HDMI-2M",
            "status": "active",
            "rate": 1000,
            "locations": [
                { "location_id": "500", "location_available_for_sale_stock": quantity }
            ]
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_item_webhook_patches_stock() {
    let portal = TestPortal::start().await;
    portal.state.sync().run().await.unwrap();

    let response = deliver(&portal, item_update(3.0), "application/json").await;
    assert_eq!(response.status(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["status"], "processed");
    assert_eq!(outcome["kind"], "item");
    assert_eq!(outcome["entity_id"], "1001");
    assert_eq!(outcome["stock_patched"], true);

    let quantity = portal
        .state
        .catalog()
        .stock()
        .quantity(&ItemId::new("1001"))
        .await
        .unwrap();
    assert!((quantity - 3.0).abs() < f64::EPSILON);

    // Identical redelivery
    let outcome: Value = deliver(&portal, item_update(3.0), "application/json")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["status"], "duplicate");
}

#[tokio::test]
async fn test_item_webhook_refreshes_detail() {
    let portal = TestPortal::start().await;

    let before: Value = reqwest::get(portal.at("/api/products/1001"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["name"], "HDMI Cable 2m");

    {
        let mut data = portal.zoho.data();
        for item in &mut data.items {
            if item["item_id"] == "1001" {
                item["name"] = json!("HDMI Cable 2m (Braided)");
            }
        }
    }

    let outcome: Value = deliver(
        &portal,
        json!({ "event_type": "item.updated", "data": { "item_id": "1001" } }).to_string(),
        "application/json",
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(outcome["status"], "processed");
    assert_eq!(outcome["stock_patched"], false);

    let after: Value = reqwest::get(portal.at("/api/products/1001"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["name"], "HDMI Cable 2m (Braided)");
}

#[tokio::test]
async fn test_form_encoded_delivery() {
    let portal = TestPortal::start().await;
    let payload = json!({ "contact": { "contact_id": "C-1", "contact_name": "Ali Hassan" } });
    let encoded: String = form_urlencoded::byte_serialize(payload.to_string().as_bytes()).collect();
    let form = format!("JSONString={encoded}");

    let outcome: Value = deliver(&portal, form, "application/x-www-form-urlencoded")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["status"], "processed");
    assert_eq!(outcome["kind"], "contact");
    assert_eq!(outcome["tags"], json!(["customer:C-1"]));
}

#[tokio::test]
async fn test_rejected_and_ignored_deliveries() {
    let portal = TestPortal::start().await;

    let wrong = reqwest::Client::new()
        .post(portal.at("/api/webhooks/zoho"))
        .header(SECRET_HEADER, "not-the-secret")
        .body(item_update(1.0))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let garbage = deliver(&portal, "not a payload".to_string(), "text/plain").await;
    assert_eq!(garbage.status(), 400);
    let body: Value = garbage.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let unhandled: Value = deliver(
        &portal,
        json!({ "event_type": "expense.created", "data": { "expense_id": "E-1" } }).to_string(),
        "application/json",
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(unhandled["status"], "ignored");
}
