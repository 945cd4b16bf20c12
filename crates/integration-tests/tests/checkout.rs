//! Checkout against the fake Books organization.

#![allow(clippy::unwrap_used)]

use serde_json::{Value, json};
use tsh_core::ItemId;
use tsh_integration_tests::{CUSTOMER_ID, TestPortal, WAREHOUSE_ID, WHOLESALE_LIST, amount};

async fn checkout(portal: &TestPortal, token: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(portal.at("/api/checkout"))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .unwrap()
}

fn decimal(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.as_f64().unwrap(),
    }
}

#[tokio::test]
async fn test_checkout_places_confirmed_invoiced_order() {
    let portal = TestPortal::start().await;
    portal.state.sync().run().await.unwrap();
    let token = portal.access_token().await;

    let response = checkout(
        &portal,
        &token,
        &json!({
            "lines": [
                { "item_id": "1001", "quantity": 2 },
                { "item_id": "1002", "quantity": 1 },
                { "item_id": "1001", "quantity": 1 }
            ],
            "reference": "PO-7781"
        }),
    )
    .await;
    assert_eq!(response.status(), 201);

    let receipt: Value = response.json().await.unwrap();
    assert_eq!(receipt["salesorder_id"], "SO-1");
    assert_eq!(receipt["invoice_id"], "INV-1");
    assert_eq!(receipt["lines"].as_array().unwrap().len(), 2);
    assert_eq!(receipt["lines"][0]["quantity"], 3);
    assert_eq!(amount(&receipt["lines"][0]["unit_price"]), Some(800.0));
    assert_eq!(receipt["lines"][0]["price_source"], "customer");
    assert_eq!(amount(&receipt["lines"][1]["unit_price"]), Some(2000.0));
    assert_eq!(amount(&receipt["total"]), Some(4400.0));

    {
        let data = portal.zoho.data();
        let order = &data.salesorders[0];
        assert_eq!(order["customer_id"], CUSTOMER_ID);
        assert_eq!(order["pricebook_id"], WHOLESALE_LIST);
        assert_eq!(order["reference_number"], "PO-7781");
        assert_eq!(order["status"], "open");
        assert_eq!(order["line_items"][0]["location_id"], WAREHOUSE_ID);
        assert!((decimal(&order["line_items"][0]["rate"]) - 800.0).abs() < f64::EPSILON);
        assert_eq!(data.invoices.len(), 1);
    }

    let remaining = portal
        .state
        .catalog()
        .stock()
        .quantity(&ItemId::new("1001"))
        .await
        .unwrap();
    assert!((remaining - 7.0).abs() < f64::EPSILON);

    // The new order shows up in the customer's history
    let orders: Value = reqwest::Client::new()
        .get(portal.at("/api/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(orders["items"][0]["salesorder_id"], "SO-1");
}

#[tokio::test]
async fn test_checkout_refuses_shortage() {
    let portal = TestPortal::start().await;
    portal.state.sync().run().await.unwrap();
    let token = portal.access_token().await;

    let response = checkout(
        &portal,
        &token,
        &json!({ "lines": [
            { "item_id": "1001", "quantity": 11 },
            { "item_id": "1003", "quantity": 1 }
        ] }),
    )
    .await;
    assert_eq!(response.status(), 409);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "insufficient_stock");
    let items = body["error"]["details"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["item_id"], "1001");
    assert_eq!(items[0]["requested"], 11);
    assert_eq!(items[0]["available"], 10.0);
    assert!(portal.zoho.data().salesorders.is_empty());
}

#[tokio::test]
async fn test_checkout_validation() {
    let portal = TestPortal::start().await;
    let token = portal.access_token().await;

    let empty = checkout(&portal, &token, &json!({ "lines": [] })).await;
    assert_eq!(empty.status(), 400);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["error"]["code"], "empty_cart");

    let unknown = checkout(
        &portal,
        &token,
        &json!({ "lines": [{ "item_id": "1004", "quantity": 1 }] }),
    )
    .await;
    assert_eq!(unknown.status(), 400);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unknown_items");

    let anonymous = reqwest::Client::new()
        .post(portal.at("/api/checkout"))
        .json(&json!({ "lines": [{ "item_id": "1001", "quantity": 1 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);
}

#[tokio::test]
async fn test_checkout_reports_incomplete_order() {
    let portal = TestPortal::start().await;
    portal.zoho.data().fail_confirm = true;
    let token = portal.access_token().await;

    let response = checkout(
        &portal,
        &token,
        &json!({ "lines": [{ "item_id": "1001", "quantity": 1 }] }),
    )
    .await;
    assert_eq!(response.status(), 502);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "order_incomplete");
    assert_eq!(body["error"]["details"]["step"], "confirm");
    assert_eq!(body["error"]["details"]["salesorder_id"], "SO-1");
    assert!(portal.zoho.data().invoices.is_empty());
}
