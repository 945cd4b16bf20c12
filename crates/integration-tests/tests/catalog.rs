//! Product listing, detail and image routes.

#![allow(clippy::unwrap_used)]

use serde_json::Value;
use tsh_integration_tests::{TestPortal, amount};
use tsh_storefront::catalog::sync::SyncError;

fn product<'a>(page: &'a Value, id: &str) -> &'a Value {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == id)
        .unwrap()
}

#[tokio::test]
async fn test_guest_sees_default_prices() {
    let portal = TestPortal::start().await;

    let page: Value = reqwest::get(portal.at("/api/products"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Inactive 1004 is hidden
    assert_eq!(page["total"], 3);
    let cable = product(&page, "1001");
    assert_eq!(amount(&cable["price"]), Some(1000.0));
    assert_eq!(cable["price_source"], "default");
    assert_eq!(cable["stock"], 10.0);
    assert_eq!(cable["image_url"], "/api/products/1001/image");
}

#[tokio::test]
async fn test_customer_sees_price_list() {
    let portal = TestPortal::start().await;
    let token = portal.access_token().await;

    let page: Value = reqwest::Client::new()
        .get(portal.at("/api/products"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let cable = product(&page, "1001");
    assert_eq!(amount(&cable["price"]), Some(800.0));
    assert_eq!(cable["price_source"], "customer");

    // Not on the wholesale list, falls back to the consumer price
    let router = product(&page, "1002");
    assert_eq!(amount(&router["price"]), Some(2000.0));
    assert_eq!(router["price_source"], "default");
}

#[tokio::test]
async fn test_search_and_stock_filter() {
    let portal = TestPortal::start().await;
    portal.state.sync().run().await.unwrap();

    let page: Value = reqwest::get(portal.at("/api/products?q=router"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], "1002");
    assert_eq!(page["items"][0]["stock"], 4.0);

    let page: Value = reqwest::get(portal.at("/api/products?in_stock=true"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["1001", "1002"]);
}

#[tokio::test]
async fn test_product_detail_and_missing() {
    let portal = TestPortal::start().await;

    let detail: Value = reqwest::get(portal.at("/api/products/1002"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["sku"], "RT-AX3000");
    assert_eq!(detail["stock"], 4.0);
    assert_eq!(detail["in_stock"], true);

    let missing = reqwest::get(portal.at("/api/products/9999")).await.unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let inactive = reqwest::get(portal.at("/api/products/1004")).await.unwrap();
    assert_eq!(inactive.status(), 404);
}

#[tokio::test]
async fn test_product_image_is_cacheable() {
    let portal = TestPortal::start().await;

    let response = reqwest::get(portal.at("/api/products/1001/image"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.headers()["cache-control"], "public, max-age=3600");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"\x89PNG fake");

    let none = reqwest::get(portal.at("/api/products/1002/image"))
        .await
        .unwrap();
    assert_eq!(none.status(), 404);
}

#[tokio::test]
async fn test_page_far_past_the_end_is_empty() {
    let portal = TestPortal::start().await;
    portal.state.sync().run().await.unwrap();

    let response = reqwest::get(portal.at("/api/products?page=50000000&per_page=100"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let page: Value = response.json().await.unwrap();
    assert_eq!(page["page"], 50_000_000);
    assert_eq!(page["total"], 3);
    assert_eq!(page["has_more"], false);
    assert!(page["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_endless_pagination_stops_at_the_page_limit() {
    let portal = TestPortal::start().await;
    portal.zoho.data().endless_items = true;

    // The sync refuses to write a partial snapshot
    let err = portal.state.sync().run().await.unwrap_err();
    assert!(matches!(err, SyncError::PaginationLimit(500)));
    assert_eq!(portal.zoho.data().item_list_fetches, 500);

    // The listing serves what the capped pull collected
    let page: Value = reqwest::get(portal.at("/api/products"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(portal.zoho.data().item_list_fetches, 1000);
}
