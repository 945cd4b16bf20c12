//! Stock sync against the fake Zoho catalog.

#![allow(clippy::unwrap_used)]

use serde_json::Value;
use tsh_core::ItemId;
use tsh_integration_tests::{CRON_SECRET, TestPortal};
use tsh_storefront::cache::keys;
use tsh_storefront::catalog::sync::SyncOutcome;
use tsh_storefront::kv::KvStore;

#[tokio::test]
async fn test_sync_builds_snapshot() {
    let portal = TestPortal::start().await;

    let outcome = portal.state.sync().run().await.unwrap();
    let SyncOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };

    // 1004 is inactive; 1002 needs a detail fetch for per-location stock
    assert_eq!(report.items, 3);
    assert_eq!(report.pages, 1);
    assert_eq!(report.detail_fetches, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(portal.zoho.data().item_fetches, 1);

    let snapshot = portal.state.catalog().stock().snapshot().await.unwrap();
    assert_eq!(snapshot.items.get(&ItemId::new("1001")), Some(&10.0));
    assert_eq!(snapshot.items.get(&ItemId::new("1002")), Some(&4.0));
    assert_eq!(snapshot.items.get(&ItemId::new("1003")), Some(&0.0));
    assert!(!snapshot.items.contains_key(&ItemId::new("1004")));

    assert!(portal.state.sync().lock_holder().await.unwrap().is_none());
}

#[tokio::test]
async fn test_sync_skips_while_locked() {
    let portal = TestPortal::start().await;
    portal
        .state
        .kv()
        .set_nx(keys::SYNC_LOCK, "other-run", std::time::Duration::from_secs(60))
        .await
        .unwrap();

    let outcome = portal.state.sync().run().await.unwrap();
    match outcome {
        SyncOutcome::Skipped { holder } => assert_eq!(holder.as_deref(), Some("other-run")),
        SyncOutcome::Completed(_) => panic!("run should have been skipped"),
    }
    assert_eq!(portal.zoho.data().item_list_fetches, 0);
}

#[tokio::test]
async fn test_sync_over_http() {
    let portal = TestPortal::start().await;
    let client = reqwest::Client::new();

    let unauthorized = client
        .post(portal.at("/api/sync/stock"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), 401);

    let body: Value = client
        .post(portal.at("/api/sync/stock"))
        .bearer_auth(CRON_SECRET)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["items"], 3);

    let status: Value = client
        .get(portal.at(&format!("/api/sync/status?secret={CRON_SECRET}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["running"], false);
    assert_eq!(status["last"]["status"], "completed");
    assert_eq!(status["last"]["warehouse_id"], "500");
}

#[tokio::test]
async fn test_sync_refreshes_listing_stock() {
    let portal = TestPortal::start().await;
    portal.state.sync().run().await.unwrap();
    portal.zoho.set_stock("1003", 7.0);
    portal.state.sync().run().await.unwrap();

    let body: Value = reqwest::get(portal.at("/api/products?in_stock=true"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"1003"));
}
