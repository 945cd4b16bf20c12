//! Retry behavior of the Zoho client against injected 429 and 401 faults.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tsh_core::CustomerId;
use tsh_integration_tests::{CUSTOMER_ID, FakeZoho, TestPortal};
use tsh_storefront::kv::MemoryKv;
use tsh_storefront::zoho::{RetryPolicy, ZohoClient, ZohoError};

async fn client() -> (FakeZoho, ZohoClient) {
    let fake = FakeZoho::seeded().await;
    let config = TestPortal::config(&fake, "http://127.0.0.1:9");
    let retry = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };
    let client =
        ZohoClient::with_retry_policy(&config.zoho, Arc::new(MemoryKv::new()), retry).unwrap();
    (fake, client)
}

#[tokio::test]
async fn test_recovers_after_rate_limits() {
    let (fake, client) = client().await;
    fake.data().rate_limited = 3;

    let contact = client.get_contact(&CustomerId::new(CUSTOMER_ID)).await.unwrap();
    assert_eq!(contact.contact_id, CustomerId::new(CUSTOMER_ID));
    assert_eq!(fake.data().api_requests, 4);
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let (fake, client) = client().await;
    fake.data().rate_limited = 4;

    let err = client
        .get_contact(&CustomerId::new(CUSTOMER_ID))
        .await
        .unwrap_err();
    assert!(matches!(err, ZohoError::RateLimited(1)));
    assert!(err.is_transient());
    assert_eq!(fake.data().api_requests, 4);
}

#[tokio::test]
async fn test_refreshes_token_once_on_unauthorized() {
    let (fake, client) = client().await;
    fake.data().unauthorized = 1;

    client.get_contact(&CustomerId::new(CUSTOMER_ID)).await.unwrap();
    let data = fake.data();
    assert_eq!(data.token_grants, 2);
    assert_eq!(data.api_requests, 2);
}

#[tokio::test]
async fn test_second_unauthorized_is_not_retried() {
    let (fake, client) = client().await;
    fake.data().unauthorized = 2;

    let err = client
        .get_contact(&CustomerId::new(CUSTOMER_ID))
        .await
        .unwrap_err();
    assert!(matches!(err, ZohoError::Unauthorized(_)));
    assert!(!err.is_transient());

    let data = fake.data();
    assert_eq!(data.api_requests, 2);
    assert_eq!(data.token_grants, 2);
}
