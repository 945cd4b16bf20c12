//! TSH wholesale portal library.
//!
//! This crate provides the portal API as a library, allowing it to be
//! tested and reused by the CLI and the integration tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod kv;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod zoho;

use axum::{Router, body::Body, http::Request};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.kv().clone(), state.config());

    routes::routes()
        .layer(session_layer)
        .with_state(state)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::to_bytes,
        http::{StatusCode, header::AUTHORIZATION},
    };
    use secrecy::SecretString;
    use serde_json::Value;
    use tower::ServiceExt;
    use tsh_core::{CustomerId, Email, PriceListId, WarehouseId};

    use super::*;
    use crate::config::{
        CacheTtls, EmailConfig, KvConfig, PortalConfig, SyncConfig, ZohoConfig,
    };
    use crate::kv::MemoryKv;
    use crate::models::CurrentCustomer;
    use crate::services::email::EmailService;

    const SECRET: &str = "k8#Qz!v2Lr9@Xw4$Tn6^Bp1&Hy3*Jm5%";

    fn config() -> PortalConfig {
        PortalConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            session_secret: SecretString::from(SECRET),
            jwt_secret: SecretString::from(SECRET),
            cron_secret: Some(SecretString::from("cron-secret")),
            webhook_secret: None,
            zoho: ZohoConfig {
                accounts_url: "http://127.0.0.1:9".to_string(),
                books_url: "http://127.0.0.1:9".to_string(),
                inventory_url: "http://127.0.0.1:9".to_string(),
                client_id: "id".to_string(),
                client_secret: SecretString::from("secret"),
                refresh_token: SecretString::from("refresh"),
                organization_id: "1".to_string(),
                wholesale_warehouse_id: WarehouseId::new("500"),
                default_price_list_id: PriceListId::new("default"),
            },
            kv: KvConfig::Memory,
            email: EmailConfig {
                resend_api_key: None,
                from: "TSH <noreply@tsh.sale>".to_string(),
            },
            cache: CacheTtls::default(),
            sync: SyncConfig {
                interval: None,
                ..SyncConfig::default()
            },
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    fn state() -> AppState {
        let config = config();
        let email = EmailService::new(&config.email).unwrap();
        AppState::with_parts(config, Arc::new(MemoryKv::new()), email).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(state());
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = app.oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_account_requires_auth() {
        let (status, json) = send(build_router(state()), get("/api/account")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "unauthorized");
        assert!(json["error"]["message"]["ar"].is_string());
    }

    #[tokio::test]
    async fn test_bad_bearer_is_rejected() {
        let request = Request::builder()
            .uri("/api/auth/me")
            .header(AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(build_router(state()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "invalid_token");
    }

    #[tokio::test]
    async fn test_bearer_access_token_authenticates() {
        let state = state();
        let customer = CurrentCustomer {
            id: CustomerId::new("42"),
            email: Email::parse("buyer@example.com").unwrap(),
            name: "Baghdad Trading".to_string(),
        };
        let tokens = state.auth().issue_tokens(&customer).await.unwrap();

        let request = Request::builder()
            .uri("/api/auth/me?lang=ar")
            .header(AUTHORIZATION, format!("Bearer {}", tokens.access_token))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(build_router(state), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["customer"]["id"], "42");
        assert_eq!(json["locale"], "ar");
    }

    #[tokio::test]
    async fn test_sync_requires_cron_secret() {
        let app = build_router(state());

        let (status, _) = send(app.clone(), get("/api/sync/status")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(app.clone(), get("/api/sync/status?secret=wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = send(app, get("/api/sync/status?secret=cron-secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["running"], false);
        assert!(json["last"].is_null());
    }

    #[tokio::test]
    async fn test_webhooks_off_without_secret() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/webhooks/zoho")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = send(build_router(state()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_email_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/request")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"email":"not-an-email"}"#))
            .unwrap();
        let (status, json) = send(build_router(state()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_email");
    }

    #[tokio::test]
    async fn test_logout_without_session() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/logout")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
