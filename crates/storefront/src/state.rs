//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::CacheLayer;
use crate::catalog::CatalogService;
use crate::catalog::pricing::PricingService;
use crate::catalog::stock::UnifiedStock;
use crate::catalog::sync::StockSync;
use crate::config::PortalConfig;
use crate::kv::{self, KvError, SharedKv};
use crate::services::auth::{AuthService, JwtIssuer};
use crate::services::checkout::CheckoutService;
use crate::services::email::{EmailError, EmailService};
use crate::services::portal::PortalService;
use crate::services::webhooks::WebhookService;
use crate::zoho::{ZohoClient, ZohoError};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("key-value store: {0}")]
    Kv(#[from] KvError),
    #[error("Zoho client: {0}")]
    Zoho(#[from] ZohoError),
    #[error("email client: {0}")]
    Email(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Every service holds clones of the same
/// store and Zoho client, so tokens, caches and locks are shared.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PortalConfig,
    kv: SharedKv,
    zoho: ZohoClient,
    cache: CacheLayer,
    catalog: CatalogService,
    sync: StockSync,
    portal: PortalService,
    checkout: CheckoutService,
    webhooks: WebhookService,
    auth: AuthService,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the store, Zoho or email HTTP clients cannot be
    /// built.
    pub fn new(config: PortalConfig) -> Result<Self, StateError> {
        let kv = kv::from_config(&config.kv)?;
        let email = EmailService::new(&config.email)?;
        Self::with_parts(config, kv, email)
    }

    /// Create application state around an existing store and mailer.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Zoho` if the Zoho HTTP client cannot be built.
    pub fn with_parts(
        config: PortalConfig,
        kv: SharedKv,
        email: EmailService,
    ) -> Result<Self, StateError> {
        let zoho = ZohoClient::new(&config.zoho, kv.clone())?;
        let cache = CacheLayer::new(kv.clone());
        let ttls = config.cache;

        let stock = UnifiedStock::new(
            kv.clone(),
            zoho.clone(),
            config.zoho.wholesale_warehouse_id.clone(),
            ttls.stock,
        );
        let pricing = PricingService::new(zoho.clone(), cache.clone(), ttls);
        let catalog = CatalogService::new(
            zoho.clone(),
            cache.clone(),
            stock.clone(),
            pricing,
            ttls,
        );
        let sync = StockSync::new(zoho.clone(), stock, cache.clone(), config.sync, ttls.product);
        let portal = PortalService::new(zoho.clone(), cache.clone(), ttls);
        let checkout = CheckoutService::new(zoho.clone(), catalog.clone(), cache.clone());
        let webhooks = WebhookService::new(
            cache.clone(),
            catalog.clone(),
            config.webhook_secret.clone(),
        );
        let auth = AuthService::new(
            kv.clone(),
            zoho.clone(),
            email,
            JwtIssuer::new(&config.jwt_secret, kv.clone()),
            config.session_secret.clone(),
            config.base_url.clone(),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                kv,
                zoho,
                cache,
                catalog,
                sync,
                portal,
                checkout,
                webhooks,
                auth,
            }),
        })
    }

    /// Get a reference to the portal configuration.
    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// Get a reference to the key-value store.
    #[must_use]
    pub fn kv(&self) -> &SharedKv {
        &self.inner.kv
    }

    /// Get a reference to the Zoho API client.
    #[must_use]
    pub fn zoho(&self) -> &ZohoClient {
        &self.inner.zoho
    }

    #[must_use]
    pub fn cache(&self) -> &CacheLayer {
        &self.inner.cache
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    /// Get a reference to the stock sync runner.
    #[must_use]
    pub fn sync(&self) -> &StockSync {
        &self.inner.sync
    }

    #[must_use]
    pub fn portal(&self) -> &PortalService {
        &self.inner.portal
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn webhooks(&self) -> &WebhookService {
        &self.inner.webhooks
    }

    /// Get a reference to the login service.
    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }
}
