//! Wholesale stock levels.
//!
//! Zoho reports stock in three places depending on the endpoint and the
//! organization's setup: per location, per warehouse, and as item-level
//! totals. [`warehouse_stock`] reduces an item to the quantity available in
//! the wholesale warehouse.
//!
//! The sync job writes a [`StockSnapshot`] of the whole catalog under one
//! key. [`UnifiedStock`] reads it first and falls back to a live item fetch,
//! patching the result back into the snapshot. Patches keep the snapshot's
//! original expiry, so staleness stays bounded by the last full sync.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use tsh_core::{ItemId, WarehouseId};

use crate::cache::keys;
use crate::kv::{self, SharedKv};
use crate::zoho::{Item, ZohoClient, ZohoError};

/// Concurrent live fetches when the snapshot misses several items.
const LIVE_FETCH_CONCURRENCY: usize = 4;

/// Quantity available for sale in `warehouse_id`. Never negative.
///
/// Item-level totals are only trusted when the item carries no per-location
/// breakdown; otherwise they include other warehouses.
#[must_use]
pub fn warehouse_stock(item: &Item, warehouse_id: &WarehouseId) -> f64 {
    let wanted = warehouse_id.as_str();

    let from_locations = item
        .locations
        .iter()
        .find(|l| l.location_id.as_deref() == Some(wanted))
        .map(|l| {
            l.location_available_for_sale_stock
                .or(l.location_stock_on_hand)
                .unwrap_or_default()
        });

    let from_warehouses = || {
        item.warehouses
            .iter()
            .find(|w| w.warehouse_id.as_deref() == Some(wanted))
            .map(|w| {
                w.warehouse_available_for_sale_stock
                    .or(w.warehouse_stock_on_hand)
                    .unwrap_or_default()
            })
    };

    let quantity = from_locations.or_else(from_warehouses).unwrap_or_else(|| {
        if item.has_location_stock() {
            // Breakdown exists but the wholesale warehouse is not in it
            0.0
        } else {
            item.available_for_sale_stock
                .or(item.actual_available_stock)
                .or(item.stock_on_hand)
                .unwrap_or_default()
        }
    });

    if quantity.is_finite() { quantity.max(0.0) } else { 0.0 }
}

/// Stock of every active item in one warehouse at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub warehouse_id: WarehouseId,
    pub synced_at: DateTime<Utc>,
    pub items: HashMap<ItemId, f64>,
}

impl StockSnapshot {
    #[must_use]
    pub fn new(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            synced_at: Utc::now(),
            items: HashMap::new(),
        }
    }

    /// Time left before the snapshot expires, given its full lifetime.
    #[must_use]
    pub fn remaining_ttl(&self, ttl: Duration) -> Option<Duration> {
        let age = (Utc::now() - self.synced_at).to_std().unwrap_or_default();
        ttl.checked_sub(age).filter(|d| !d.is_zero())
    }
}

/// Snapshot-first stock lookups with live fallback.
#[derive(Clone)]
pub struct UnifiedStock {
    kv: SharedKv,
    zoho: ZohoClient,
    warehouse_id: WarehouseId,
    ttl: Duration,
}

impl UnifiedStock {
    #[must_use]
    pub fn new(kv: SharedKv, zoho: ZohoClient, warehouse_id: WarehouseId, ttl: Duration) -> Self {
        Self {
            kv,
            zoho,
            warehouse_id,
            ttl,
        }
    }

    #[must_use]
    pub fn warehouse_id(&self) -> &WarehouseId {
        &self.warehouse_id
    }

    fn key(&self) -> String {
        keys::stock_snapshot(&self.warehouse_id)
    }

    /// Current snapshot, if one exists and is readable.
    pub async fn snapshot(&self) -> Option<StockSnapshot> {
        match kv::get_json::<StockSnapshot>(self.kv.as_ref(), &self.key()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to read stock snapshot");
                None
            }
        }
    }

    /// Replace the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the write fails.
    pub async fn write_snapshot(&self, snapshot: &StockSnapshot) -> Result<(), kv::KvError> {
        kv::set_json(self.kv.as_ref(), &self.key(), snapshot, Some(self.ttl)).await
    }

    /// Stock of one item.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if the snapshot misses the item and the live
    /// fetch fails.
    pub async fn quantity(&self, item_id: &ItemId) -> Result<f64, ZohoError> {
        let quantities = self.quantities(std::slice::from_ref(item_id)).await?;
        Ok(quantities.get(item_id).copied().unwrap_or_default())
    }

    /// Stock of several items.
    ///
    /// # Errors
    ///
    /// Returns `ZohoError` if any item missing from the snapshot cannot be
    /// fetched live.
    #[instrument(skip(self, item_ids), fields(count = item_ids.len()))]
    pub async fn quantities(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, f64>, ZohoError> {
        let snapshot = self.snapshot().await;

        let mut found = HashMap::with_capacity(item_ids.len());
        let mut missing = Vec::new();
        for id in item_ids {
            match snapshot.as_ref().and_then(|s| s.items.get(id)) {
                Some(qty) => {
                    found.insert(id.clone(), *qty);
                }
                None => missing.push(id.clone()),
            }
        }

        if missing.is_empty() {
            return Ok(found);
        }

        debug!(
            missing = missing.len(),
            has_snapshot = snapshot.is_some(),
            "Stock snapshot miss, fetching live"
        );

        let live: Vec<(ItemId, f64)> = stream::iter(missing)
            .map(|id| async move {
                let item = self.zoho.get_item(&id).await?;
                Ok::<_, ZohoError>((id, warehouse_stock(&item, &self.warehouse_id)))
            })
            .buffer_unordered(LIVE_FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        self.patch(&live).await;
        found.extend(live);
        Ok(found)
    }

    /// Overwrite quantities in the existing snapshot.
    ///
    /// Does nothing when there is no snapshot; the next sync writes one.
    pub async fn patch(&self, updates: &[(ItemId, f64)]) {
        self.modify(|snapshot| {
            for (id, qty) in updates {
                snapshot.items.insert(id.clone(), qty.max(0.0));
            }
        })
        .await;
    }

    /// Subtract ordered quantities from the snapshot.
    pub async fn decrement(&self, ordered: &[(ItemId, f64)]) {
        self.modify(|snapshot| {
            for (id, qty) in ordered {
                if let Some(current) = snapshot.items.get_mut(id) {
                    *current = (*current - qty).max(0.0);
                }
            }
        })
        .await;
    }

    /// Patch the snapshot from an item payload (webhook or live fetch).
    pub async fn apply_item(&self, item: &Item) -> f64 {
        let quantity = warehouse_stock(item, &self.warehouse_id);
        self.patch(&[(item.item_id.clone(), quantity)]).await;
        quantity
    }

    /// Read-modify-write of the snapshot, preserving its expiry.
    ///
    /// Concurrent modifications can lose an update; the next full sync
    /// corrects it.
    async fn modify(&self, f: impl FnOnce(&mut StockSnapshot)) {
        let Some(mut snapshot) = self.snapshot().await else {
            return;
        };
        let Some(ttl) = snapshot.remaining_ttl(self.ttl) else {
            return;
        };

        f(&mut snapshot);

        if let Err(e) = kv::set_json(self.kv.as_ref(), &self.key(), &snapshot, Some(ttl)).await {
            warn!(error = %e, "Failed to patch stock snapshot");
        }
    }
}

impl std::fmt::Debug for UnifiedStock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedStock")
            .field("warehouse_id", &self.warehouse_id)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
