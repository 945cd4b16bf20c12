//! Full-catalog stock synchronization.
//!
//! Zoho rate limits make per-request stock lookups too slow and too
//! expensive, so a background job pulls the whole active catalog, reduces
//! each item to its wholesale-warehouse quantity and writes one
//! [`StockSnapshot`]. A lock key keeps runs from overlapping across
//! instances and triggers (interval task, cron endpoint, CLI).

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};
use tsh_core::WarehouseId;
use uuid::Uuid;

use super::CatalogEntry;
use super::stock::{StockSnapshot, UnifiedStock, warehouse_stock};
use crate::cache::{CacheError, CacheLayer, keys};
use crate::config::SyncConfig;
use crate::kv::{self, KvError};
use crate::zoho::{Item, MAX_PER_PAGE, ZohoClient, ZohoError};

/// Hard stop for runaway pagination.
const MAX_PAGES: u32 = 500;

/// Error messages kept in the run report.
const MAX_ERROR_SAMPLES: usize = 10;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Zoho error: {0}")]
    Zoho(#[from] ZohoError),

    #[error("key-value store error: {0}")]
    Kv(#[from] KvError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("pagination exceeded {0} pages")]
    PaginationLimit(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Failed,
}

/// Summary of one run, stored under `stock:sync:last`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub status: SyncStatus,
    pub warehouse_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub pages: u32,
    pub items: usize,
    pub detail_fetches: usize,
    pub errors: usize,
    #[serde(default)]
    pub error_samples: Vec<String>,
}

/// Result of a sync trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another run holds the lock.
    Skipped { holder: Option<String> },
}

/// Runs stock syncs.
#[derive(Clone)]
pub struct StockSync {
    zoho: ZohoClient,
    stock: UnifiedStock,
    cache: CacheLayer,
    config: SyncConfig,
    catalog_ttl: Duration,
}

struct Progress {
    pages: u32,
    detail_fetches: usize,
    errors: usize,
    error_samples: Vec<String>,
}

impl Progress {
    fn record_error(&mut self, message: String) {
        self.errors += 1;
        if self.error_samples.len() < MAX_ERROR_SAMPLES {
            self.error_samples.push(message);
        }
    }
}

/// Quantity recorded for an item whose detail fetch failed.
///
/// A transient failure says nothing about the item, so the previous
/// snapshot's figure wins when there is one. Otherwise the list totals are
/// the best remaining guess.
fn fallback_quantity(
    error: &ZohoError,
    listed: &Item,
    previous: Option<&StockSnapshot>,
    warehouse_id: &WarehouseId,
) -> f64 {
    if error.is_transient()
        && let Some(quantity) = previous.and_then(|p| p.items.get(&listed.item_id))
    {
        return *quantity;
    }
    warehouse_stock(listed, warehouse_id)
}

impl StockSync {
    #[must_use]
    pub fn new(
        zoho: ZohoClient,
        stock: UnifiedStock,
        cache: CacheLayer,
        config: SyncConfig,
        catalog_ttl: Duration,
    ) -> Self {
        Self {
            zoho,
            stock,
            cache,
            config,
            catalog_ttl,
        }
    }

    /// Run a sync unless one is already in progress.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the lock cannot be taken or the pull fails.
    /// A failed pull still records a report and releases the lock.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncOutcome, SyncError> {
        let run_id = Uuid::new_v4().to_string();
        let kv = self.cache.kv();

        if !kv
            .set_nx(keys::SYNC_LOCK, &run_id, self.config.lock_ttl)
            .await?
        {
            let holder = kv.get(keys::SYNC_LOCK).await.ok().flatten();
            info!(holder = ?holder, "Stock sync already running, skipping");
            return Ok(SyncOutcome::Skipped { holder });
        }

        info!(run_id = %run_id, "Stock sync started");
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut progress = Progress {
            pages: 0,
            detail_fetches: 0,
            errors: 0,
            error_samples: Vec::new(),
        };

        let result = self.pull(&mut progress).await;

        let items = result.as_ref().map_or(0, |n| *n);
        let status = if result.is_ok() {
            SyncStatus::Completed
        } else {
            SyncStatus::Failed
        };
        if let Err(e) = &result {
            progress.record_error(e.to_string());
        }

        let report = SyncReport {
            run_id: run_id.clone(),
            status,
            warehouse_id: self.stock.warehouse_id().to_string(),
            started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            pages: progress.pages,
            items,
            detail_fetches: progress.detail_fetches,
            errors: progress.errors,
            error_samples: progress.error_samples,
        };

        if let Err(e) = kv::set_json(kv.as_ref(), keys::SYNC_LAST, &report, None).await {
            warn!(error = %e, "Failed to record sync report");
        }

        match kv.del_if_eq(keys::SYNC_LOCK, &run_id).await {
            Ok(true) => {}
            Ok(false) => warn!(run_id = %run_id, "Sync lock expired before the run finished"),
            Err(e) => warn!(error = %e, "Failed to release sync lock"),
        }

        match result {
            Ok(_) => {
                info!(
                    items = report.items,
                    pages = report.pages,
                    detail_fetches = report.detail_fetches,
                    errors = report.errors,
                    duration_ms = report.duration_ms,
                    "Stock sync completed"
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                error!(error = %e, "Stock sync failed");
                Err(e)
            }
        }
    }

    /// Pull the catalog and write the snapshot. Returns the item count.
    async fn pull(&self, progress: &mut Progress) -> Result<usize, SyncError> {
        let warehouse_id = self.stock.warehouse_id().clone();
        let mut snapshot = StockSnapshot::new(warehouse_id.clone());
        let mut catalog = Vec::new();
        let mut needs_detail: Vec<Item> = Vec::new();
        let previous = self.stock.snapshot().await;

        let mut page = 1;
        loop {
            if page > MAX_PAGES {
                return Err(SyncError::PaginationLimit(MAX_PAGES));
            }

            let batch = self.zoho.list_items(page, MAX_PER_PAGE).await?;
            progress.pages += 1;

            for item in batch.items.into_iter().filter(Item::is_active) {
                catalog.push(CatalogEntry::from(&item));
                if item.has_location_stock() {
                    snapshot
                        .items
                        .insert(item.item_id.clone(), warehouse_stock(&item, &warehouse_id));
                } else {
                    needs_detail.push(item);
                }
            }

            if !batch.has_more {
                break;
            }
            page += 1;
        }

        let batch_count = needs_detail.len().div_ceil(self.config.batch_size);
        for (index, chunk) in needs_detail.chunks(self.config.batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let results = join_all(chunk.iter().map(|item| self.zoho.get_item(&item.item_id))).await;
            progress.detail_fetches += chunk.len();

            for (listed, result) in chunk.iter().zip(results) {
                let quantity = match result {
                    Ok(detail) => warehouse_stock(&detail, &warehouse_id),
                    Err(e) => {
                        warn!(
                            item_id = %listed.item_id,
                            transient = e.is_transient(),
                            error = %e,
                            "Item detail fetch failed"
                        );
                        progress.record_error(format!("{}: {e}", listed.item_id));
                        fallback_quantity(&e, listed, previous.as_ref(), &warehouse_id)
                    }
                };
                snapshot.items.insert(listed.item_id.clone(), quantity);
            }

            tracing::debug!(batch = index + 1, of = batch_count, "Stock detail batch done");
        }

        snapshot.synced_at = Utc::now();
        self.stock.write_snapshot(&snapshot).await?;

        // Listing and detail entries may now show outdated names and rates
        self.cache
            .invalidate_tags(&[keys::tags::PRODUCTS.to_string()])
            .await?;
        self.cache
            .store(
                keys::CATALOG_ITEMS,
                &catalog,
                self.catalog_ttl,
                &[keys::tags::PRODUCTS.to_string()],
            )
            .await?;

        Ok(snapshot.items.len())
    }

    /// Report of the most recent run.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the store cannot be read.
    pub async fn last_report(&self) -> Result<Option<SyncReport>, KvError> {
        kv::get_json(self.cache.kv().as_ref(), keys::SYNC_LAST).await
    }

    /// Run id currently holding the lock.
    ///
    /// # Errors
    ///
    /// Returns `KvError` if the store cannot be read.
    pub async fn lock_holder(&self) -> Result<Option<String>, KvError> {
        self.cache.kv().get(keys::SYNC_LOCK).await
    }

    /// Run a sync every `interval`, starting immediately.
    pub fn spawn_interval(self, interval: Duration) -> JoinHandle<()> {
        info!(interval_secs = interval.as_secs(), "Scheduling stock sync");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run().await {
                    error!(error = %e, "Scheduled stock sync failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for StockSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockSync")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let skipped = SyncOutcome::Skipped {
            holder: Some("run-1".to_string()),
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["holder"], "run-1");
    }

    #[test]
    fn test_progress_caps_samples() {
        let mut progress = Progress {
            pages: 0,
            detail_fetches: 0,
            errors: 0,
            error_samples: Vec::new(),
        };
        for i in 0..25 {
            progress.record_error(format!("e{i}"));
        }
        assert_eq!(progress.errors, 25);
        assert_eq!(progress.error_samples.len(), MAX_ERROR_SAMPLES);
    }

    fn listed() -> Item {
        serde_json::from_str(r#"{"item_id": "7", "available_for_sale_stock": 40}"#).unwrap()
    }

    fn previous() -> StockSnapshot {
        let mut snapshot = StockSnapshot::new(WarehouseId::new("500"));
        snapshot.items.insert(tsh_core::ItemId::new("7"), 3.0);
        snapshot
    }

    #[test]
    fn test_transient_failure_keeps_previous_quantity() {
        let wh = WarehouseId::new("500");
        let error = ZohoError::RateLimited(5);
        let quantity = fallback_quantity(&error, &listed(), Some(&previous()), &wh);
        assert!((quantity - 3.0).abs() < f64::EPSILON);

        // Nothing known yet, list totals are all there is
        let quantity = fallback_quantity(&error, &listed(), None, &wh);
        assert!((quantity - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_permanent_failure_uses_list_totals() {
        let wh = WarehouseId::new("500");
        let error = ZohoError::NotFound("item 7".to_string());
        let quantity = fallback_quantity(&error, &listed(), Some(&previous()), &wh);
        assert!((quantity - 40.0).abs() < f64::EPSILON);
    }
}
