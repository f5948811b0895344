use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::db::PriceStore;
use crate::error::{AppError, Result};
use crate::fetcher::{FetchOutcome, PriceSource};
use crate::types::{now_ns, ItemRef, RunSummary};

/// Drives one collection pass: every tracked item is fetched and written on
/// its own, so a bad item never takes the rest of the pass down with it.
pub struct Collector {
    source: Arc<dyn PriceSource>,
    store: PriceStore,
}

/// Book-keeping for one pass. Lives only for the duration of `run_collection`.
struct CollectionRun {
    started_at: DateTime<Utc>,
    started: Instant,
    total: usize,
    succeeded: usize,
    failed: usize,
}

impl CollectionRun {
    fn begin(total: usize) -> Self {
        Self { started_at: Utc::now(), started: Instant::now(), total, succeeded: 0, failed: 0 }
    }

    fn finish(self) -> RunSummary {
        RunSummary {
            succeeded: self.succeeded,
            failed: self.failed,
            total: self.total,
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

enum ItemResult {
    Updated,
    Skipped,
}

impl Collector {
    pub fn new(source: Arc<dyn PriceSource>, store: PriceStore) -> Self {
        Self { source, store }
    }

    /// Sweeps every tracked item once. Only failing to list the items aborts
    /// the pass; per-item errors are logged and counted.
    pub async fn run_collection(&self) -> Result<RunSummary> {
        let items = self.store.list_tracked_items().await?;
        let mut run = CollectionRun::begin(items.len());

        info!(source = %self.source.source(), items = run.total, "collection pass started");

        for item in &items {
            match self.collect_item(item).await {
                Ok(ItemResult::Updated) => run.succeeded += 1,
                Ok(ItemResult::Skipped) => run.failed += 1,
                Err(e) => {
                    run.failed += 1;
                    error!(item_id = item.id, market_name = %item.market_name, error = %e, "item update failed");
                }
            }
        }

        let summary = run.finish();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            total = summary.total,
            duration_ms = summary.duration_ms,
            "Collection pass complete: {}/{} updated, {} failed in {}ms",
            summary.succeeded,
            summary.total,
            summary.failed,
            summary.duration_ms,
        );
        Ok(summary)
    }

    async fn collect_item(&self, item: &ItemRef) -> Result<ItemResult> {
        let source = self.source.source();

        let quote = match self.source.fetch_price(&item.market_name).await {
            Ok(FetchOutcome::Price(q)) => q,
            Ok(FetchOutcome::NotFound) => {
                warn!(item_id = item.id, market_name = %item.market_name, "skipped: no listing");
                return Ok(ItemResult::Skipped);
            }
            Err(e) => {
                warn!(item_id = item.id, market_name = %item.market_name, error = %e, "skipped: fetch failed");
                return Ok(ItemResult::Skipped);
            }
        };

        match self
            .store
            .append_price_point(item.id, quote.price, quote.volume, source, now_ns())
            .await
        {
            Ok(_) => {}
            Err(AppError::Validation(msg)) => {
                warn!(item_id = item.id, market_name = %item.market_name, reason = %msg, "skipped: invalid price");
                return Ok(ItemResult::Skipped);
            }
            Err(e) => return Err(e),
        }

        // The point stays recorded even if the projection write fails.
        self.store
            .update_current_price(item.id, source, quote.price, quote.volume)
            .await?;

        info!(item_id = item.id, market_name = %item.market_name, price = quote.price, "price collected");
        Ok(ItemResult::Updated)
    }
}
