use kiwidash_core::AppConfig;
use kiwidash_db::{SinkReport, SyncRunCounters};
use kiwidash_ingest::{FetchSummary, NormalizedBatch};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who asked for a sync. Stored on the run row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Api,
    Cli,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Api => "api",
            TriggerSource::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub trigger: TriggerSource,
    pub chunk_size: usize,
}

impl SyncOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, trigger: TriggerSource) -> Self {
        Self {
            trigger,
            chunk_size: config.upsert_chunk_size,
        }
    }
}

/// What one sync did. Returned to API and CLI callers as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Public id of the run row; `None` for dry runs.
    pub run_id: Option<Uuid>,
    pub products: usize,
    pub customers: usize,
    pub orders: usize,
    pub sales_fetched: usize,
    /// Sales dropped during normalization or order validation.
    pub sales_dropped: usize,
    pub orders_unresolved: usize,
    pub products_fetched: usize,
    pub products_dropped: usize,
    pub total_intervals: usize,
    pub total_pages: usize,
}

impl SyncSummary {
    /// Counts for a batch that was normalized but not written.
    pub(crate) fn preview(batch: &NormalizedBatch, fetch: FetchSummary) -> Self {
        Self {
            products: batch.products.len(),
            customers: batch.customers.len(),
            orders: batch.orders.len(),
            total_intervals: fetch.total_intervals,
            total_pages: fetch.total_pages,
            ..Self::default()
        }
    }

    pub(crate) fn persisted(fetch: FetchSummary, report: SinkReport) -> Self {
        Self {
            products: report.products,
            customers: report.customers,
            orders: report.orders,
            orders_unresolved: report.orders_unresolved,
            total_intervals: fetch.total_intervals,
            total_pages: fetch.total_pages,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn dropped(&self) -> usize {
        self.sales_dropped + self.orders_unresolved + self.products_dropped
    }

    #[must_use]
    pub fn counters(&self) -> SyncRunCounters {
        let clamp = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
        SyncRunCounters {
            products_upserted: clamp(self.products),
            customers_upserted: clamp(self.customers),
            orders_upserted: clamp(self.orders),
            records_dropped: clamp(self.dropped()),
            total_intervals: clamp(self.total_intervals),
            total_pages: clamp(self.total_pages),
        }
    }
}
