//! Fetch → normalize → persist pipelines shared by the server and the CLI.

pub mod error;
pub mod products;
pub mod report;
pub mod sales;
pub mod summary;
pub mod webhook;

mod tracked;

pub use error::SyncError;
pub use products::{preview_products_sync, run_products_sync};
pub use report::{sales_summary, summarize_orders, BucketTotal, SalesSummary};
pub use sales::{preview_sales_sync, run_sales_sync, SalesSyncRequest};
pub use summary::{SyncOptions, SyncSummary, TriggerSource};
pub use webhook::{ingest_webhook, WebhookOutcome};
