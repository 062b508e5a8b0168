pub mod amount;
pub mod classify;
pub mod client;
pub mod date;
pub mod error;
pub mod normalize;
pub mod pagination;
pub mod path;
pub mod retry;
pub mod token;
pub mod webhook;
pub mod window;

pub use classify::{classify_payload, Bucket, Classification};
pub use client::{ClientSettings, FetchSummary, KiwifyClient, WindowedFetch};
pub use error::IngestError;
pub use normalize::{
    normalize_customer, normalize_product, normalize_products_batch, normalize_sale,
    normalize_sales_batch, NormalizedBatch, NormalizedSale,
};
pub use retry::RetryPolicy;
pub use token::{TokenCache, TokenSource};
pub use webhook::resolve_webhook;
pub use window::{split_windows, DateWindow};
