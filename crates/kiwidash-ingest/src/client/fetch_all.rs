//! Multi-page and multi-window fetch loops for `KiwifyClient`.

use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::error::IngestError;
use crate::pagination::ListingPage;
use crate::window::{split_windows, DateWindow};

use super::{KiwifyClient, MAX_PAGES_PER_WINDOW, PRODUCTS_PATH, SALES_PATH};

/// Counters describing how much was fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub total_intervals: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Every raw sale across all windows, plus counters.
#[derive(Debug, Clone, Default)]
pub struct WindowedFetch {
    pub sales: Vec<Value>,
    pub summary: FetchSummary,
}

impl KiwifyClient {
    /// Fetches every sale between `start` and `end` (inclusive; `None` means
    /// the single day `start`), splitting the range into windows Kiwify will
    /// accept and paging through each in turn.
    ///
    /// Windows and pages are fetched sequentially. Any page failure aborts
    /// the whole fetch; nothing partial is returned.
    ///
    /// # Errors
    ///
    /// - [`IngestError::InvalidRange`] if `start` is after `end`.
    /// - [`IngestError::PaginationLimit`] if a window exceeds
    ///   [`MAX_PAGES_PER_WINDOW`] pages.
    /// - Any error from [`Self::fetch_sales_page`].
    pub async fn fetch_all_sales_by_window(
        &self,
        start: NaiveDate,
        end: Option<NaiveDate>,
        page_size: u32,
    ) -> Result<WindowedFetch, IngestError> {
        let windows = split_windows(start, end)?;
        let page_size = page_size.max(1);
        let mut out = WindowedFetch {
            summary: FetchSummary {
                total_intervals: windows.len(),
                ..FetchSummary::default()
            },
            ..WindowedFetch::default()
        };

        for window in &windows {
            let (items, pages) = self.fetch_window(window, page_size).await?;
            tracing::debug!(
                start = %window.start,
                end = %window.end,
                pages,
                items = items.len(),
                "fetched sales window"
            );
            out.summary.total_pages += pages;
            out.sales.extend(items);
        }

        out.summary.total_items = out.sales.len();
        tracing::info!(
            intervals = out.summary.total_intervals,
            pages = out.summary.total_pages,
            items = out.summary.total_items,
            "sales fetch complete"
        );
        Ok(out)
    }

    /// Fetches every product page.
    ///
    /// # Errors
    ///
    /// - [`IngestError::PaginationLimit`] past [`MAX_PAGES_PER_WINDOW`] pages.
    /// - Any error from [`Self::fetch_products_page`].
    pub async fn fetch_all_products(
        &self,
        page_size: u32,
    ) -> Result<(Vec<Value>, FetchSummary), IngestError> {
        let page_size = page_size.max(1);
        let (items, pages) = page_through(PRODUCTS_PATH, page_size, |page_number| {
            self.fetch_products_page(page_number, page_size)
        })
        .await?;
        let summary = FetchSummary {
            total_intervals: 1,
            total_pages: pages,
            total_items: items.len(),
        };
        Ok((items, summary))
    }

    async fn fetch_window(
        &self,
        window: &DateWindow,
        page_size: u32,
    ) -> Result<(Vec<Value>, usize), IngestError> {
        let endpoint = format!("{SALES_PATH} [{} .. {})", window.start, window.end);
        page_through(&endpoint, page_size, |page_number| {
            self.fetch_sales_page(window, page_number, page_size)
        })
        .await
    }
}

/// Requests pages `1, 2, …` until [`ListingPage::has_next`] says stop.
/// Returns the items and the number of pages requested.
async fn page_through<F, Fut>(
    endpoint: &str,
    page_size: u32,
    mut fetch_page: F,
) -> Result<(Vec<Value>, usize), IngestError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ListingPage, IngestError>>,
{
    let mut items: Vec<Value> = Vec::new();
    let mut page_count = 0usize;
    let mut page_number = 1u32;

    loop {
        page_count += 1;
        if page_count > MAX_PAGES_PER_WINDOW {
            return Err(IngestError::PaginationLimit {
                endpoint: endpoint.to_owned(),
                max_pages: MAX_PAGES_PER_WINDOW,
            });
        }

        let page = fetch_page(page_number).await?;
        let more = page.has_next(page_size, (items.len() + page.items.len()) as u64);
        items.extend(page.items);

        if !more {
            break;
        }
        page_number += 1;
    }

    Ok((items, page_count))
}
