//! Splitting a date range into upstream-legal query windows.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::error::IngestError;

/// Kiwify rejects sales queries spanning more than 90 days.
pub const MAX_WINDOW_DAYS: u64 = 90;

/// A half-open `[start, end)` day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    #[must_use]
    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    #[must_use]
    pub fn end_param(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Splits the inclusive range `[start, end]` into abutting windows of at
/// most [`MAX_WINDOW_DAYS`] days. A missing `end` means the single day
/// `start`.
///
/// # Errors
///
/// Returns [`IngestError::InvalidRange`] when `start` is after `end`.
pub fn split_windows(
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Result<Vec<DateWindow>, IngestError> {
    let end = end.unwrap_or(start);
    if start > end {
        return Err(IngestError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let invalid = || IngestError::InvalidRange {
        start: start.to_string(),
        end: end.to_string(),
    };
    let end_exclusive = end.checked_add_days(Days::new(1)).ok_or_else(invalid)?;

    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end_exclusive {
        let next = cursor
            .checked_add_days(Days::new(MAX_WINDOW_DAYS))
            .map_or(end_exclusive, |d| d.min(end_exclusive));
        windows.push(DateWindow {
            start: cursor,
            end: next,
        });
        cursor = next;
    }
    Ok(windows)
}
