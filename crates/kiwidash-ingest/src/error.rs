use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by Kiwify (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("Kiwify rejected the access token for {url}")]
    Unauthorized { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("pagination limit reached for {endpoint}: exceeded {max_pages} pages")]
    PaginationLimit { endpoint: String, max_pages: usize },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("invalid Kiwify base URL \"{base_url}\": {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },

    #[error("could not obtain a Kiwify access token: {0}")]
    Token(String),
}

impl IngestError {
    /// `true` for HTTP 5xx responses surfaced as [`IngestError::UnexpectedStatus`].
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, IngestError::UnexpectedStatus { status, .. } if *status >= 500)
    }
}
