//! HTTP client for the Kiwify public API.

mod fetch_all;

use std::time::Duration;

use kiwidash_core::AppConfig;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::IngestError;
use crate::pagination::ListingPage;
use crate::retry::RetryPolicy;
use crate::token::{TokenCache, TokenSource};
use crate::window::DateWindow;

pub use fetch_all::{FetchSummary, WindowedFetch};

/// Page guard per window (and for undated listings). Each page may be
/// retried, so the worst-case request count is
/// `MAX_PAGES_PER_WINDOW * (1 + max_retries)`.
pub const MAX_PAGES_PER_WINDOW: usize = 500;

pub(crate) const SALES_PATH: &str = "/v1/sales";
pub(crate) const PRODUCTS_PATH: &str = "/v1/products";
pub(crate) const TOKEN_PATH: &str = "/v1/oauth/token";

const ACCOUNT_HEADER: &str = "x-kiwify-account-id";

/// OAuth client-credentials endpoint under the API base.
pub(crate) fn token_url(base_url: &str) -> String {
    format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/'))
}

/// Construction parameters for [`KiwifyClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub account_id: Option<String>,
    pub token_source: TokenSource,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl ClientSettings {
    /// Derives client settings from the application config. A static token
    /// takes precedence over client credentials.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let base_url = config.kiwify_api_base_url.clone();
        let token_source = match (
            &config.kiwify_api_token,
            &config.kiwify_client_id,
            &config.kiwify_client_secret,
        ) {
            (Some(token), _, _) => TokenSource::Static(token.clone()),
            (None, Some(id), Some(secret)) => TokenSource::ClientCredentials {
                token_url: token_url(&base_url),
                client_id: id.clone(),
                client_secret: secret.clone(),
            },
            _ => TokenSource::Anonymous,
        };
        Self {
            base_url,
            account_id: config.kiwify_account_id.clone(),
            token_source,
            timeout_secs: config.http_timeout_secs,
            user_agent: config.user_agent.clone(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_base_ms: config.retry_backoff_base_ms,
                ..RetryPolicy::default()
            },
        }
    }
}

/// Kiwify API client.
///
/// Every request carries a bearer token from the owned [`TokenCache`] and
/// is wrapped in the injected [`RetryPolicy`]. A 401 invalidates the cached
/// token and the request is replayed once with a forced refresh.
#[derive(Debug)]
pub struct KiwifyClient {
    pub(super) http: Client,
    pub(super) base_url: String,
    account_id: Option<String>,
    retry: RetryPolicy,
    tokens: TokenCache,
}

impl KiwifyClient {
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidBaseUrl`] for a base URL that does not
    /// parse, or [`IngestError::Http`] if the `reqwest::Client` cannot be
    /// built.
    pub fn new(settings: ClientSettings) -> Result<Self, IngestError> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| IngestError::InvalidBaseUrl {
            base_url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&settings.user_agent)
            .build()?;
        let tokens = TokenCache::new(http.clone(), settings.token_source);

        Ok(Self {
            http,
            base_url,
            account_id: settings.account_id,
            retry: settings.retry,
            tokens,
        })
    }

    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, IngestError> {
        Self::new(ClientSettings::from_app_config(config))
    }

    /// Builds a client against an arbitrary base URL with a static token and
    /// no retry delay. Used by tests against a mock server.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn with_base_url(base_url: &str, token: Option<&str>) -> Result<Self, IngestError> {
        Self::new(ClientSettings {
            base_url: base_url.to_string(),
            account_id: None,
            token_source: token.map_or(TokenSource::Anonymous, |t| {
                TokenSource::Static(t.to_string())
            }),
            timeout_secs: 10,
            user_agent: "kiwidash-test".to_string(),
            retry: RetryPolicy {
                max_retries: 2,
                backoff_base_ms: 0,
                max_delay_ms: 0,
            },
        })
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Fetches one page of sales for `window`.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying GET.
    pub async fn fetch_sales_page(
        &self,
        window: &DateWindow,
        page_number: u32,
        page_size: u32,
    ) -> Result<ListingPage, IngestError> {
        let query = [
            ("start_date", window.start_param()),
            ("end_date", window.end_param()),
            ("page_number", page_number.to_string()),
            ("page_size", page_size.to_string()),
        ];
        let body = self.get_json(SALES_PATH, &query).await?;
        Ok(ListingPage::from_body(&body))
    }

    /// Fetches one page of products.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying GET.
    pub async fn fetch_products_page(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> Result<ListingPage, IngestError> {
        let query = [
            ("page_number", page_number.to_string()),
            ("page_size", page_size.to_string()),
        ];
        let body = self.get_json(PRODUCTS_PATH, &query).await?;
        Ok(ListingPage::from_body(&body))
    }

    /// GETs `path` with retry and a single token refresh on 401.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Unauthorized`]: 401 persisted after refreshing the token.
    /// - [`IngestError::RateLimited`]: 429 after all retries.
    /// - [`IngestError::UnexpectedStatus`]: other non-2xx (5xx retried).
    /// - [`IngestError::Http`]: network failure after all retries.
    /// - [`IngestError::Deserialize`]: body is not JSON (not retried).
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, IngestError> {
        let url = format!("{}{path}", self.base_url);
        self.retry
            .run(|| {
                let url = url.clone();
                async move {
                    match self.send_once(&url, query, false).await {
                        Err(IngestError::Unauthorized { .. }) => {
                            tracing::info!(url = %url, "access token rejected, refreshing");
                            self.tokens.invalidate().await;
                            self.send_once(&url, query, true).await
                        }
                        other => other,
                    }
                }
            })
            .await
    }

    async fn send_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        force_refresh: bool,
    ) -> Result<Value, IngestError> {
        let mut request = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = self.tokens.get_token(force_refresh).await? {
            request = request.bearer_auth(token);
        }
        if let Some(account_id) = &self.account_id {
            request = request.header(ACCOUNT_HEADER, account_id);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(IngestError::Unauthorized {
                url: url.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(0);
            return Err(IngestError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            return Err(IngestError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| IngestError::Deserialize {
            context: format!("response from {url}"),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_base_url() {
        let err = KiwifyClient::with_base_url("not a url", None).unwrap_err();
        assert!(matches!(err, IngestError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn trims_trailing_slash() {
        let client = KiwifyClient::with_base_url("http://localhost:1234/", None).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234");
    }

    #[test]
    fn token_url_sits_under_versioned_api() {
        assert_eq!(
            token_url("https://public-api.kiwify.com/"),
            "https://public-api.kiwify.com/v1/oauth/token"
        );
    }
}
