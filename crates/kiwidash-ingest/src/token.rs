//! Access-token acquisition and caching for the Kiwify API.
//!
//! The cache is an explicit value owned by the client rather than process
//! state. Its whole contract is [`TokenCache::get_token`] and
//! [`TokenCache::invalidate`].

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::IngestError;

/// Tokens are refreshed this long before their stated expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where access tokens come from.
#[derive(Clone)]
pub enum TokenSource {
    /// A long-lived token supplied by configuration.
    Static(String),
    /// OAuth client credentials exchanged at `token_url`.
    ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
    },
    /// No credentials; requests go out without `Authorization`.
    Anonymous,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("Static([redacted])"),
            TokenSource::ClientCredentials {
                token_url,
                client_id,
                ..
            } => f
                .debug_struct("ClientCredentials")
                .field("token_url", token_url)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            TokenSource::Anonymous => f.write_str("Anonymous"),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.refresh_at.is_none_or(|t| Instant::now() < t)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
pub struct TokenCache {
    http: Client,
    source: TokenSource,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new(http: Client, source: TokenSource) -> Self {
        Self {
            http,
            source,
            cached: Mutex::new(None),
        }
    }

    /// Returns a usable token, fetching a new one when none is cached, the
    /// cached one is inside its refresh margin, or `force_refresh` is set.
    /// `Ok(None)` means the source is anonymous.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Token`] when the token endpoint rejects the
    /// credentials or answers with something that is not a token.
    pub async fn get_token(&self, force_refresh: bool) -> Result<Option<String>, IngestError> {
        let mut guard = self.cached.lock().await;
        if !force_refresh {
            if let Some(token) = guard.as_ref().filter(|t| t.is_fresh()) {
                return Ok(Some(token.value.clone()));
            }
        }

        let fresh = match &self.source {
            TokenSource::Anonymous => return Ok(None),
            TokenSource::Static(value) => CachedToken {
                value: value.clone(),
                refresh_at: None,
            },
            TokenSource::ClientCredentials {
                token_url,
                client_id,
                client_secret,
            } => self.exchange(token_url, client_id, client_secret).await?,
        };

        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(Some(value))
    }

    /// Drops the cached token so the next [`Self::get_token`] fetches anew.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn exchange(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<CachedToken, IngestError> {
        let response = self
            .http
            .post(token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Token(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            IngestError::Token(format!("token endpoint returned an unreadable body: {e}"))
        })?;
        if parsed.access_token.trim().is_empty() {
            return Err(IngestError::Token(
                "token endpoint returned an empty access_token".to_string(),
            ));
        }

        tracing::debug!(expires_in = ?parsed.expires_in, "obtained Kiwify access token");
        let refresh_at = parsed.expires_in.map(|secs| {
            Instant::now() + Duration::from_secs(secs).saturating_sub(REFRESH_MARGIN)
        });
        Ok(CachedToken {
            value: parsed.access_token,
            refresh_at,
        })
    }
}
