//! Request plumbing shared by every route: request ids, operator API keys,
//! and per-caller rate limits.
//!
//! Rejections use the same [`ApiError`] envelope as the handlers, so
//! callers see one error shape whichever layer refused them.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const API_KEYS_VAR: &str = "KIWIDASH_API_KEYS";
const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;
/// Windows are pruned once this many callers are tracked.
const MAX_TRACKED_CALLERS: usize = 1024;

type KeyDigest = [u8; 32];

fn digest(value: &str) -> KeyDigest {
    Sha256::digest(value.as_bytes()).into()
}

/// Compares two secrets through their SHA-256 digests in constant time.
pub(crate) fn secrets_match(expected: &str, presented: &str) -> bool {
    digest(expected)[..].ct_eq(&digest(presented)[..]).into()
}

/// Request id carried in request extensions and echoed as `x-request-id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Operator API keys accepted on the sync and reporting routes.
///
/// Only digests are held; comparison walks every key so timing does not
/// reveal which one matched.
#[derive(Debug, Clone)]
pub struct AuthState {
    key_digests: Arc<Vec<KeyDigest>>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads comma-separated keys from `KIWIDASH_API_KEYS`.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// With no keys, development runs open and any other environment refuses
    /// to start.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut key_digests: Vec<KeyDigest> = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(digest)
            .collect();
        key_digests.sort_unstable();
        key_digests.dedup();

        if key_digests.is_empty() {
            if !is_development {
                anyhow::bail!("{API_KEYS_VAR} must list at least one key outside development");
            }
            tracing::warn!("{API_KEYS_VAR} empty; sync and reporting routes are open");
            return Ok(Self::disabled());
        }

        tracing::info!(keys = key_digests.len(), "operator API keys loaded");
        Ok(Self {
            key_digests: Arc::new(key_digests),
            enabled: true,
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            key_digests: Arc::new(Vec::new()),
            enabled: false,
        }
    }

    fn allows(&self, token: &str) -> bool {
        let presented = digest(token);
        self.key_digests
            .iter()
            .fold(subtle::Choice::from(0), |acc, key| {
                acc | key[..].ct_eq(&presented[..])
            })
            .into()
    }
}

/// Which budget a request draws from. Sync triggers fan out to Kiwify and
/// get a much smaller allowance than reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RouteClass {
    Read,
    SyncTrigger,
}

impl RouteClass {
    fn of(method: &Method) -> Self {
        if *method == Method::POST {
            RouteClass::SyncTrigger
        } else {
            RouteClass::Read
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CallerWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limits keyed by caller and route class.
///
/// The caller is the bearer token digest, or `anonymous` when auth is off.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    read_limit: usize,
    sync_limit: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<(String, RouteClass), CallerWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(read_limit: usize, sync_limit: usize, window: Duration) -> Self {
        Self {
            read_limit,
            sync_limit,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn limit_for(&self, class: RouteClass) -> usize {
        match class {
            RouteClass::Read => self.read_limit,
            RouteClass::SyncTrigger => self.sync_limit,
        }
    }

    /// Counts one request; `false` once the caller's budget is spent.
    async fn admit(&self, caller: String, class: RouteClass) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if windows.len() >= MAX_TRACKED_CALLERS {
            windows.retain(|_, w| now.duration_since(w.started_at) < self.window);
        }

        let entry = windows.entry((caller, class)).or_insert(CallerWindow {
            started_at: now,
            count: 0,
        });
        if now.duration_since(entry.started_at) >= self.window {
            *entry = CallerWindow {
                started_at: now,
                count: 0,
            };
        }
        if entry.count >= self.limit_for(class) {
            return false;
        }
        entry.count += 1;
        true
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone())
}

/// Accepts a client id only if it is short printable ASCII; anything else
/// is replaced so log lines stay intact.
fn usable_request_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let printable = raw.bytes().all(|b| b.is_ascii_graphic());
    (!raw.is_empty() && raw.len() <= MAX_REQUEST_ID_LEN && printable).then(|| raw.to_string())
}

/// Assigns every request an id and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = usable_request_id(req.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Rejects requests without a listed operator key.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    let verdict = extract_bearer_token(req.headers().get(AUTHORIZATION)).map(|t| auth.allows(t));
    if verdict == Some(true) {
        return next.run(req).await;
    }

    tracing::warn!(
        path = %req.uri().path(),
        token_present = verdict.is_some(),
        "rejecting request without a valid API key"
    );
    ApiError::new(
        request_id_of(&req),
        "unauthorized",
        "missing or invalid bearer token",
    )
    .into_response()
}

/// Applies the caller's read or sync-trigger budget.
pub async fn enforce_rate_limit(
    State(limits): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let class = RouteClass::of(req.method());
    let caller = extract_bearer_token(req.headers().get(AUTHORIZATION)).map_or_else(
        || "anonymous".to_string(),
        |token| {
            digest(token)
                .iter()
                .take(8)
                .map(|b| format!("{b:02x}"))
                .collect()
        },
    );

    if !limits.admit(caller, class).await {
        tracing::warn!(path = %req.uri().path(), ?class, "rate limit exceeded");
        let message = match class {
            RouteClass::SyncTrigger => "too many sync requests; retry after the current window",
            RouteClass::Read => "too many requests; retry after the current window",
        };
        return ApiError::new(request_id_of(&req), "rate_limited", message).into_response();
    }

    next.run(req).await
}

/// Token from an `Authorization: Bearer <token>` header; the scheme is
/// matched case-insensitively.
fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    let value = value?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
