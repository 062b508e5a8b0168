use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Base URL of the Kiwify public API, without a trailing slash.
    pub kiwify_api_base_url: String,
    /// Sent as `x-kiwify-account-id` on every upstream request when set.
    pub kiwify_account_id: Option<String>,
    /// Static bearer token. Takes precedence over client credentials.
    pub kiwify_api_token: Option<String>,
    pub kiwify_client_id: Option<String>,
    pub kiwify_client_secret: Option<String>,
    /// Shared secret expected on incoming webhook deliveries.
    pub kiwify_webhook_token: Option<String>,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub page_size: u32,
    /// Rows per upsert statement; always within `1..=500`.
    pub upsert_chunk_size: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("kiwify_api_base_url", &self.kiwify_api_base_url)
            .field("kiwify_account_id", &self.kiwify_account_id)
            .field("kiwify_api_token", &redact(&self.kiwify_api_token))
            .field("kiwify_client_id", &self.kiwify_client_id)
            .field("kiwify_client_secret", &redact(&self.kiwify_client_secret))
            .field("kiwify_webhook_token", &redact(&self.kiwify_webhook_token))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("page_size", &self.page_size)
            .field("upsert_chunk_size", &self.upsert_chunk_size)
            .finish()
    }
}
