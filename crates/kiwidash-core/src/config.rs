use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Hard ceiling on rows per upsert statement.
pub const MAX_UPSERT_CHUNK_SIZE: usize = 500;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("KIWIDASH_ENV", "development"));

    let bind_addr = or_default("KIWIDASH_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("KIWIDASH_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("KIWIDASH_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("KIWIDASH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("KIWIDASH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("KIWIDASH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let kiwify_api_base_url = or_default("KIWIFY_API_BASE_URL", "https://public-api.kiwify.com")
        .trim_end_matches('/')
        .to_string();
    if !kiwify_api_base_url.starts_with("http://") && !kiwify_api_base_url.starts_with("https://")
    {
        return Err(invalid(
            "KIWIFY_API_BASE_URL",
            format!("expected an http(s) URL, got \"{kiwify_api_base_url}\""),
        ));
    }

    let kiwify_client_id = optional("KIWIFY_CLIENT_ID");
    let kiwify_client_secret = optional("KIWIFY_CLIENT_SECRET");
    if kiwify_client_id.is_some() != kiwify_client_secret.is_some() {
        return Err(invalid(
            "KIWIFY_CLIENT_SECRET",
            "KIWIFY_CLIENT_ID and KIWIFY_CLIENT_SECRET must be set together".to_string(),
        ));
    }

    let page_size = parse_u32("KIWIDASH_PAGE_SIZE", "100")?;
    if page_size == 0 {
        return Err(invalid("KIWIDASH_PAGE_SIZE", "must be at least 1".to_string()));
    }

    let upsert_chunk_size = or_default("KIWIDASH_UPSERT_CHUNK_SIZE", "500")
        .parse::<usize>()
        .map_err(|e| invalid("KIWIDASH_UPSERT_CHUNK_SIZE", e.to_string()))?
        .clamp(1, MAX_UPSERT_CHUNK_SIZE);

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        kiwify_api_base_url,
        kiwify_account_id: optional("KIWIFY_ACCOUNT_ID"),
        kiwify_api_token: optional("KIWIFY_API_TOKEN"),
        kiwify_client_id,
        kiwify_client_secret,
        kiwify_webhook_token: optional("KIWIFY_WEBHOOK_TOKEN"),
        http_timeout_secs: parse_u64("KIWIDASH_HTTP_TIMEOUT_SECS", "30")?,
        user_agent: or_default("KIWIDASH_USER_AGENT", "kiwidash/0.1 (sales-mirror)"),
        max_retries: parse_u32("KIWIDASH_MAX_RETRIES", "3")?,
        retry_backoff_base_ms: parse_u64("KIWIDASH_RETRY_BACKOFF_BASE_MS", "500")?,
        page_size,
        upsert_chunk_size,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
