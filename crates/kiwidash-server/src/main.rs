mod api;
mod middleware;

use std::sync::Arc;

use kiwidash_ingest::KiwifyClient;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState, ServerSettings},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = kiwidash_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = kiwidash_db::PoolConfig::from_app_config(&config);
    let pool = kiwidash_db::connect_pool(&config.database_url, pool_config).await?;
    kiwidash_db::run_migrations(&pool).await?;

    let kiwify = Arc::new(KiwifyClient::from_app_config(&config)?);
    let settings = Arc::new(ServerSettings::from_app_config(&config));
    if settings.webhook_token.is_none() {
        tracing::warn!("KIWIFY_WEBHOOK_TOKEN unset; webhook deliveries are not authenticated");
    }

    let auth = AuthState::from_env(matches!(
        config.env,
        kiwidash_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            pool,
            kiwify,
            settings,
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "kiwidash-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
