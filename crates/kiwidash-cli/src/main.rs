mod sync;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use kiwidash_core::AppConfig;
use tracing_subscriber::EnvFilter;

use crate::sync::SyncCommands;

#[derive(Debug, Parser)]
#[command(name = "kiwidash-cli")]
#[command(about = "Kiwify ingestion command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Pull data from Kiwify and persist it
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// List recent sync runs
    Runs {
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Print order totals per status bucket for an inclusive date range
    Summary {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("kiwidash-cli: no command given; see --help");
        return Ok(());
    };

    let config = kiwidash_core::load_app_config().context("failed to load configuration")?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Migrate => {
            let pool = connect(&config).await?;
            let applied = kiwidash_db::run_migrations(&pool).await?;
            tracing::info!(applied, "migrations applied");
            println!("applied {applied} migration(s)");
        }
        Commands::Sync { command } => sync::run(&config, command).await?,
        Commands::Runs { limit } => {
            let pool = connect(&config).await?;
            let runs = kiwidash_db::list_sync_runs(&pool, limit.clamp(1, 200)).await?;
            if runs.is_empty() {
                println!("no sync runs recorded");
            }
            for run in runs {
                println!(
                    "{}  {:<8} {:<4} {:<9} products={} customers={} orders={} dropped={} {}",
                    run.public_id,
                    run.run_type,
                    run.trigger_source,
                    run.status,
                    run.products_upserted,
                    run.customers_upserted,
                    run.orders_upserted,
                    run.records_dropped,
                    run.error_message.unwrap_or_default(),
                );
            }
        }
        Commands::Summary { start, end } => {
            let pool = connect(&config).await?;
            let summary = kiwidash_sync::sales_summary(&pool, start, end).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = kiwidash_db::PoolConfig::from_app_config(config);
    let pool = kiwidash_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}
