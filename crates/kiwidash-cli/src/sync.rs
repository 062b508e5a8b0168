//! `sync` subcommands.
//!
//! A dry run fetches and normalizes but never opens a database connection.

use anyhow::Context;
use chrono::NaiveDate;
use clap::Subcommand;
use kiwidash_core::AppConfig;
use kiwidash_ingest::KiwifyClient;
use kiwidash_sync::{
    preview_products_sync, preview_sales_sync, run_products_sync, run_sales_sync,
    SalesSyncRequest, SyncOptions, SyncSummary, TriggerSource,
};

#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Fetch sales created in an inclusive date range
    Sales {
        /// First day to fetch (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day to fetch; defaults to `start`
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Records per upstream page
        #[arg(long)]
        page_size: Option<u32>,

        /// Fetch and normalize without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch the full product catalog
    Products {
        #[arg(long)]
        page_size: Option<u32>,

        #[arg(long)]
        dry_run: bool,
    },
}

pub(crate) async fn run(config: &AppConfig, command: SyncCommands) -> anyhow::Result<()> {
    let client = KiwifyClient::from_app_config(config).context("failed to build Kiwify client")?;
    let options = SyncOptions::from_app_config(config, TriggerSource::Cli);

    let summary = match command {
        SyncCommands::Sales {
            start,
            end,
            page_size,
            dry_run,
        } => {
            let request = SalesSyncRequest {
                start,
                end,
                page_size: page_size.unwrap_or(config.page_size),
            };
            if dry_run {
                preview_sales_sync(&client, &request).await?
            } else {
                let pool = crate::connect(config).await?;
                run_sales_sync(&pool, &client, &request, &options).await?
            }
        }
        SyncCommands::Products { page_size, dry_run } => {
            let page_size = page_size.unwrap_or(config.page_size);
            if dry_run {
                preview_products_sync(&client, page_size).await?
            } else {
                let pool = crate::connect(config).await?;
                run_products_sync(&pool, &client, page_size, &options).await?
            }
        }
    };

    tracing::info!(
        run_id = ?summary.run_id,
        products = summary.products,
        customers = summary.customers,
        orders = summary.orders,
        dropped = summary.dropped(),
        total_intervals = summary.total_intervals,
        total_pages = summary.total_pages,
        "sync finished"
    );
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    match summary.run_id {
        Some(id) => println!("sync run {id} succeeded"),
        None => println!("dry-run: nothing was written"),
    }
    println!(
        "  products={} customers={} orders={} unresolved={} dropped={}",
        summary.products,
        summary.customers,
        summary.orders,
        summary.orders_unresolved,
        summary.dropped(),
    );
    println!(
        "  intervals={} pages={} sales_fetched={} products_fetched={}",
        summary.total_intervals,
        summary.total_pages,
        summary.sales_fetched,
        summary.products_fetched,
    );
}
