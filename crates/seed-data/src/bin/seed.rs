//! Seeds the dashboard database with placeholder data
//!
//! Run with:
//! ```
//! cargo run -p seed-data --bin seed
//! ```
//!
//! Set `SEED_DATASET=path/to/data.json` to seed a different dataset.

use anyhow::Context;
use seed_data::config::DbConfig;
use seed_data::dataset::SeedDataset;
use seed_data::db::Seeder;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!(
            "An error occurred while attempting to seed the database: {:#}",
            err
        );
        return Err(err);
    }

    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = DbConfig::from_env()?;

    let dataset = SeedDataset::from_env().context("Failed to load seed dataset")?;

    let options = config.connect_options()?;
    let target = format!(
        "{} at {}:{}",
        options.get_database().unwrap_or("<default>"),
        options.get_host(),
        options.get_port()
    );

    // One connection, held for the whole run
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database {target}"))?;

    tracing::info!("Connected to database {}", target);

    let report = Seeder::new(pool.clone()).seed(&dataset).await?;
    pool.close().await;

    // Summary output
    tracing::info!("Seed completed!");
    for table in &report.tables {
        tracing::info!(
            "  {}: {} inserted, {} skipped",
            table.table,
            table.inserted,
            table.skipped
        );
    }

    Ok(())
}
