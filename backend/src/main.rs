//! Ledger reconciliation job
//!
//! Connects to the ledger database, runs the audit and exits non-zero when any
//! material or lot is out of balance.

use std::{sync::Arc, time::Duration};

use inventory_ledger::{BroadcastNotifier, Config, Discrepancy, LedgerEngine, PostgresStore};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inventory_ledger=debug,ledger_audit=debug,sqlx=warn".into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting ledger audit");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let settings = config.ledger_settings();
    let notifier = Arc::new(BroadcastNotifier::new(settings.notification_capacity));
    let engine = LedgerEngine::new(PostgresStore::new(db_pool), notifier).with_settings(settings);

    let report = engine.audit().await?;
    for discrepancy in &report.discrepancies {
        match discrepancy {
            Discrepancy::MaterialLots {
                material_id,
                quantity,
                lot_total,
            } => tracing::error!(
                material_id,
                quantity,
                lot_total,
                "Material quantity differs from its live lots"
            ),
            Discrepancy::LotLedger {
                price_id,
                quantity,
                ledger_total,
            } => tracing::error!(
                price_id,
                quantity,
                ledger_total,
                "Lot quantity differs from its ledger entries"
            ),
        }
    }

    if !report.is_clean() {
        anyhow::bail!(
            "{} discrepancies across {} materials and {} lots",
            report.discrepancies.len(),
            report.materials_checked,
            report.lots_checked
        );
    }

    tracing::info!(
        "Audit passed: {} materials, {} lots",
        report.materials_checked,
        report.lots_checked
    );
    Ok(())
}
