//! Invoice reconciliation run entry point.

use billing_engine::batch::run_invoice_reconciliation;
use billing_engine::config::EngineConfig;
use billing_engine::services::Database;
use chrono::Utc;
use engine_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = EngineConfig::from_env("reconcile-invoices").map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.common.log_json,
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        lookahead_months = config.lookahead_months,
        run_as_of = ?config.run_as_of,
        db_max_connections = config.database.max_connections,
        "Starting invoice reconciliation"
    );

    let db = Database::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to database");
        std::io::Error::other(format!("Database error: {}", e))
    })?;

    db.run_migrations().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        std::io::Error::other(format!("Migration error: {}", e))
    })?;

    let report = run_invoice_reconciliation(&db, &config, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Invoice reconciliation run aborted");
            std::io::Error::other(format!("Run error: {}", e))
        })?;

    if report.batches_failed > 0 {
        tracing::warn!(
            run_id = %report.run_id,
            failed = report.batches_failed,
            "Run completed with failed batches"
        );
        std::process::exit(1);
    }

    Ok(())
}
