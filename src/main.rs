//! # KPI Sync Entry Point
//!
//! Runs the sync worker or a one-off operation against a single integration.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kpi_sync::{
    adapters::Registry,
    config::{AppConfig, ConfigLoader},
    crypto::AesGcmCredentialStore,
    db,
    scheduler::{RetryPolicy, Scheduler},
    sync_engine::SyncEngine,
    telemetry,
    worker::SyncWorker,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "kpi-sync", version, about = "Integration sync worker for KPI data sources")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the background sync worker until interrupted
    Run,
    /// Sync one integration now
    Sync { integration_id: Uuid },
    /// Probe an integration's data source
    TestConnection { integration_id: Uuid },
    /// Discover fields in an integration's data
    Discover {
        integration_id: Uuid,
        /// Store newly discovered field paths
        #[arg(long)]
        save: bool,
    },
    /// Show sync history for an integration
    Logs {
        integration_id: Uuid,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        per_page: u64,
    },
    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        debug!(config = %redacted_json, "Effective configuration");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::health_check(&db).await?;

    if let Command::Migrate = cli.command {
        db::migrate(&db).await?;
        info!("Migrations applied");
        return Ok(());
    }

    let engine = build_engine(&config, db)?;

    match cli.command {
        Command::Run => run_worker(&config, engine).await,
        Command::Sync { integration_id } => {
            print_json(&engine.execute_sync_with_logging(integration_id).await)
        }
        Command::TestConnection { integration_id } => {
            print_json(&engine.test_connection(integration_id).await?)
        }
        Command::Discover {
            integration_id,
            save,
        } => print_json(&engine.discover_fields(integration_id, save).await?),
        Command::Logs {
            integration_id,
            page,
            per_page,
        } => {
            let logs = engine
                .sync_logs()
                .list_for_integration(integration_id, page, per_page)
                .await?;
            info!(total = logs.total, page = logs.page, "Sync logs loaded");
            print_json(&logs.logs)
        }
        Command::Migrate => Ok(()),
    }
}

fn build_engine(config: &AppConfig, db: sea_orm::DatabaseConnection) -> Result<SyncEngine> {
    let registry = Arc::new(
        Registry::with_builtin_adapters(&config.http).context("building adapter registry")?,
    );
    let credentials = Arc::new(
        AesGcmCredentialStore::from_config_key(config.crypto_key.as_deref())
            .context("initializing credential store")?,
    );
    let scheduler = Scheduler::new(db.clone(), registry.clone(), RetryPolicy::from(&config.retry));
    Ok(SyncEngine::new(db, registry, credentials, scheduler))
}

async fn run_worker(config: &AppConfig, engine: SyncEngine) -> Result<()> {
    let shutdown = CancellationToken::new();
    let worker = SyncWorker::new(Arc::new(engine), config.worker.clone());
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    shutdown_signal().await;
    shutdown.cancel();

    handle.await.context("sync worker task failed")?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
