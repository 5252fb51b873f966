//! Sync worker process.
//!
//! Reads newline-delimited JSON intake messages (transitions,
//! acknowledgments, sync failures, delivery receipts, published events) from
//! stdin, feeds them to the engine in order, and runs the periodic delivery
//! expiry and sync archive sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tandem_events::{forward_lines, intake_channel, Engine, EngineConfig, PgStore, SyncWorker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_worker=debug,tandem_events=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = EngineConfig::from_env()?;
    tracing::info!(
        intake_capacity = config.intake_capacity,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Loaded engine configuration"
    );

    // --- Database ---
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let pool = tandem_db::create_pool(&database_url).await?;
    tandem_db::health_check(&pool).await?;
    tandem_db::run_migrations(&pool).await?;
    tracing::info!("Database ready");

    // --- Engine ---
    let engine = Arc::new(Engine::from_config(Arc::new(PgStore::new(pool)), &config)?);
    let worker = SyncWorker::new(engine, &config);

    // --- Intake ---
    let (intake, receiver) = intake_channel(config.intake_capacity);
    let reader_handle = tokio::spawn(async move {
        match forward_lines(BufReader::new(tokio::io::stdin()), intake).await {
            Ok(forwarded) => tracing::info!(forwarded, "Intake input exhausted"),
            Err(e) => tracing::error!(error = %e, "Failed to read intake input"),
        }
    });

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let mut worker_handle = tokio::spawn(async move {
        worker.run(receiver, worker_cancel).await;
    });

    tracing::info!("Sync worker running");

    let interrupted = tokio::select! {
        _ = shutdown_signal() => true,
        _ = &mut worker_handle => false,
    };

    reader_handle.abort();
    if interrupted {
        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), worker_handle).await;
    }

    tracing::info!("Sync worker stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
