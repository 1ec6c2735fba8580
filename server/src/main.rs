//! HTTP server for the resume ingestion service.
//!
//! Environment variables:
//!   RESUME_INGEST_CONFIG - path to a JSON config file (defaults apply when unset)
//!   LOG_FORMAT           - "json" or "text" (default: "text")
//!   RUST_LOG             - standard env filter

mod error;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use resume_ingest::config::load_config_from_env;
use resume_ingest::extraction::{AzureOpenAiBackend, ExtractionBackend, UnconfiguredBackend};
use resume_ingest::processor::LocalConverter;
use resume_ingest::registry::TaskReaper;
use resume_ingest::telemetry::{self, LogFormat};
use resume_ingest::{Database, IngestService};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = telemetry::init(LogFormat::from_env()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = load_config_from_env().context("failed to load configuration")?;

    let db_path = config
        .history
        .resolved_path()
        .context("could not determine a history database path")?;
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open history database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "History database ready");

    let backend: Arc<dyn ExtractionBackend> = match AzureOpenAiBackend::from_config(&config.extraction)? {
        Some(backend) => Arc::new(backend),
        None => {
            tracing::warn!("No extraction endpoint or API key configured; every job will fail");
            Arc::new(UnconfiguredBackend)
        }
    };
    let converter = Arc::new(LocalConverter::new(config.conversion.clone()));

    let service = Arc::new(IngestService::start(
        &config,
        db,
        converter,
        backend,
        tokio::runtime::Handle::current(),
    )?);

    let reaper = TaskReaper::new(
        Arc::clone(service.registry()),
        config.tasks.reap_interval(),
        config.tasks.retention(),
    );
    // Detached: the loop notices `stop` at its next tick.
    let _reaper_thread = reaper.start();

    let app = routes::router(
        AppState {
            service: Arc::clone(&service),
        },
        &config.server,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    reaper.stop();

    // Worker threads block on this runtime, so join them off the async threads.
    let drained = tokio::task::spawn_blocking(move || match Arc::try_unwrap(service) {
        Ok(service) => {
            service.shutdown();
            true
        }
        Err(_) => false,
    })
    .await?;
    if !drained {
        tracing::warn!("Service still referenced at shutdown; queued jobs were not drained");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
