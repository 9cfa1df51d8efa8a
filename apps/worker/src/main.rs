//! Hermod worker process entry point.
//!
//! Loads layered configuration, constructs the catalog/registry/reconciler,
//! runs the reconciliation and heartbeat loops plus the registry's idle-
//! parking and retention-purge sweeps until a shutdown signal arrives, then
//! releases every lease this process held (spec §4.2, §5 "Cancellation &
//! shutdown").

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hermod_catalog::{Catalog, InMemoryCatalog};
use hermod_eventbus::EventBus;
use hermod_reconciler::{Config as ReconcilerConfig, Reconciler};
use hermod_registry::{MockAdapterFactory, Registry};
use hermod_telemetry::MetricsRegistry;

use config::{CatalogBackend, Config};

/// Status/trace subscriber channel capacity (spec §5 "buffered (default
/// 100-1000 slots)").
const EVENT_BUS_CAPACITY: usize = 256;

/// Runs a Hermod worker process: reconciles and drives this node's share of
/// the workflow fleet against a shared catalog.
#[derive(Debug, Parser)]
#[command(name = "hermod-worker", version, about)]
struct Cli {
    /// Path to a TOML config file layered under environment and defaults.
    #[arg(long, env = "HERMOD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Override this worker's stable identity (a UUID string).
    #[arg(long, env = "HERMOD_WORKER_ID")]
    worker_id: Option<String>,

    /// Override the catalog backend.
    #[arg(long, value_enum, env = "HERMOD_CATALOG")]
    catalog: Option<CatalogBackend>,

    /// Override the reconciler sync interval, in seconds.
    #[arg(long, env = "HERMOD_SYNC_INTERVAL_SECS")]
    sync_interval_secs: Option<u64>,

    /// Emit newline-delimited JSON logs instead of pretty ANSI.
    #[arg(long)]
    log_json: bool,

    /// Override the `tracing` `EnvFilter` directive.
    #[arg(long, env = "RUST_LOG")]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli).context("loading worker configuration")?;

    hermod_log::init(&hermod_log::Config {
        filter: config.log_filter.clone(),
        format: if config.log_json {
            hermod_log::Format::Json
        } else {
            hermod_log::Format::Pretty
        },
    })
    .ok();

    let worker_id = config.resolved_worker_id();
    info!(%worker_id, catalog = ?config.catalog, "hermod-worker starting");

    let catalog: Arc<dyn Catalog> = match config.catalog {
        CatalogBackend::Memory => Arc::new(InMemoryCatalog::new()),
    };

    let metrics = Arc::new(MetricsRegistry::new());
    let status_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
    let trace_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
    let buffer_config = hermod_buffer::Config::from_env();

    let registry = Arc::new(Registry::new(
        catalog.clone(),
        Arc::new(MockAdapterFactory),
        metrics.clone(),
        buffer_config,
        status_bus,
        trace_bus,
    ));

    register_self(&catalog, worker_id).await?;

    let reconciler = Arc::new(Reconciler::new(
        ReconcilerConfig::new(worker_id, Duration::from_secs(config.sync_interval_secs)),
        catalog,
        registry.clone(),
        metrics,
    ));

    let cancel = CancellationToken::new();

    let sync_handle = tokio::spawn({
        let reconciler = reconciler.clone();
        let cancel = cancel.clone();
        async move { reconciler.run(cancel).await }
    });
    let heartbeat_handle = tokio::spawn({
        let reconciler = reconciler.clone();
        let cancel = cancel.clone();
        async move { reconciler.run_heartbeat(cancel).await }
    });
    let idle_handle = tokio::spawn({
        let registry = registry.clone();
        let cancel = cancel.clone();
        async move { registry.run_idle_parking(cancel).await }
    });
    let retention_handle = tokio::spawn({
        let registry = registry.clone();
        let cancel = cancel.clone();
        async move { registry.run_retention_purge(cancel).await }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    cancel.cancel();
    let _ = tokio::join!(sync_handle, heartbeat_handle, idle_handle, retention_handle);

    registry.stop_all().await;
    reconciler.release_all_leases().await;

    info!("hermod-worker stopped");
    Ok(())
}

/// Ensure this process's worker row exists in the catalog before the first
/// reconcile cycle reads the online worker set (spec §4.2 step 1, §4.3).
async fn register_self(catalog: &Arc<dyn Catalog>, worker_id: hermod_core::WorkerId) -> anyhow::Result<()> {
    if catalog.get_worker(worker_id).await.is_ok() {
        return Ok(());
    }
    let worker = hermod_model::Worker::new(worker_id, chrono::Utc::now());
    catalog
        .create_worker(worker)
        .await
        .context("registering this worker with the catalog")?;
    Ok(())
}

/// Wait for SIGINT or SIGTERM (spec §5 "Graceful: cancel engine context").
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
