//! compute-router daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!   route(cost) ──▶│ TokenLimiter → LoadCounter → Cluster         │
//!                  │                               │              │
//!                  │                     ┌─────────┴─────────┐    │
//!                  │                     ▼                   ▼    │
//!                  │               Pool (tp)            Pool (ap)  │──▶ compute nodes
//!                  │                                              │
//!                  │  HealthSweep   CounterFlush   Autoscale      │──▶ fleet scaler
//!                  │  ConfigWatcher (reconcile)                   │
//!                  └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use compute_router::config::{load_config, watcher::ConfigWatcher, RouterConfig};
use compute_router::lifecycle::{signals, startup, Shutdown};
use compute_router::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "compute-router", version, about = "Backend router and fleet autoscaler")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    logging::init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "compute-router starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let services = startup::start(&config, &shutdown).await?;

    // The watcher handle must outlive the reload loop.
    let mut _watcher = None;
    if let Some(path) = &cli.config {
        let (watcher, mut updates) = ConfigWatcher::new(path);
        match watcher.run() {
            Ok(handle) => _watcher = Some(handle),
            Err(e) => tracing::error!(error = %e, "Failed to start config watcher"),
        }

        let cluster = services.cluster.clone();
        let orchestrator = services.orchestrator.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(new_config) = updates.recv() => {
                        orchestrator.replace(new_config.discovery.pods.clone());
                        if let Err(e) = cluster.reconcile(&new_config.cluster).await {
                            tracing::error!(error = %e, "Failed to reconcile membership");
                        }
                    }
                    _ = stop.recv() => break,
                    else => break,
                }
            }
        });
    }

    signals::wait_for_shutdown_signal().await;

    tracing::info!("Shutting down");
    services.cluster.set_online(false);
    shutdown.trigger();
    for task in services.tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
