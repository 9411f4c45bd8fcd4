//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the cluster and its capabilities from configuration
//! - Populate membership (orchestrator bootstrap or static lists)
//! - Start the background loops
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Loops start only after membership is populated

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::admission::limiter::TokenLimiter;
use crate::autoscale::{AutoscaleController, ControllerSettings, CounterFlush, FleetScaler, HttpScaler, LoadCounter, LogScaler};
use crate::cluster::{Cluster, ClusterSettings};
use crate::config::schema::RouterConfig;
use crate::error::Result;
use crate::health::HealthSweep;
use crate::lifecycle::shutdown::Shutdown;
use crate::load_balancer::backend::WorkloadClass;
use crate::net::connector::TcpConnector;
use crate::orchestrator::StaticOrchestrator;
use crate::router::Router;

/// Everything the daemon runs.
pub struct Services {
    pub router: Router,
    pub cluster: Arc<Cluster>,
    /// Pod list source, refreshed on config reload.
    pub orchestrator: Arc<StaticOrchestrator>,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Build the cluster, populate it and spawn the background loops.
pub async fn start(config: &RouterConfig, shutdown: &Shutdown) -> Result<Services> {
    let connector = Arc::new(TcpConnector::new(
        config.cluster.connect_timeout(),
        config.cluster.probe_timeout(),
    ));
    let orchestrator = Arc::new(StaticOrchestrator::new(config.discovery.pods.clone()));
    let settings = ClusterSettings {
        discovery: config.discovery.enabled,
        ..ClusterSettings::from(&config.cluster)
    };
    let cluster = Arc::new(Cluster::new(
        settings,
        connector,
        orchestrator.clone(),
    ));

    if config.discovery.enabled {
        cluster.bootstrap(&config.discovery).await?;
    } else {
        for class in WorkloadClass::ALL {
            let added = cluster.add_members(config.cluster.addresses(class), class).await?;
            tracing::info!(class = %class, added, "Static members loaded");
        }
    }

    let counter = Arc::new(LoadCounter::new());
    let mut tasks = Vec::new();

    let sweep = HealthSweep::new(
        cluster.clone(),
        config.cluster.health_check_interval(),
        config.cluster.probe_timeout(),
    );
    tasks.push(tokio::spawn(sweep.run(shutdown.subscribe())));

    let flush = CounterFlush::new(counter.clone(), cluster.clone(), config.counter.flush_interval());
    tasks.push(tokio::spawn(flush.run(shutdown.subscribe())));

    if config.autoscale.enabled {
        let scaler: Arc<dyn FleetScaler> = match &config.autoscale.scaler_endpoint {
            Some(endpoint) => Arc::new(HttpScaler::new(endpoint, config.autoscale.request_timeout())?),
            None => Arc::new(LogScaler),
        };
        let controller = AutoscaleController::new(
            cluster.clone(),
            counter.clone(),
            scaler,
            ControllerSettings::from(&config.autoscale),
        );
        tasks.push(tokio::spawn(controller.run(shutdown.subscribe())));
    }

    let router = Router::new(TokenLimiter::new(config.admission.token_limit), cluster.clone(), counter);

    tracing::info!(
        cluster = %cluster.name(),
        transactional = cluster.pool(WorkloadClass::Transactional).len(),
        analytical = cluster.pool(WorkloadClass::Analytical).len(),
        proxy_as_compute = cluster.proxy_as_compute(),
        "Router started"
    );

    Ok(Services {
        router,
        cluster,
        orchestrator,
        tasks,
    })
}
