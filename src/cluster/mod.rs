//! Cluster: one pool per workload class plus proxy-node metadata.
//!
//! # Data Flow
//! ```text
//! get_connection(cost)
//!     → Pool::select (weighted round robin)
//!     → cost attributed to pool or proxy
//!     → self: local handle | dedicated class: fresh dial | else: pooled
//!
//! add_member / remove_member / mark_down / mark_up   (membership.rs)
//! bootstrap from the orchestrator                     (bootstrap.rs)
//! ```

mod bootstrap;
mod membership;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::ClusterConfig;
use crate::error::{Result, RouterError};
use crate::load_balancer::backend::WorkloadClass;
use crate::load_balancer::pool::Pool;
use crate::net::connection::BackendConn;
use crate::net::connector::Connector;
use crate::observability::metrics;
use crate::orchestrator::Orchestrator;

pub use membership::AddOutcome;

/// Static cluster settings, fixed for the life of a `Cluster`.
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub name: String,
    pub namespace: String,
    pub down_after_no_response: Duration,
    pub max_cost_per_query: i64,
    pub dedicated_classes: Vec<WorkloadClass>,
    pub drain_attempts: u32,
    pub drain_backoff: Duration,
    pub max_idle_per_backend: usize,
    /// Membership comes from the orchestrator; pod-shaped addresses are
    /// checked against it on add.
    pub discovery: bool,
}

impl From<&ClusterConfig> for ClusterSettings {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            name: config.name.clone(),
            namespace: config.namespace.clone(),
            down_after_no_response: config.down_after_no_response(),
            max_cost_per_query: config.max_cost_per_query,
            dedicated_classes: config.dedicated_classes.clone(),
            drain_attempts: config.drain_attempts,
            drain_backoff: config.drain_backoff(),
            max_idle_per_backend: config.max_idle_per_backend,
            discovery: false,
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self::from(&ClusterConfig::default())
    }
}

/// The set of compute nodes behind one proxy.
pub struct Cluster {
    settings: ClusterSettings,

    transactional: Pool,
    analytical: Pool,

    /// True while a `self` member exists in any pool.
    proxy_as_compute: AtomicBool,
    proxy_cost: AtomicI64,
    proxy_window_cost: AtomicI64,

    /// Health sweep runs only while set.
    online: AtomicBool,

    connector: Arc<dyn Connector>,
    orchestrator: Arc<dyn Orchestrator>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.settings.name)
            .field("transactional", &self.transactional.len())
            .field("analytical", &self.analytical.len())
            .field("proxy_as_compute", &self.proxy_as_compute())
            .field("online", &self.is_online())
            .finish()
    }
}

impl Cluster {
    pub fn new(
        settings: ClusterSettings,
        connector: Arc<dyn Connector>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Self {
        Self {
            settings,
            transactional: Pool::new(WorkloadClass::Transactional),
            analytical: Pool::new(WorkloadClass::Analytical),
            proxy_as_compute: AtomicBool::new(false),
            proxy_cost: AtomicI64::new(0),
            proxy_window_cost: AtomicI64::new(0),
            online: AtomicBool::new(true),
            connector,
            orchestrator,
        }
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn pool(&self, class: WorkloadClass) -> &Pool {
        match class {
            WorkloadClass::Transactional => &self.transactional,
            WorkloadClass::Analytical => &self.analytical,
        }
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        WorkloadClass::ALL.into_iter().map(move |c| self.pool(c))
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    pub fn proxy_as_compute(&self) -> bool {
        self.proxy_as_compute.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
        tracing::info!(cluster = %self.settings.name, online, "Cluster online state changed");
    }

    pub fn down_after_no_response(&self) -> Duration {
        self.settings.down_after_no_response
    }

    pub fn max_cost_per_query(&self) -> i64 {
        self.settings.max_cost_per_query
    }

    fn is_dedicated(&self, class: WorkloadClass) -> bool {
        self.settings.dedicated_classes.contains(&class)
    }

    /// Route a transactional query.
    pub async fn get_connection(&self, cost: i64) -> Result<BackendConn> {
        self.get_connection_for(WorkloadClass::Transactional, cost).await
    }

    /// Pick a backend of `class` and hand out a connection to it.
    pub async fn get_connection_for(&self, class: WorkloadClass, cost: i64) -> Result<BackendConn> {
        let pool = self.pool(class);
        let backend = pool.select().inspect_err(|_| {
            metrics::record_route_error(class, "no_backend");
        })?;

        if backend.is_self() {
            self.proxy_cost.fetch_add(cost, Ordering::Relaxed);
            let conn = BackendConn::local(backend);
            metrics::record_connection(class, conn.kind().as_str());
            return Ok(conn);
        }
        pool.add_cost(cost);

        let conn = if self.is_dedicated(class) {
            BackendConn::dedicated(backend, self.connector()).await
        } else if !backend.is_up() {
            Err(RouterError::BackendDown(backend.addr().to_string()))
        } else {
            BackendConn::pooled(backend, self.connector()).await
        };

        match &conn {
            Ok(c) => metrics::record_connection(class, c.kind().as_str()),
            Err(RouterError::BackendDown(_)) => metrics::record_route_error(class, "backend_down"),
            Err(_) => metrics::record_route_error(class, "dial_failed"),
        }
        conn
    }

    // --- Cost accounting ---

    /// Cost served by the proxy itself since the last flush.
    pub fn proxy_cost(&self) -> i64 {
        self.proxy_cost.load(Ordering::Relaxed)
    }

    pub fn proxy_window_cost(&self) -> i64 {
        self.proxy_window_cost.load(Ordering::Relaxed)
    }

    /// Close the cost window of every pool and of the proxy.
    pub fn flush_costs(&self) {
        for pool in self.pools() {
            pool.flush_cost();
        }
        let cost = self.proxy_cost.swap(0, Ordering::Relaxed);
        self.proxy_window_cost.store(cost, Ordering::Relaxed);
    }

    /// Transactional load seen by the autoscaler over the last window.
    pub fn load(&self) -> i64 {
        self.transactional.window_cost() + self.proxy_window_cost()
    }

    fn refresh_proxy_as_compute(&self) {
        let has_self = self.pools().any(Pool::has_self);
        self.proxy_as_compute.store(has_self, Ordering::Release);
    }
}
