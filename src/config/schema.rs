//! Configuration schema definitions.
//!
//! Every field has a default so a minimal file (or none at all) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::backend::WorkloadClass;
use crate::orchestrator::PodInfo;

/// Root configuration for the router daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Cluster identity, static membership and health settings.
    pub cluster: ClusterConfig,

    /// Concurrent query admission.
    pub admission: AdmissionConfig,

    /// Fleet scale-in/scale-out controller.
    pub autoscale: AutoscaleConfig,

    /// Rolling QPS accounting.
    pub counter: CounterConfig,

    /// Membership bootstrap from the orchestrator.
    pub discovery: DiscoveryConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Cluster identity and backend handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    pub namespace: String,

    /// Static transactional members, `host[:port][@weight]` comma separated.
    pub transactional: String,
    /// Static analytical members.
    pub analytical: String,

    /// Grace window after the last successful probe; 0 disables mark-down.
    pub down_after_no_response_secs: u64,
    pub health_check_interval_secs: u64,
    pub connect_timeout_ms: u64,
    pub probe_timeout_secs: u64,

    pub max_cost_per_query: i64,

    /// Classes whose queries always get a fresh connection.
    pub dedicated_classes: Vec<WorkloadClass>,

    /// Removal drain: number of in-use checks and the pause between them.
    pub drain_attempts: u32,
    pub drain_backoff_ms: u64,

    pub max_idle_per_backend: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            namespace: "default".to_string(),
            transactional: String::new(),
            analytical: String::new(),
            down_after_no_response_secs: 30,
            health_check_interval_secs: 16,
            connect_timeout_ms: 3000,
            probe_timeout_secs: 2,
            max_cost_per_query: 0,
            dedicated_classes: vec![WorkloadClass::Analytical],
            drain_attempts: 30,
            drain_backoff_ms: 1000,
            max_idle_per_backend: 16,
        }
    }
}

impl ClusterConfig {
    pub fn down_after_no_response(&self) -> Duration {
        Duration::from_secs(self.down_after_no_response_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn drain_backoff(&self) -> Duration {
        Duration::from_millis(self.drain_backoff_ms)
    }

    /// Static address list for `class`.
    pub fn addresses(&self, class: WorkloadClass) -> &str {
        match class {
            WorkloadClass::Transactional => &self.transactional,
            WorkloadClass::Analytical => &self.analytical,
        }
    }
}

/// Admission control.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum number of queries executing at once.
    pub token_limit: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { token_limit: 1000 }
    }
}

/// Autoscale controller thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    pub enabled: bool,
    pub tick_ms: u64,

    /// Load below this cost counts as quiet.
    pub cost_threshold: i64,
    /// QPS below this counts as quiet.
    pub qps_threshold: f64,
    /// Consecutive quiet samples before a scale-in request.
    pub quiet_samples: u32,

    /// Base URL of the fleet scaler. Requests are only logged when unset.
    pub scaler_endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 1000,
            cost_threshold: 10_000,
            qps_threshold: 100.0,
            quiet_samples: 15,
            scaler_endpoint: None,
            request_timeout_secs: 5,
        }
    }
}

impl AutoscaleConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load counter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CounterConfig {
    pub flush_interval_ms: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self { flush_interval_ms: 1000 }
    }
}

impl CounterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Orchestrator-driven bootstrap.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Bootstrap membership from the orchestrator instead of the static lists.
    pub enabled: bool,

    /// Port compute pods listen on.
    pub port: u16,
    /// Weight given to proxy pods acting as compute.
    pub proxy_weight: f64,

    pub ready_poll_ms: u64,
    pub ready_poll_attempts: u32,
    pub reachability_attempts: u32,
    pub reachability_backoff_ms: u64,

    /// Pods served by the built-in static orchestrator.
    pub pods: Vec<PodInfo>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 4000,
            proxy_weight: 1.0,
            ready_poll_ms: 600,
            ready_poll_attempts: 200,
            reachability_attempts: 60,
            reachability_backoff_ms: 1000,
            pods: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn reachability_backoff(&self) -> Duration {
        Duration::from_millis(self.reachability_backoff_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: RouterConfig = toml::from_str("").unwrap();
        assert_eq!(config.cluster.health_check_interval(), Duration::from_secs(16));
        assert_eq!(config.cluster.drain_attempts, 30);
        assert_eq!(config.cluster.dedicated_classes, vec![WorkloadClass::Analytical]);
        assert_eq!(config.autoscale.quiet_samples, 15);
        assert_eq!(config.discovery.ready_poll_attempts, 200);
    }

    #[test]
    fn sections_parse() {
        let config: RouterConfig = toml::from_str(
            r#"
            [cluster]
            name = "orders"
            transactional = "self@4,10.0.0.2:4000"
            dedicated_classes = ["ap", "tp"]

            [observability]
            log_format = "json"

            [[discovery.pods]]
            name = "orders-tidb-0"
            namespace = "prod"
            peer_service = "orders-tidb-peer"
            role = "compute"
            class = "tp"
            cpu_request = "500m"
            "#,
        )
        .unwrap();

        assert_eq!(config.cluster.addresses(WorkloadClass::Transactional), "self@4,10.0.0.2:4000");
        assert_eq!(config.cluster.dedicated_classes.len(), 2);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.discovery.pods[0].class, Some(WorkloadClass::Transactional));
        assert!(config.discovery.pods[0].ready);
    }

    #[test]
    fn rendered_defaults_carry_no_credentials() {
        let rendered = toml::to_string(&RouterConfig::default()).unwrap();
        assert!(rendered.contains("[cluster]"));
        assert!(!rendered.contains("password"));
        assert!(!rendered.contains("user ="));
    }
}
