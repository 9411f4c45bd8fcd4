//! Orchestration platform capability.
//!
//! The router never talks to the platform API directly; it consumes the
//! `Orchestrator` trait. `StaticOrchestrator` serves pods declared in the
//! config file, which is what the daemon uses when no platform client is
//! wired in.

pub mod discovery;
pub mod static_pods;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::load_balancer::backend::WorkloadClass;

pub use discovery::{cpu_to_weight, format_pod_addresses, pod_address};
pub use static_pods::StaticOrchestrator;

/// What a pod does in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodRole {
    /// A proxy replica; it becomes the `self` sentinel.
    Proxy,
    /// A compute node of some workload class.
    Compute,
}

/// Which pods to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodSelector {
    Proxy,
    Compute(WorkloadClass),
}

/// The slice of pod state the router cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    /// Headless service giving the pod a stable DNS name.
    #[serde(default)]
    pub peer_service: String,
    pub role: PodRole,
    /// Workload class, for compute pods.
    #[serde(default)]
    pub class: Option<WorkloadClass>,
    #[serde(default = "default_true")]
    pub ready: bool,
    /// Set when the pod is about to be deleted.
    #[serde(default)]
    pub marked_for_deletion: bool,
    /// CPU request of the compute container, e.g. `500m` or `2`.
    #[serde(default)]
    pub cpu_request: Option<String>,
}

fn default_true() -> bool {
    true
}

impl PodInfo {
    pub fn matches(&self, selector: PodSelector) -> bool {
        match selector {
            PodSelector::Proxy => self.role == PodRole::Proxy,
            PodSelector::Compute(class) => self.role == PodRole::Compute && self.class == Some(class),
        }
    }
}

/// Read access to the orchestration platform.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Pods of `cluster` in `namespace` matching `selector`, in listing order.
    async fn list_pods(&self, cluster: &str, namespace: &str, selector: PodSelector) -> Result<Vec<PodInfo>>;

    /// A single pod, or `None` if it does not exist.
    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<PodInfo>>;
}
