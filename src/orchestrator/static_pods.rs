//! Orchestrator backed by a fixed pod list.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::Result;
use crate::orchestrator::{Orchestrator, PodInfo, PodSelector};

/// Serves pods from configuration. The list can be swapped on reload.
#[derive(Debug)]
pub struct StaticOrchestrator {
    pods: ArcSwap<Vec<PodInfo>>,
}

impl StaticOrchestrator {
    pub fn new(pods: Vec<PodInfo>) -> Self {
        Self {
            pods: ArcSwap::from_pointee(pods),
        }
    }

    /// Replace the pod list.
    pub fn replace(&self, pods: Vec<PodInfo>) {
        self.pods.store(Arc::new(pods));
    }
}

#[async_trait]
impl Orchestrator for StaticOrchestrator {
    async fn list_pods(&self, _cluster: &str, namespace: &str, selector: PodSelector) -> Result<Vec<PodInfo>> {
        Ok(self
            .pods
            .load()
            .iter()
            .filter(|p| p.namespace == namespace && p.matches(selector))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<Option<PodInfo>> {
        Ok(self
            .pods
            .load()
            .iter()
            .find(|p| p.name == name && p.namespace == namespace)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::WorkloadClass;
    use crate::orchestrator::PodRole;

    fn pod(name: &str, role: PodRole, class: Option<WorkloadClass>) -> PodInfo {
        PodInfo {
            name: name.into(),
            namespace: "prod".into(),
            peer_service: "db-peer".into(),
            role,
            class,
            ready: true,
            marked_for_deletion: false,
            cpu_request: None,
        }
    }

    #[tokio::test]
    async fn lists_by_selector_and_namespace() {
        let orch = StaticOrchestrator::new(vec![
            pod("proxy-0", PodRole::Proxy, None),
            pod("tp-0", PodRole::Compute, Some(WorkloadClass::Transactional)),
            pod("ap-0", PodRole::Compute, Some(WorkloadClass::Analytical)),
        ]);

        let tp = orch
            .list_pods("c", "prod", PodSelector::Compute(WorkloadClass::Transactional))
            .await
            .unwrap();
        assert_eq!(tp.len(), 1);
        assert_eq!(tp[0].name, "tp-0");

        assert_eq!(orch.list_pods("c", "prod", PodSelector::Proxy).await.unwrap().len(), 1);
        assert!(orch.list_pods("c", "dev", PodSelector::Proxy).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_pod_after_replace() {
        let orch = StaticOrchestrator::new(vec![]);
        assert!(orch.get_pod("tp-0", "prod").await.unwrap().is_none());

        orch.replace(vec![pod("tp-0", PodRole::Compute, Some(WorkloadClass::Transactional))]);
        assert!(orch.get_pod("tp-0", "prod").await.unwrap().is_some());
    }
}
