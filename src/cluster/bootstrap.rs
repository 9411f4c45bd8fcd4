//! Initial membership from the orchestrator.

use crate::config::schema::DiscoveryConfig;
use crate::error::{Result, RouterError};
use crate::load_balancer::backend::WorkloadClass;
use crate::orchestrator::{format_pod_addresses, pod_address, PodInfo, PodRole, PodSelector};
use crate::resilience::retry::{poll_fixed, retry_fixed};

use super::Cluster;

impl Cluster {
    /// Populate every pool from the orchestrator.
    ///
    /// The transactional class waits until at least one pod is ready and
    /// reachable. Analytical pods are taken as listed; an empty analytical
    /// pool is valid.
    pub async fn bootstrap(&self, discovery: &DiscoveryConfig) -> Result<()> {
        for class in WorkloadClass::ALL {
            let pods = match class {
                WorkloadClass::Transactional => self.wait_for_ready(class, discovery).await?,
                WorkloadClass::Analytical => self.ready_pods(class).await?,
            };
            if pods.is_empty() {
                tracing::info!(cluster = %self.name(), class = %class, "No ready pods, pool left empty");
                continue;
            }

            if class == WorkloadClass::Transactional {
                self.wait_until_reachable(&pods, discovery).await?;
            }

            let list = format_pod_addresses(
                &pods,
                &self.settings.namespace,
                discovery.port,
                discovery.proxy_weight,
            );
            let added = self.add_members(&list, class).await?;
            tracing::info!(cluster = %self.name(), class = %class, added, "Pool bootstrapped");
        }
        Ok(())
    }

    /// Ready pods of `class`; transactional listings include proxy pods.
    async fn ready_pods(&self, class: WorkloadClass) -> Result<Vec<PodInfo>> {
        let (cluster, namespace) = (self.settings.name.as_str(), self.settings.namespace.as_str());
        let mut pods = self
            .orchestrator
            .list_pods(cluster, namespace, PodSelector::Compute(class))
            .await?;
        if class == WorkloadClass::Transactional {
            pods.extend(self.orchestrator.list_pods(cluster, namespace, PodSelector::Proxy).await?);
        }
        pods.retain(|p| p.ready && !p.marked_for_deletion);
        Ok(pods)
    }

    async fn wait_for_ready(&self, class: WorkloadClass, discovery: &DiscoveryConfig) -> Result<Vec<PodInfo>> {
        // Orchestrator errors end the wait; an empty listing polls again.
        poll_fixed(
            discovery.ready_poll_interval(),
            discovery.ready_poll_attempts.max(1),
            || async move {
                match self.ready_pods(class).await {
                    Ok(pods) if pods.is_empty() => {
                        tracing::debug!(cluster = %self.name(), class = %class, "Waiting for a ready pod");
                        None
                    }
                    polled => Some(polled),
                }
            },
        )
        .await
        .map_err(|e| RouterError::Bootstrap(format!("no ready {class} pod: {e}")))?
    }

    /// Probe one compute pod until it answers. Proxy-only listings pass.
    async fn wait_until_reachable(&self, pods: &[PodInfo], discovery: &DiscoveryConfig) -> Result<()> {
        let Some(target) = pods.iter().find(|p| p.role == PodRole::Compute) else {
            return Ok(());
        };
        let addr = pod_address(target, &self.settings.namespace, discovery.port);
        let (connector, probe_addr) = (self.connector(), addr.as_str());

        retry_fixed(
            discovery.reachability_backoff(),
            discovery.reachability_attempts.max(1),
            || async move { connector.probe(probe_addr).await.is_ok() },
        )
        .await
        .map(|attempts| {
            tracing::info!(backend = %addr, attempts, "Compute pod reachable");
        })
        .map_err(|e| RouterError::Bootstrap(format!("{addr} unreachable: {e}")))
    }
}
