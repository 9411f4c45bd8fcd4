//! Administrative membership changes.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::schema::ClusterConfig;
use crate::error::{Result, RouterError};
use crate::load_balancer::address::{parse_address_list, BackendAddress};
use crate::load_balancer::backend::{Backend, Liveness, WorkloadClass};
use crate::resilience::retry::retry_fixed;

use super::Cluster;

/// Result of an add that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The backing pod is missing or about to be deleted.
    Skipped,
}

impl Cluster {
    /// Add one backend given as `host[:port][@weight]` or `self[@weight]`.
    pub async fn add_member(&self, spec: &str, class: WorkloadClass) -> Result<AddOutcome> {
        let address = BackendAddress::parse(spec)?;
        let pool = self.pool(class);
        if pool.find(&address.host).is_some() {
            return Err(RouterError::AlreadyExists(address.host));
        }

        if !address.is_self() && !self.pod_is_ready(&address).await? {
            tracing::info!(backend = %address.host, class = %class, "Backend pod not ready, skipping add");
            return Ok(AddOutcome::Skipped);
        }

        let backend = if address.is_self() {
            Backend::local(address.weight, class)
        } else {
            Backend::remote(
                address.host,
                address.weight,
                class,
                self.settings.max_idle_per_backend,
            )
        };
        pool.add(Arc::new(backend))?;
        self.refresh_proxy_as_compute();
        Ok(AddOutcome::Added)
    }

    /// Add every entry of a comma separated list. The whole list is parsed
    /// before anything is added; duplicates are logged and left alone.
    pub async fn add_members(&self, list: &str, class: WorkloadClass) -> Result<usize> {
        let addresses = parse_address_list(list)?;
        let mut added = 0;
        for address in addresses {
            match self.add_member(&address.to_string(), class).await {
                Ok(AddOutcome::Added) => added += 1,
                Ok(AddOutcome::Skipped) => {}
                Err(RouterError::AlreadyExists(host)) => {
                    tracing::debug!(backend = %host, class = %class, "Backend already present");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Only addresses shaped like a pod DNS name are looked up, and only
    /// when membership is orchestrator-backed.
    async fn pod_is_ready(&self, address: &BackendAddress) -> Result<bool> {
        if !self.settings.discovery {
            return Ok(true);
        }
        let Some(pod) = address.pod_ref() else {
            return Ok(true);
        };
        let found = self.orchestrator.get_pod(&pod.name, &pod.namespace).await?;
        Ok(matches!(found, Some(p) if !p.marked_for_deletion))
    }

    /// Revoke routing to a backend immediately, then wait a bounded time for
    /// its in-use connections to be returned. Drain exhaustion is logged;
    /// the removal still succeeds.
    pub async fn remove_member(&self, addr: &str, class: WorkloadClass) -> Result<()> {
        let removed = self.pool(class).remove(addr)?;
        removed.close_idle();
        self.refresh_proxy_as_compute();

        let backend = &removed;
        let drained = retry_fixed(self.settings.drain_backoff, self.settings.drain_attempts, || async move {
            backend.active_connections() == 0
        })
        .await;

        match drained {
            Ok(attempts) => {
                tracing::info!(backend = %removed.addr(), class = %class, attempts, "Backend drained");
            }
            Err(e) => {
                tracing::warn!(
                    backend = %removed.addr(),
                    class = %class,
                    in_use = removed.active_connections(),
                    attempts = e.attempts,
                    "Backend still has connections in use after drain"
                );
            }
        }
        Ok(())
    }

    /// Take a backend out of selection. `state` is `Down` or `ManualDown`.
    pub fn mark_down(&self, addr: &str, class: WorkloadClass, state: Liveness) -> Result<()> {
        self.pool(class).mark_down(addr, state)
    }

    /// Operator recovery; clears ManualDown.
    pub async fn mark_up(&self, addr: &str, class: WorkloadClass) -> Result<()> {
        self.pool(class).mark_up(addr, self.connector()).await
    }

    /// Bring static membership in line with a reloaded config: add addresses
    /// that appeared, remove addresses that disappeared. Weights of members
    /// that stay are not changed.
    pub async fn reconcile(&self, config: &ClusterConfig) -> Result<()> {
        for class in WorkloadClass::ALL {
            let desired = parse_address_list(config.addresses(class))?;
            let wanted: HashSet<&str> = desired.iter().map(|a| a.host.as_str()).collect();

            let current = self.pool(class).snapshot();
            let stale: Vec<String> = current
                .members()
                .iter()
                .filter(|b| !wanted.contains(b.addr()))
                .map(|b| b.addr().to_string())
                .collect();

            for address in &desired {
                if current.find(&address.host).is_some() {
                    continue;
                }
                match self.add_member(&address.to_string(), class).await {
                    Ok(_) | Err(RouterError::AlreadyExists(_)) => {}
                    Err(e) => {
                        tracing::warn!(backend = %address.host, class = %class, error = %e, "Reconcile add failed");
                    }
                }
            }

            for addr in stale {
                if let Err(e) = self.remove_member(&addr, class).await {
                    tracing::warn!(backend = %addr, class = %class, error = %e, "Reconcile remove failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterSettings;
    use crate::net::connector::TcpConnector;
    use crate::orchestrator::{PodInfo, PodRole, StaticOrchestrator};
    use std::time::Duration;

    fn pod(name: &str, deleting: bool) -> PodInfo {
        PodInfo {
            name: name.into(),
            namespace: "prod".into(),
            peer_service: "db-peer".into(),
            role: PodRole::Compute,
            class: Some(WorkloadClass::Transactional),
            ready: true,
            marked_for_deletion: deleting,
            cpu_request: None,
        }
    }

    fn cluster_with(pods: Vec<PodInfo>) -> Cluster {
        let settings = ClusterSettings {
            discovery: true,
            drain_attempts: 3,
            drain_backoff: Duration::from_secs(1),
            ..ClusterSettings::default()
        };
        Cluster::new(
            settings,
            Arc::new(TcpConnector::new(Duration::from_secs(1), Duration::from_secs(1))),
            Arc::new(StaticOrchestrator::new(pods)),
        )
    }

    #[tokio::test]
    async fn add_rejects_bad_input_without_mutation() {
        let cluster = cluster_with(vec![]);
        let tp = WorkloadClass::Transactional;

        assert!(matches!(cluster.add_member("", tp).await, Err(RouterError::EmptyAddress)));
        assert!(matches!(
            cluster.add_member("a:4000@zero", tp).await,
            Err(RouterError::InvalidWeight { .. })
        ));
        cluster.add_member("a:4000@2", tp).await.unwrap();
        assert!(matches!(
            cluster.add_member("a:4000@9", tp).await,
            Err(RouterError::AlreadyExists(_))
        ));
        assert_eq!(cluster.pool(tp).len(), 1);
        assert_eq!(cluster.pool(tp).snapshot().weights(), &[2.0]);
    }

    #[tokio::test]
    async fn pod_addresses_are_checked_with_orchestrator() {
        let cluster = cluster_with(vec![pod("db-0", false), pod("db-1", true)]);
        let tp = WorkloadClass::Transactional;

        assert_eq!(cluster.add_member("db-0.db-peer.prod:4000", tp).await.unwrap(), AddOutcome::Added);
        assert_eq!(cluster.add_member("db-1.db-peer.prod:4000", tp).await.unwrap(), AddOutcome::Skipped);
        assert_eq!(cluster.add_member("db-9.db-peer.prod:4000", tp).await.unwrap(), AddOutcome::Skipped);
        assert_eq!(cluster.pool(tp).len(), 1);
    }

    #[tokio::test]
    async fn static_fqdn_member_is_added_without_lookup() {
        let cluster = Cluster::new(
            ClusterSettings::default(),
            Arc::new(TcpConnector::new(Duration::from_secs(1), Duration::from_secs(1))),
            Arc::new(StaticOrchestrator::new(Vec::new())),
        );
        let tp = WorkloadClass::Transactional;

        let outcome = cluster.add_member("mysql.prod.example.com:3306", tp).await.unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        assert_eq!(cluster.pool(tp).len(), 1);
    }

    #[tokio::test]
    async fn bulk_add_skips_duplicates() {
        let cluster = cluster_with(vec![]);
        let tp = WorkloadClass::Transactional;
        cluster.add_member("a:4000", tp).await.unwrap();

        let added = cluster.add_members("a:4000,b:4000@3,self@2,", tp).await.unwrap();
        assert_eq!(added, 2);
        assert!(cluster.proxy_as_compute());
        assert!(cluster.add_members("c:4000,d:4000@-1", tp).await.is_err());
        assert!(cluster.pool(tp).find("c:4000").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn removing_self_clears_proxy_flag() {
        let cluster = cluster_with(vec![]);
        let tp = WorkloadClass::Transactional;
        cluster.add_member("self@4", tp).await.unwrap();
        cluster.add_member("a:4000", tp).await.unwrap();

        cluster.remove_member("self", tp).await.unwrap();
        assert!(!cluster.proxy_as_compute());
        assert_eq!(cluster.pool(tp).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_adds_and_removes() {
        let cluster = cluster_with(vec![]);
        cluster.add_members("a:4000,b:4000", WorkloadClass::Transactional).await.unwrap();

        let config = ClusterConfig {
            transactional: "b:4000,c:4000@2".into(),
            analytical: "x:4000".into(),
            ..ClusterConfig::default()
        };
        cluster.reconcile(&config).await.unwrap();

        let tp = cluster.pool(WorkloadClass::Transactional).snapshot();
        let addrs: Vec<_> = tp.members().iter().map(|b| b.addr().to_string()).collect();
        assert_eq!(addrs, vec!["b:4000", "c:4000"]);
        assert_eq!(cluster.pool(WorkloadClass::Analytical).len(), 1);
    }

    #[tokio::test]
    async fn mark_down_and_missing_member() {
        let cluster = cluster_with(vec![]);
        let tp = WorkloadClass::Transactional;
        cluster.add_member("a:4000", tp).await.unwrap();

        cluster.mark_down("a:4000", tp, Liveness::ManualDown).unwrap();
        assert_eq!(cluster.pool(tp).find("a:4000").unwrap().liveness(), Liveness::ManualDown);
        assert!(matches!(cluster.mark_down("zz:1", tp, Liveness::Down), Err(RouterError::NotFound(_))));
        assert!(matches!(cluster.get_connection(1).await, Err(RouterError::NoBackendAvailable(_))));
    }
}
