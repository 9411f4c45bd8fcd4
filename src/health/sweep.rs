//! Periodic health sweep.
//!
//! # Responsibilities
//! - Probe every non-self backend of every pool, concurrently
//! - Apply `state::next_transition` to each result
//! - Stop once the cluster goes offline or shutdown is broadcast

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::cluster::Cluster;
use crate::health::state::{next_transition, Transition};
use crate::load_balancer::backend::SharedBackend;
use crate::load_balancer::pool::Pool;
use crate::resilience::timeouts::with_timeout;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub revived: usize,
    pub marked_down: usize,
}

pub struct HealthSweep {
    cluster: Arc<Cluster>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthSweep {
    pub fn new(cluster: Arc<Cluster>, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            cluster,
            interval,
            probe_timeout,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            cluster = %self.cluster.name(),
            interval_secs = self.interval.as_secs(),
            "Health sweep starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.cluster.is_online() {
                        tracing::info!("Cluster offline, health sweep exiting");
                        break;
                    }
                    self.sweep_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health sweep received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every pool once.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for pool in self.cluster.pools() {
            let members: Vec<SharedBackend> = pool
                .snapshot()
                .members()
                .iter()
                .filter(|b| !b.is_self())
                .cloned()
                .collect();

            let results = join_all(members.iter().map(|b| self.probe(b))).await;
            for (backend, ok) in members.iter().zip(results) {
                report.probed += 1;
                self.apply(pool, backend, ok, &mut report).await;
            }
        }

        tracing::debug!(
            probed = report.probed,
            revived = report.revived,
            marked_down = report.marked_down,
            "Health sweep finished"
        );
        report
    }

    async fn probe(&self, backend: &SharedBackend) -> bool {
        let connector = self.cluster.connector();
        match with_timeout(self.probe_timeout, "probe", connector.probe(backend.addr())).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = %backend.addr(), error = %e, "Health probe failed");
                false
            }
        }
    }

    async fn apply(&self, pool: &Pool, backend: &SharedBackend, ok: bool, report: &mut SweepReport) {
        let now = Instant::now();
        let transition = next_transition(
            backend.liveness(),
            ok,
            backend.since_last_ping(now),
            self.cluster.down_after_no_response(),
        );

        match transition {
            Transition::RecordPing => backend.record_ping(now),
            Transition::Revive => match pool.revive(backend.addr(), self.cluster.connector()).await {
                Ok(true) => report.revived += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(backend = %backend.addr(), error = %e, "Failed to revive backend");
                }
            },
            Transition::MarkDown => {
                tracing::warn!(
                    backend = %backend.addr(),
                    class = %pool.class(),
                    since_last_ping_secs = backend.since_last_ping(now).as_secs(),
                    "No successful probe within grace window, marking down"
                );
                match pool.expire(backend.addr()) {
                    Ok(true) => report.marked_down += 1,
                    Ok(false) => {}
                    Err(e) => tracing::warn!(backend = %backend.addr(), error = %e, "Failed to mark backend down"),
                }
            }
            Transition::Nothing => {}
        }
    }
}
