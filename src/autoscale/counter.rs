//! Rolling client QPS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::cluster::Cluster;
use crate::observability::metrics;

/// Counts queries and turns them into a QPS figure on each flush.
#[derive(Debug)]
pub struct LoadCounter {
    running: AtomicU64,
    /// f64 bits of the last flushed QPS.
    qps: AtomicU64,
    last_flush: Mutex<Instant>,
}

impl Default for LoadCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadCounter {
    pub fn new() -> Self {
        Self {
            running: AtomicU64::new(0),
            qps: AtomicU64::new(0f64.to_bits()),
            last_flush: Mutex::new(Instant::now()),
        }
    }

    pub fn record_query(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    /// Queries recorded since the last flush.
    pub fn pending(&self) -> u64 {
        self.running.load(Ordering::Relaxed)
    }

    /// QPS over the last completed flush window.
    pub fn qps(&self) -> f64 {
        f64::from_bits(self.qps.load(Ordering::Relaxed))
    }

    /// Close the current window and publish its QPS.
    pub fn flush(&self) -> f64 {
        let now = Instant::now();
        let elapsed = {
            let mut last = self.last_flush.lock().unwrap_or_else(PoisonError::into_inner);
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };

        let count = self.running.swap(0, Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        let qps = if secs > 0.0 { count as f64 / secs } else { count as f64 };

        self.qps.store(qps.to_bits(), Ordering::Relaxed);
        metrics::record_client_qps(qps);
        qps
    }
}

/// Periodic flush of the counter and of the cluster's cost windows.
pub struct CounterFlush {
    counter: Arc<LoadCounter>,
    cluster: Arc<Cluster>,
    interval: Duration,
}

impl CounterFlush {
    pub fn new(counter: Arc<LoadCounter>, cluster: Arc<Cluster>, interval: Duration) -> Self {
        Self {
            counter,
            cluster,
            interval,
        }
    }

    pub fn flush(&self) {
        let qps = self.counter.flush();
        self.cluster.flush_costs();
        tracing::trace!(qps, load = self.cluster.load(), "Load window flushed");
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush(),
                _ = shutdown.recv() => {
                    tracing::info!("Load counter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
