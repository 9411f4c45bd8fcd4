//! Hysteresis controller for fleet scale requests.
//!
//! # State Machine
//! ```text
//! every tick:
//!     quiet (load < cost_threshold && qps < qps_threshold)
//!         → streak += 1
//!         → streak == quiet_samples: reset; scale in if >1 non-self tp member
//!     busy
//!         → streak = 0
//!         → scale out if the proxy is the only tp member
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::autoscale::counter::LoadCounter;
use crate::autoscale::scaler::{FleetScaler, ScaleDirection, ScaleRequest};
use crate::cluster::Cluster;
use crate::config::schema::AutoscaleConfig;
use crate::load_balancer::backend::WorkloadClass;
use crate::observability::metrics;

/// Consecutive quiet samples.
#[derive(Debug, Clone, Copy)]
pub struct QuietStreak {
    count: u32,
    threshold: u32,
}

impl QuietStreak {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Count a quiet sample. True when the streak reaches the threshold, at
    /// which point it starts over.
    pub fn observe_quiet(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    ScaleIn,
    ScaleOut,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub tick: Duration,
    pub cost_threshold: i64,
    pub qps_threshold: f64,
    pub quiet_samples: u32,
}

impl From<&AutoscaleConfig> for ControllerSettings {
    fn from(config: &AutoscaleConfig) -> Self {
        Self {
            tick: config.tick(),
            cost_threshold: config.cost_threshold,
            qps_threshold: config.qps_threshold,
            quiet_samples: config.quiet_samples,
        }
    }
}

pub struct AutoscaleController {
    cluster: Arc<Cluster>,
    counter: Arc<LoadCounter>,
    scaler: Arc<dyn FleetScaler>,
    settings: ControllerSettings,
    streak: QuietStreak,
}

impl AutoscaleController {
    pub fn new(
        cluster: Arc<Cluster>,
        counter: Arc<LoadCounter>,
        scaler: Arc<dyn FleetScaler>,
        settings: ControllerSettings,
    ) -> Self {
        let streak = QuietStreak::new(settings.quiet_samples);
        Self {
            cluster,
            counter,
            scaler,
            settings,
            streak,
        }
    }

    pub fn streak(&self) -> &QuietStreak {
        &self.streak
    }

    /// Sample the load once and update the streak.
    pub fn evaluate(&mut self) -> Decision {
        let load = self.cluster.load();
        let qps = self.counter.qps();
        let tp = self.cluster.pool(WorkloadClass::Transactional);

        let quiet = load < self.settings.cost_threshold && qps < self.settings.qps_threshold;
        if quiet {
            if self.streak.observe_quiet() && tp.non_self_len() > 1 {
                return Decision::ScaleIn;
            }
            return Decision::Hold;
        }

        self.streak.reset();
        if self.cluster.proxy_as_compute() && tp.len() == 1 {
            Decision::ScaleOut
        } else {
            Decision::Hold
        }
    }

    /// Evaluate and emit the resulting request, if any.
    pub fn tick(&mut self) -> Decision {
        let decision = self.evaluate();
        match decision {
            Decision::ScaleIn => self.emit(ScaleDirection::In, 0),
            Decision::ScaleOut => self.emit(ScaleDirection::Out, 1),
            Decision::Hold => {}
        }
        decision
    }

    /// Fire and forget; failures are logged, not retried.
    fn emit(&self, direction: ScaleDirection, target_hint: u32) {
        let settings = self.cluster.settings();
        let request = ScaleRequest {
            cluster: settings.name.clone(),
            namespace: settings.namespace.clone(),
            class: WorkloadClass::Transactional,
            direction,
            target_hint,
            max_cost_per_query: settings.max_cost_per_query,
        };
        tracing::info!(
            cluster = %request.cluster,
            direction = %direction,
            load = self.cluster.load(),
            qps = self.counter.qps(),
            max_cost_per_query = request.max_cost_per_query,
            "Requesting fleet scale"
        );

        let scaler = self.scaler.clone();
        tokio::spawn(async move {
            let outcome = match scaler.request_scale(&request).await {
                Ok(()) => "ok",
                Err(e) => {
                    tracing::warn!(direction = %request.direction, error = %e, "Scale request failed");
                    "error"
                }
            };
            metrics::record_scale_request(request.class, request.direction.as_str(), outcome);
        });
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            tick_ms = self.settings.tick.as_millis() as u64,
            quiet_samples = self.settings.quiet_samples,
            "Autoscale controller starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.settings.tick, self.settings.tick);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Autoscale controller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streak_fires_on_threshold_and_restarts() {
        let mut streak = QuietStreak::new(3);
        assert!(!streak.observe_quiet());
        assert!(!streak.observe_quiet());
        assert!(streak.observe_quiet());
        assert_eq!(streak.count(), 0);
        assert!(!streak.observe_quiet());
    }

    #[test]
    fn reset_clears_progress() {
        let mut streak = QuietStreak::new(15);
        for _ in 0..14 {
            assert!(!streak.observe_quiet());
        }
        streak.reset();
        for _ in 0..14 {
            assert!(!streak.observe_quiet());
        }
        assert!(streak.observe_quiet());
    }
}
