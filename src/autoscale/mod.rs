//! Fleet autoscaling.
//!
//! # Data Flow
//! ```text
//! Router::route → LoadCounter::record_query
//! CounterFlush (every flush interval)
//!     → LoadCounter::flush (qps)
//!     → Cluster::flush_costs (cost windows)
//! AutoscaleController (every tick)
//!     → QuietStreak
//!     → FleetScaler::request_scale (spawned)
//! ```

pub mod controller;
pub mod counter;
pub mod scaler;

pub use controller::{AutoscaleController, ControllerSettings, Decision, QuietStreak};
pub use counter::{CounterFlush, LoadCounter};
pub use scaler::{FleetScaler, HttpScaler, LogScaler, ScaleDirection, ScaleRequest};
