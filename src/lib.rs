//! Backend connection router and fleet autoscaler for a database proxy.

pub mod admission;
pub mod autoscale;
pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod orchestrator;
pub mod resilience;
pub mod router;

pub use cluster::{AddOutcome, Cluster, ClusterSettings};
pub use config::schema::RouterConfig;
pub use error::{Result, RouterError};
pub use lifecycle::Shutdown;
pub use router::{RoutedQuery, Router};
