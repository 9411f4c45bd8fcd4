//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Cluster::get_connection(cost)
//!     → pool.rs (membership snapshot for the workload class)
//!     → weighted.rs (weighted round robin over live members)
//!     → backend.rs (liveness check, idle connection checkout)
//!     → Return routed connection or error
//!
//! Membership change (add / remove / mark down / mark up):
//!     → address.rs (parse host[:port][@weight])
//!     → pool.rs (exclusive writer: snapshot → compute → publish)
//! ```
//!
//! # Design Decisions
//! - Readers never lock: membership is an `ArcSwap` snapshot
//! - The selection table is rebuilt in full before it is published
//! - Liveness is an atomic tri-state read on the hot path
//! - Down members stay listed until explicitly removed

pub mod address;
pub mod backend;
pub mod pool;
pub mod weighted;

pub use address::{parse_address_list, BackendAddress};
pub use backend::{Backend, Liveness, SharedBackend, WorkloadClass};
pub use pool::Pool;
