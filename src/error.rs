//! Error types for the router core.

use thiserror::Error;

use crate::load_balancer::backend::{Liveness, WorkloadClass};

/// Errors surfaced by routing, membership and control-loop operations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// An add was attempted with an empty address.
    #[error("backend address is empty")]
    EmptyAddress,

    /// The `@weight` suffix did not parse as a positive float.
    #[error("invalid weight '{weight}' in backend address '{address}'")]
    InvalidWeight { address: String, weight: String },

    /// The pool already holds a backend with this address.
    #[error("backend {0} already exists")]
    AlreadyExists(String),

    /// No backend with this address exists in the pool.
    #[error("backend {0} not found")]
    NotFound(String),

    /// Every backend of the class is down, or the pool is empty.
    #[error("no backend available for workload class {0}")]
    NoBackendAvailable(WorkloadClass),

    /// The selected backend went down between selection and checkout.
    #[error("backend {0} is down")]
    BackendDown(String),

    /// Dialing the backend failed.
    #[error("failed to dial backend {addr}: {source}")]
    DialFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The liveness probe against a backend failed.
    #[error("liveness probe against {addr} failed: {source}")]
    ProbeFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Mark-down was asked for a state that is not a down state.
    #[error("cannot mark a backend down as {0}")]
    NotADownState(Liveness),

    /// The local compute sentinel cannot be marked down.
    #[error("the self backend cannot be marked down")]
    SelfBackend,

    /// The orchestration platform could not be queried.
    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    /// The fleet scaler rejected or failed to receive a request.
    #[error("scaler error: {0}")]
    Scaler(String),

    /// Cluster bootstrap gave up.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, RouterError>;
