//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend dial / probe:
//!     → timeouts.rs (every network call gets a deadline)
//!
//! Drain on removal, bootstrap readiness polling:
//!     → retry.rs (fixed backoff, bounded attempt count)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Waits are bounded by attempt count, never open-ended
//! - Exhausting retries is reported to the caller, who decides whether it is fatal

pub mod retry;
pub mod timeouts;
