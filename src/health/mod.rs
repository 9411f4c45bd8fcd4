//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! sweep.rs:
//!     Periodic timer (while cluster online)
//!     → Probe every non-self backend concurrently
//!     → state.rs decides the transition
//!     → Pool::revive / Pool::mark_down / record ping
//! ```
//!
//! # Design Decisions
//! - ManualDown is only cleared by an explicit mark-up
//! - One backend's failure never aborts the sweep

pub mod state;
pub mod sweep;

pub use state::{next_transition, Transition};
pub use sweep::{HealthSweep, SweepReport};
