//! Admission control.
//!
//! # Data Flow
//! ```text
//! Query arrives at the protocol layer
//!     → limiter.rs (block until a token is free)
//!     → route and execute
//!     → token dropped or released (slot returns to the pool)
//! ```
//!
//! # Design Decisions
//! - One process-wide ticket pool, independent of backend pools
//! - Tokens are RAII so a panicking handler cannot leak a slot
//! - No built-in deadline; callers wrap `acquire` in a timeout when needed

pub mod limiter;

pub use limiter::{Token, TokenLimiter};
