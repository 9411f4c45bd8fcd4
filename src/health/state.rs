//! Backend liveness transitions.
//!
//! # State Transitions
//! ```text
//! probe ok,   Down        → Revive (re-dial, Up)
//! probe ok,   Up          → RecordPing
//! probe ok,   ManualDown  → RecordPing (state untouched)
//! probe fail, Up          → MarkDown once the grace window has elapsed
//! anything else           → Nothing
//! ```
//!
//! A grace window of zero disables automatic mark-down.

use std::time::Duration;

use crate::load_balancer::backend::Liveness;

/// What the sweep should do with one probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Revive,
    RecordPing,
    MarkDown,
    Nothing,
}

/// Decide the transition for a backend in `current` state.
pub fn next_transition(
    current: Liveness,
    probe_ok: bool,
    since_last_ping: Duration,
    grace: Duration,
) -> Transition {
    match (probe_ok, current) {
        (true, Liveness::Down) => Transition::Revive,
        (true, Liveness::Up | Liveness::ManualDown) => Transition::RecordPing,
        (false, Liveness::Up) if !grace.is_zero() && since_last_ping > grace => Transition::MarkDown,
        (false, _) => Transition::Nothing,
    }
}
