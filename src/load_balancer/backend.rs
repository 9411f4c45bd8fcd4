//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single compute node (or the proxy itself)
//! - Track in-use connections so removal can drain
//! - Hold the tri-state liveness flag
//! - Own the idle connections dialed to this node

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Address sentinel for the proxy acting as its own compute node.
pub const SELF_ADDR: &str = "self";

/// Partition of compute nodes serving one traffic shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadClass {
    /// Short transactional queries.
    #[serde(rename = "tp")]
    Transactional,
    /// Long analytical queries.
    #[serde(rename = "ap")]
    Analytical,
}

impl WorkloadClass {
    pub const ALL: [WorkloadClass; 2] = [WorkloadClass::Transactional, WorkloadClass::Analytical];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadClass::Transactional => "tp",
            WorkloadClass::Analytical => "ap",
        }
    }
}

impl fmt::Display for WorkloadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Up = 0,
    Down = 1,
    /// Operator forced; the health sweep never clears it.
    ManualDown = 2,
}

impl From<u8> for Liveness {
    fn from(val: u8) -> Self {
        match val {
            1 => Liveness::Down,
            2 => Liveness::ManualDown,
            _ => Liveness::Up,
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Liveness::Up => "up",
            Liveness::Down => "down",
            Liveness::ManualDown => "manual_down",
        };
        f.write_str(s)
    }
}

/// A single compute node.
#[derive(Debug)]
pub struct Backend {
    addr: String,
    weight: f64,
    class: WorkloadClass,
    is_self: bool,

    liveness: AtomicU8,
    /// Number of connection handles currently checked out.
    active_connections: AtomicUsize,

    /// Reference point for `last_ping_ms`.
    created_at: Instant,
    /// Milliseconds after `created_at` of the last successful probe.
    last_ping_ms: AtomicU64,

    idle: Mutex<Vec<TcpStream>>,
    max_idle: usize,
}

impl Backend {
    /// Create a network backend. It starts Up with a fresh ping timestamp.
    pub fn remote(addr: impl Into<String>, weight: f64, class: WorkloadClass, max_idle: usize) -> Self {
        Self::build(addr.into(), weight, class, false, max_idle)
    }

    /// Create the local compute sentinel.
    pub fn local(weight: f64, class: WorkloadClass) -> Self {
        Self::build(SELF_ADDR.to_string(), weight, class, true, 0)
    }

    fn build(addr: String, weight: f64, class: WorkloadClass, is_self: bool, max_idle: usize) -> Self {
        Self {
            addr,
            weight,
            class,
            is_self,
            liveness: AtomicU8::new(Liveness::Up as u8),
            active_connections: AtomicUsize::new(0),
            created_at: Instant::now(),
            last_ping_ms: AtomicU64::new(0),
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn class(&self) -> WorkloadClass {
        self.class
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn liveness(&self) -> Liveness {
        Liveness::from(self.liveness.load(Ordering::Acquire))
    }

    pub fn is_up(&self) -> bool {
        self.liveness() == Liveness::Up
    }

    /// Store a new liveness state. Only the owning pool calls this, so the
    /// selection table can be rebuilt alongside.
    pub(crate) fn set_liveness(&self, state: Liveness) {
        self.liveness.store(state as u8, Ordering::Release);
    }

    /// Atomically move from `from` to `to`; false if the state was not `from`.
    pub(crate) fn transition(&self, from: Liveness, to: Liveness) -> bool {
        self.liveness
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Get the current number of checked out connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    pub(crate) fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::AcqRel);
    }

    // --- Health bookkeeping ---

    /// Record a successful probe at `now`.
    pub fn record_ping(&self, now: Instant) {
        let ms = now.saturating_duration_since(self.created_at).as_millis() as u64;
        self.last_ping_ms.store(ms, Ordering::Release);
    }

    /// Instant of the last successful probe (creation counts as one).
    pub fn last_ping(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_ping_ms.load(Ordering::Acquire))
    }

    /// Time since the last successful probe.
    pub fn since_last_ping(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_ping())
    }

    // --- Idle connections ---

    /// Take an idle connection, if any.
    pub(crate) fn pop_idle(&self) -> Option<TcpStream> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    /// Return a connection for reuse. Dropped if the backend is not Up or
    /// the idle stack is full.
    pub(crate) fn push_idle(&self, stream: TcpStream) {
        if !self.is_up() {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(stream);
        }
    }

    /// Close every idle connection.
    pub fn close_idle(&self) -> usize {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let n = idle.len();
        idle.clear();
        n
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Shared handle to a backend.
pub type SharedBackend = Arc<Backend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backend_starts_up_and_idle() {
        let b = Backend::remote("a:3306", 2.0, WorkloadClass::Transactional, 4);
        assert_eq!(b.liveness(), Liveness::Up);
        assert_eq!(b.active_connections(), 0);
        assert_eq!(b.weight(), 2.0);
        assert!(!b.is_self());
    }

    #[test]
    fn local_sentinel_is_self() {
        let b = Backend::local(4.0, WorkloadClass::Transactional);
        assert!(b.is_self());
        assert_eq!(b.addr(), SELF_ADDR);
    }

    #[test]
    fn transition_only_from_expected_state() {
        let b = Backend::remote("a:3306", 1.0, WorkloadClass::Transactional, 4);
        assert!(!b.transition(Liveness::Down, Liveness::Up));
        assert!(b.transition(Liveness::Up, Liveness::Down));
        assert_eq!(b.liveness(), Liveness::Down);
    }

    #[test]
    fn connection_count_moves_both_ways() {
        let b = Backend::remote("a:3306", 1.0, WorkloadClass::Transactional, 4);
        b.inc_connections();
        b.inc_connections();
        b.dec_connections();
        assert_eq!(b.active_connections(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_tracks_elapsed_time() {
        let b = Backend::remote("a:3306", 1.0, WorkloadClass::Transactional, 4);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(b.since_last_ping(Instant::now()) >= Duration::from_secs(3));

        b.record_ping(Instant::now());
        assert!(b.since_last_ping(Instant::now()) < Duration::from_millis(1));
    }

    #[test]
    fn class_round_trips_through_serde_names() {
        assert_eq!(WorkloadClass::Transactional.to_string(), "tp");
        assert_eq!(WorkloadClass::Analytical.as_str(), "ap");
    }
}
