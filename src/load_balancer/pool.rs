//! Backend pool management.
//!
//! # Responsibilities
//! - Hold the members of one workload class with their weights
//! - Pick a live member with weighted round robin
//! - Apply membership and liveness changes atomically
//! - Accumulate the query cost routed to this class

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use tokio::time::Instant;

use crate::error::{Result, RouterError};
use crate::load_balancer::address::host_of;
use crate::load_balancer::backend::{Liveness, SharedBackend, WorkloadClass};
use crate::load_balancer::weighted::SelectionTable;
use crate::net::connector::Connector;
use crate::observability::metrics;

/// Immutable membership snapshot. `members` and `weights` are index aligned
/// and `table` was built from exactly this pair.
#[derive(Debug, Default)]
pub struct Membership {
    members: Vec<SharedBackend>,
    weights: Vec<f64>,
    table: SelectionTable,
}

impl Membership {
    fn new(members: Vec<SharedBackend>, weights: Vec<f64>) -> Self {
        let table = SelectionTable::build(&members, &weights);
        Self {
            members,
            weights,
            table,
        }
    }

    /// Same members, table rebuilt against current liveness.
    fn rebuilt(&self) -> Self {
        Self::new(self.members.clone(), self.weights.clone())
    }

    pub fn members(&self) -> &[SharedBackend] {
        &self.members
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn table(&self) -> &SelectionTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn position(&self, addr: &str) -> Option<usize> {
        let host = host_of(addr);
        self.members.iter().position(|b| b.addr() == host)
    }

    pub fn find(&self, addr: &str) -> Option<&SharedBackend> {
        self.position(addr).map(|i| &self.members[i])
    }
}

/// Members of one workload class.
#[derive(Debug)]
pub struct Pool {
    class: WorkloadClass,
    membership: ArcSwap<Membership>,
    /// Serializes writers; readers go through `membership` without locking.
    write_lock: Mutex<()>,
    cursor: AtomicUsize,

    accumulated_cost: AtomicI64,
    window_cost: AtomicI64,
}

impl Pool {
    pub fn new(class: WorkloadClass) -> Self {
        Self {
            class,
            membership: ArcSwap::from_pointee(Membership::default()),
            write_lock: Mutex::new(()),
            // Random start so restarted proxies do not hit the same member first.
            cursor: AtomicUsize::new(rand::random::<u16>() as usize),
            accumulated_cost: AtomicI64::new(0),
            window_cost: AtomicI64::new(0),
        }
    }

    pub fn class(&self) -> WorkloadClass {
        self.class
    }

    /// Current membership snapshot.
    pub fn snapshot(&self) -> Arc<Membership> {
        self.membership.load_full()
    }

    pub fn len(&self) -> usize {
        self.membership.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.load().is_empty()
    }

    /// Members that are not the local sentinel.
    pub fn non_self_len(&self) -> usize {
        self.membership.load().members.iter().filter(|b| !b.is_self()).count()
    }

    pub fn has_self(&self) -> bool {
        self.membership.load().members.iter().any(|b| b.is_self())
    }

    pub fn find(&self, addr: &str) -> Option<SharedBackend> {
        self.membership.load().find(addr).cloned()
    }

    /// Weight currently eligible for selection.
    pub fn selection_weight(&self) -> f64 {
        self.membership.load().table.total_weight()
    }

    /// Pick a live member.
    pub fn select(&self) -> Result<SharedBackend> {
        let snapshot = self.membership.load();
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);
        match snapshot.table.pick(&snapshot.members, cursor) {
            Some(backend) => Ok(backend),
            None => {
                tracing::debug!(
                    class = %self.class,
                    members = snapshot.len(),
                    "No live backend in pool"
                );
                Err(RouterError::NoBackendAvailable(self.class))
            }
        }
    }

    /// Apply `f` to the current snapshot under the write lock and publish
    /// the result.
    fn update<T>(&self, f: impl FnOnce(&Membership) -> Result<(Membership, T)>) -> Result<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.membership.load();
        let (next, out) = f(&current)?;
        let len = next.len();
        self.membership.store(Arc::new(next));
        metrics::record_pool_members(self.class, len);
        Ok(out)
    }

    /// Add a member. Fails if the address (ignoring weight) is present.
    pub fn add(&self, backend: SharedBackend) -> Result<()> {
        self.update(|m| {
            if m.position(backend.addr()).is_some() {
                return Err(RouterError::AlreadyExists(backend.addr().to_string()));
            }
            let mut members = m.members.clone();
            let mut weights = m.weights.clone();
            weights.push(backend.weight());
            members.push(backend.clone());
            Ok((Membership::new(members, weights), ()))
        })?;

        tracing::info!(
            class = %self.class,
            backend = %backend.addr(),
            weight = backend.weight(),
            "Backend added to pool"
        );
        metrics::record_backend_liveness(self.class, backend.addr(), backend.liveness());
        Ok(())
    }

    /// Remove a member from routing and return it so the caller can drain it.
    pub fn remove(&self, addr: &str) -> Result<SharedBackend> {
        let removed = self.update(|m| {
            let idx = m
                .position(addr)
                .ok_or_else(|| RouterError::NotFound(host_of(addr).to_string()))?;
            let removed = m.members[idx].clone();

            if m.len() == 1 {
                return Ok((Membership::default(), removed));
            }

            let mut members = m.members.clone();
            let mut weights = m.weights.clone();
            members.remove(idx);
            weights.remove(idx);
            Ok((Membership::new(members, weights), removed))
        })?;

        tracing::info!(class = %self.class, backend = %removed.addr(), "Backend removed from pool");
        Ok(removed)
    }

    /// Close a member's idle connections and set it Down or ManualDown.
    pub fn mark_down(&self, addr: &str, state: Liveness) -> Result<()> {
        if state == Liveness::Up {
            return Err(RouterError::NotADownState(state));
        }
        let backend = self.update(|m| {
            let backend = m
                .find(addr)
                .cloned()
                .ok_or_else(|| RouterError::NotFound(host_of(addr).to_string()))?;
            if backend.is_self() {
                return Err(RouterError::SelfBackend);
            }
            backend.close_idle();
            backend.set_liveness(state);
            Ok((m.rebuilt(), backend))
        })?;

        tracing::info!(class = %self.class, backend = %backend.addr(), state = %state, "Backend marked down");
        metrics::record_backend_liveness(self.class, backend.addr(), state);
        Ok(())
    }

    /// Sweep mark-down: Up to Down only, decided under the write lock so a
    /// concurrent ManualDown is kept. Returns whether the state changed.
    pub fn expire(&self, addr: &str) -> Result<bool> {
        let (backend, changed) = self.update(|m| {
            let backend = m
                .find(addr)
                .cloned()
                .ok_or_else(|| RouterError::NotFound(host_of(addr).to_string()))?;
            if backend.is_self() {
                return Err(RouterError::SelfBackend);
            }
            let changed = backend.transition(Liveness::Up, Liveness::Down);
            if changed {
                backend.close_idle();
            }
            Ok((m.rebuilt(), (backend, changed)))
        })?;

        if changed {
            tracing::info!(class = %self.class, backend = %backend.addr(), "Backend expired");
            metrics::record_backend_liveness(self.class, backend.addr(), Liveness::Down);
        }
        Ok(changed)
    }

    /// Explicit recovery: dial, probe and set Up. Clears ManualDown.
    pub async fn mark_up(&self, addr: &str, connector: &dyn Connector) -> Result<()> {
        self.bring_up(addr, connector, true).await.map(drop)
    }

    /// Sweep recovery: like `mark_up` but never clears ManualDown.
    /// Returns whether the backend is now Up.
    pub async fn revive(&self, addr: &str, connector: &dyn Connector) -> Result<bool> {
        self.bring_up(addr, connector, false).await
    }

    async fn bring_up(&self, addr: &str, connector: &dyn Connector, clear_manual: bool) -> Result<bool> {
        let backend = self
            .find(addr)
            .ok_or_else(|| RouterError::NotFound(host_of(addr).to_string()))?;
        if backend.is_self() {
            return Ok(true);
        }

        // Network work happens without the write lock.
        let stream = match connector.connect(backend.addr()).await {
            Ok(stream) => stream,
            Err(source) => {
                self.fail_up(&backend);
                return Err(RouterError::DialFailed {
                    addr: backend.addr().to_string(),
                    source,
                });
            }
        };
        if let Err(source) = connector.probe(backend.addr()).await {
            self.fail_up(&backend);
            return Err(RouterError::ProbeFailed {
                addr: backend.addr().to_string(),
                source,
            });
        }

        let up = self.update(|m| {
            let up = if clear_manual {
                backend.set_liveness(Liveness::Up);
                true
            } else {
                backend.transition(Liveness::Down, Liveness::Up) || backend.is_up()
            };
            Ok((m.rebuilt(), up))
        })?;

        backend.record_ping(Instant::now());
        if up {
            backend.push_idle(stream);
            tracing::info!(class = %self.class, backend = %backend.addr(), "Backend up");
        }
        metrics::record_backend_liveness(self.class, backend.addr(), backend.liveness());
        Ok(up)
    }

    fn fail_up(&self, backend: &SharedBackend) {
        if backend.liveness() == Liveness::ManualDown {
            return;
        }
        let changed = backend.transition(Liveness::Up, Liveness::Down);
        if changed {
            // Rebuild so selection stops offering it.
            let _ = self.update(|m| Ok((m.rebuilt(), ())));
            metrics::record_backend_liveness(self.class, backend.addr(), Liveness::Down);
        }
    }

    // --- Cost accounting ---

    pub fn add_cost(&self, cost: i64) {
        self.accumulated_cost.fetch_add(cost, Ordering::Relaxed);
    }

    /// Cost accumulated since the last flush.
    pub fn accumulated_cost(&self) -> i64 {
        self.accumulated_cost.load(Ordering::Relaxed)
    }

    /// Cost of the last completed window.
    pub fn window_cost(&self) -> i64 {
        self.window_cost.load(Ordering::Relaxed)
    }

    /// Close the current cost window.
    pub fn flush_cost(&self) -> i64 {
        let cost = self.accumulated_cost.swap(0, Ordering::Relaxed);
        self.window_cost.store(cost, Ordering::Relaxed);
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::Backend;

    fn backend(addr: &str, weight: f64) -> SharedBackend {
        Arc::new(Backend::remote(addr, weight, WorkloadClass::Transactional, 4))
    }

    fn pool_with(addrs: &[(&str, f64)]) -> Pool {
        let pool = Pool::new(WorkloadClass::Transactional);
        for (a, w) in addrs {
            pool.add(backend(a, *w)).unwrap();
        }
        pool
    }

    fn assert_aligned(pool: &Pool) {
        let snap = pool.snapshot();
        assert_eq!(snap.members().len(), snap.weights().len());
        let live: f64 = snap
            .members()
            .iter()
            .zip(snap.weights())
            .filter(|(b, _)| b.is_up())
            .map(|(_, w)| w)
            .sum();
        assert_eq!(snap.table().total_weight(), live);
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let pool = pool_with(&[("a:3306", 1.0)]);
        let err = pool.add(backend("a:3306", 5.0)).unwrap_err();
        assert!(matches!(err, RouterError::AlreadyExists(_)));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.snapshot().weights(), &[1.0]);
    }

    #[test]
    fn selection_ratio_follows_weights() {
        let pool = pool_with(&[("a:3306", 1.0), ("b:3306", 3.0)]);
        let (mut a, mut b) = (0, 0);
        for _ in 0..4000 {
            match pool.select().unwrap().addr() {
                "a:3306" => a += 1,
                _ => b += 1,
            }
        }
        let ratio = b as f64 / a as f64;
        assert!((2.7..=3.3).contains(&ratio), "ratio was {ratio}");
    }

    #[test]
    fn removing_sole_member_empties_pool() {
        let pool = pool_with(&[("a:3306", 1.0)]);
        let removed = pool.remove("a:3306").unwrap();
        assert_eq!(removed.addr(), "a:3306");
        assert!(pool.is_empty());
        assert!(pool.snapshot().table().is_empty());
        assert!(matches!(pool.select(), Err(RouterError::NoBackendAvailable(_))));
    }

    #[test]
    fn remove_ignores_weight_suffix_and_keeps_alignment() {
        let pool = pool_with(&[("a:3306", 1.0), ("b:3306", 2.0), ("c:3306", 3.0)]);
        pool.remove("b:3306@2").unwrap();
        assert_eq!(pool.snapshot().weights(), &[1.0, 3.0]);
        assert_aligned(&pool);
        assert!(matches!(pool.remove("zzz:1"), Err(RouterError::NotFound(_))));
    }

    #[test]
    fn marked_down_members_are_not_selected() {
        let pool = pool_with(&[("a:3306", 1.0), ("b:3306", 1.0)]);
        pool.mark_down("a:3306", Liveness::ManualDown).unwrap();
        assert_aligned(&pool);
        assert_eq!(pool.selection_weight(), 1.0);
        for _ in 0..20 {
            assert_eq!(pool.select().unwrap().addr(), "b:3306");
        }
        // still a member until deleted
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn mark_down_rejects_up() {
        let pool = pool_with(&[("a:3306", 1.0)]);
        pool.mark_down("a:3306", Liveness::Down).unwrap();
        let err = pool.mark_down("a:3306", Liveness::Up).unwrap_err();
        assert!(matches!(err, RouterError::NotADownState(Liveness::Up)));
        assert_eq!(pool.find("a:3306").unwrap().liveness(), Liveness::Down);
    }

    #[test]
    fn expire_keeps_manual_down() {
        let pool = pool_with(&[("a:3306", 1.0), ("b:3306", 1.0)]);
        pool.mark_down("a:3306", Liveness::ManualDown).unwrap();

        assert!(!pool.expire("a:3306").unwrap());
        assert_eq!(pool.find("a:3306").unwrap().liveness(), Liveness::ManualDown);

        assert!(pool.expire("b:3306").unwrap());
        assert_eq!(pool.find("b:3306").unwrap().liveness(), Liveness::Down);
        assert!(!pool.expire("b:3306").unwrap());
        assert_aligned(&pool);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn membership_stays_aligned_under_concurrent_writes() {
        let pool = Arc::new(pool_with(&[("anchor:3306", 2.0)]));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let writer = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for round in 0..300 {
                    let addr = format!("t{}:3306", round % 5);
                    let _ = pool.add(backend(&addr, 1.0 + (round % 3) as f64));
                    if round % 2 == 0 {
                        let _ = pool.mark_down(&addr, Liveness::Down);
                    } else {
                        let _ = pool.expire(&addr);
                    }
                    if round % 3 == 0 {
                        let _ = pool.remove(&addr);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let stop = Arc::clone(&stop);
                tokio::spawn(async move {
                    let mut cursor = 0usize;
                    while !stop.load(Ordering::Relaxed) {
                        let snap = pool.snapshot();
                        assert_eq!(snap.members().len(), snap.weights().len());
                        let declared: f64 = snap.weights().iter().sum();
                        assert!(snap.table().total_weight() <= declared);
                        if let Some(picked) = snap.table().pick(snap.members(), cursor) {
                            assert!(snap.find(picked.addr()).is_some());
                        }
                        assert!(pool.select().is_ok());
                        cursor = cursor.wrapping_add(1);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.await.unwrap();
        }
        assert!(pool.find("anchor:3306").unwrap().is_up());
        assert_aligned(&pool);
    }

    #[test]
    fn self_cannot_be_marked_down() {
        let pool = Pool::new(WorkloadClass::Transactional);
        pool.add(Arc::new(Backend::local(4.0, WorkloadClass::Transactional))).unwrap();
        assert!(matches!(pool.mark_down("self", Liveness::Down), Err(RouterError::SelfBackend)));
        assert!(pool.select().unwrap().is_up());
        assert_eq!(pool.non_self_len(), 0);
        assert!(pool.has_self());
    }

    #[test]
    fn cost_window_rotates() {
        let pool = Pool::new(WorkloadClass::Transactional);
        pool.add_cost(40);
        pool.add_cost(2);
        assert_eq!(pool.accumulated_cost(), 42);
        assert_eq!(pool.flush_cost(), 42);
        assert_eq!(pool.window_cost(), 42);
        assert_eq!(pool.accumulated_cost(), 0);
    }
}
