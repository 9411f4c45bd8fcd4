//! Weighted round-robin selection table.
//!
//! The table is a precomputed sequence of member indices in which each
//! member appears proportionally to its weight, interleaved with the smooth
//! weighted round-robin ordering so a heavy member is not picked in bursts.
//! It is rebuilt whenever membership or liveness changes; picking is O(1).

use crate::load_balancer::backend::SharedBackend;

/// Weights are expressed as multiples of the smallest weight, scaled by this
/// factor, before integer reduction.
const WEIGHT_SCALE: f64 = 100.0;
/// Upper bound on table length.
const MAX_SLOTS: u64 = 10_000;

/// Precomputed selection order over a membership snapshot.
#[derive(Debug, Clone, Default)]
pub struct SelectionTable {
    /// Indices into the member list.
    slots: Vec<usize>,
    /// Sum of float weights of the members included in the table.
    total_weight: f64,
}

impl SelectionTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table over the members that are Up. `members` and `weights`
    /// must be index aligned.
    pub fn build(members: &[SharedBackend], weights: &[f64]) -> Self {
        debug_assert_eq!(members.len(), weights.len());

        let live: Vec<(usize, f64)> = members
            .iter()
            .zip(weights)
            .enumerate()
            .filter(|(_, (b, _))| b.is_up())
            .map(|(i, (_, w))| (i, *w))
            .collect();

        if live.is_empty() {
            return Self::empty();
        }

        let total_weight = live.iter().map(|(_, w)| w).sum();
        let ints = integer_weights(&live.iter().map(|(_, w)| *w).collect::<Vec<_>>());
        let order = smooth_order(&ints);

        Self {
            slots: order.into_iter().map(|k| live[k].0).collect(),
            total_weight,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Pick the member at `cursor`, skipping entries that stopped being Up
    /// after the table was built.
    pub fn pick(&self, members: &[SharedBackend], cursor: usize) -> Option<SharedBackend> {
        let len = self.slots.len();
        if len == 0 {
            return None;
        }

        for i in 0..len {
            let slot = self.slots[(cursor.wrapping_add(i)) % len];
            if let Some(backend) = members.get(slot) {
                if backend.is_up() {
                    return Some(backend.clone());
                }
            }
        }
        None
    }
}

/// Scale float weights to small integers with the same ratios.
fn integer_weights(weights: &[f64]) -> Vec<u64> {
    let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
    let mut ints: Vec<u64> = weights
        .iter()
        .map(|w| ((w / min * WEIGHT_SCALE).round() as u64).max(1))
        .collect();

    let divisor = ints.iter().copied().fold(0, gcd);
    if divisor > 1 {
        ints.iter_mut().for_each(|w| *w /= divisor);
    }

    let total: u64 = ints.iter().sum();
    if total > MAX_SLOTS {
        let factor = total as f64 / MAX_SLOTS as f64;
        ints.iter_mut()
            .for_each(|w| *w = ((*w as f64 / factor).round() as u64).max(1));
    }
    ints
}

/// Smooth weighted round robin over integer weights; returns positions into
/// `weights`, each appearing `weights[i]` times.
fn smooth_order(weights: &[u64]) -> Vec<usize> {
    let total: i64 = weights.iter().map(|w| *w as i64).sum();
    let mut current = vec![0i64; weights.len()];
    let mut order = Vec::with_capacity(total as usize);

    for _ in 0..total {
        let mut best = 0;
        for (i, w) in weights.iter().enumerate() {
            current[i] += *w as i64;
            if current[i] > current[best] {
                best = i;
            }
        }
        current[best] -= total;
        order.push(best);
    }
    order
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
