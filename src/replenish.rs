//! Virtual-pool replenishment schedule.
//!
//! Net stable flow that traders push into the pool accumulates as `delta`.
//! Every unit of flow is spread evenly over a ring of `recovery_period`
//! slots, and one slot is repaid per step. While the stable trades further
//! below peg the ring is shortened, so the outstanding delta is repaid sooner.

use serde::Serialize;

/// Price thresholds (relative to peg) that shorten the ring, highest first.
/// Above the first one the full period is used; each threshold crossed
/// downward removes another 10% of the period.
pub const SHRINK_THRESHOLDS: [f64; 9] = [0.99, 0.985, 0.98, 0.975, 0.97, 0.965, 0.96, 0.955, 0.95];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolReplenisher {
    pub recovery_period: usize,
    /// Outstanding stable imbalance of the pool; positive = excess stable.
    delta: f64,
    /// `restore_values[0]` is repaid on the next call to `restore`.
    restore_values: Vec<f64>,
}

impl PoolReplenisher {
    pub fn new(recovery_period: usize) -> Self {
        let period = recovery_period.max(1);
        PoolReplenisher {
            recovery_period: period,
            delta: 0.0,
            restore_values: vec![0.0; period],
        }
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn restore_values(&self) -> &[f64] {
        &self.restore_values
    }

    /// Ring length for a stable price expressed as a fraction of peg.
    pub fn target_length(&self, relative_price: f64) -> usize {
        let period = self.recovery_period as f64;
        for (i, threshold) in SHRINK_THRESHOLDS.iter().enumerate() {
            if relative_price > *threshold {
                let len = (period * (1.0 - i as f64 * 0.1) + 1e-9).floor() as usize;
                return len.max(1);
            }
        }
        1
    }

    /// Record trade flow and spread it over the whole ring.
    pub fn update_delta(&mut self, variation: f64) {
        if variation == 0.0 || !variation.is_finite() {
            return;
        }
        self.delta += variation;
        let share = variation / self.restore_values.len() as f64;
        for v in &mut self.restore_values {
            *v += share;
        }
    }

    /// Resize the ring. Shrinking folds the dropped tail evenly into the
    /// remaining slots; growing appends empty slots.
    pub fn resize(&mut self, new_length: usize) {
        let new_length = new_length.max(1);
        let len = self.restore_values.len();
        if new_length >= len {
            self.restore_values.resize(new_length, 0.0);
            return;
        }
        let excess: f64 = self.restore_values[new_length..].iter().sum();
        self.restore_values.truncate(new_length);
        let share = excess / new_length as f64;
        for v in &mut self.restore_values {
            *v += share;
        }
    }

    /// Adjust the ring for the current price, then repay the head slot.
    /// Returns the stable amount repaid this step.
    pub fn restore(&mut self, relative_price: f64) -> f64 {
        let target = self.target_length(relative_price);
        self.resize(target);
        let due = self.restore_values.remove(0);
        self.restore_values.push(0.0);
        self.delta -= due;
        due
    }

    /// Put back an amount that could not be repaid; it is due again next step.
    pub fn defer(&mut self, amount: f64) {
        if amount == 0.0 || !amount.is_finite() {
            return;
        }
        self.delta += amount;
        self.restore_values[0] += amount;
    }

    pub fn reset(&mut self) {
        self.delta = 0.0;
        self.restore_values = vec![0.0; self.recovery_period];
    }
}
