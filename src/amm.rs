use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    /// Stable in, volatile out. Pushes the stable price down.
    StableToVolatile,
    /// Volatile in, stable out. Pushes the stable price up.
    VolatileToStable,
}

/// Constant-product pool of stable and volatile tokens.
///
/// Reserves are only ever changed by `swap` and `apply_controller_adjustment`,
/// both of which update the two reserves together or not at all.
#[derive(Debug, Clone)]
pub struct Amm {
    reserve_stable: f64,
    reserve_volatile: f64,
    pub swap_fee: f64,
    /// Neither reserve may end an operation below this amount.
    pub min_reserve: f64,

    /// Fees retained by the pool, in the token they were paid in.
    pub cumulative_fees_stable: f64,
    pub cumulative_fees_volatile: f64,
}

impl Amm {
    pub fn new(reserve_stable: f64, reserve_volatile: f64, swap_fee: f64, min_reserve: f64) -> Self {
        Amm {
            reserve_stable,
            reserve_volatile,
            swap_fee,
            min_reserve,
            cumulative_fees_stable: 0.0,
            cumulative_fees_volatile: 0.0,
        }
    }

    pub fn reserve_stable(&self) -> f64 {
        self.reserve_stable
    }

    pub fn reserve_volatile(&self) -> f64 {
        self.reserve_volatile
    }

    pub fn k(&self) -> f64 {
        self.reserve_stable * self.reserve_volatile
    }

    /// Pool rate: volatile tokens per stable token.
    pub fn spot_price(&self) -> f64 {
        self.reserve_volatile / self.reserve_stable
    }

    /// Stable token price in the unit of account, given the volatile valuation.
    pub fn stable_price(&self, volatile_price: f64) -> f64 {
        self.spot_price() * volatile_price
    }

    fn reserves_for(&self, direction: SwapDirection) -> (f64, f64) {
        match direction {
            SwapDirection::StableToVolatile => (self.reserve_stable, self.reserve_volatile),
            SwapDirection::VolatileToStable => (self.reserve_volatile, self.reserve_stable),
        }
    }

    /// Output for `amount_in` without executing.
    pub fn quote(&self, direction: SwapDirection, amount_in: f64) -> SimResult<f64> {
        if !(amount_in > 0.0 && amount_in.is_finite()) {
            return Err(SimError::InvalidAmount(amount_in));
        }
        let (reserve_in, reserve_out) = self.reserves_for(direction);

        let effective_input = amount_in * (1.0 - self.swap_fee);
        let amount_out = reserve_out * effective_input / (reserve_in + effective_input);

        if !(amount_out > 0.0) || reserve_out - amount_out < self.min_reserve {
            return Err(SimError::InsufficientLiquidity {
                requested: amount_in,
                max_fillable: self.max_fillable_input(direction),
            });
        }
        Ok(amount_out)
    }

    /// Execute a swap. The whole input, fee included, stays in the pool,
    /// so `k` never decreases across a swap.
    pub fn swap(&mut self, direction: SwapDirection, amount_in: f64) -> SimResult<f64> {
        let amount_out = self.quote(direction, amount_in)?;
        let fee = amount_in * self.swap_fee;

        match direction {
            SwapDirection::StableToVolatile => {
                self.reserve_stable += amount_in;
                self.reserve_volatile -= amount_out;
                self.cumulative_fees_stable += fee;
            }
            SwapDirection::VolatileToStable => {
                self.reserve_volatile += amount_in;
                self.reserve_stable -= amount_out;
                self.cumulative_fees_volatile += fee;
            }
        }
        Ok(amount_out)
    }

    /// Largest input that leaves exactly `min_reserve` of the output token.
    pub fn max_fillable_input(&self, direction: SwapDirection) -> f64 {
        let (reserve_in, reserve_out) = self.reserves_for(direction);
        if reserve_out <= self.min_reserve || self.min_reserve <= 0.0 {
            // With no floor the constant product never drains; with no
            // headroom nothing can be filled.
            return if self.min_reserve <= 0.0 { f64::INFINITY } else { 0.0 };
        }
        let max_out = reserve_out - self.min_reserve;
        let effective_input = max_out * reserve_in / self.min_reserve;
        effective_input / (1.0 - self.swap_fee)
    }

    /// Controller leg: both reserves move by the given deltas together, or
    /// the pool is left untouched.
    pub fn apply_controller_adjustment(
        &mut self,
        stable_delta: f64,
        volatile_delta: f64,
    ) -> SimResult<()> {
        if !stable_delta.is_finite() {
            return Err(SimError::InvalidAmount(stable_delta));
        }
        if !volatile_delta.is_finite() {
            return Err(SimError::InvalidAmount(volatile_delta));
        }
        let new_stable = self.reserve_stable + stable_delta;
        let new_volatile = self.reserve_volatile + volatile_delta;
        if new_stable < self.min_reserve {
            return Err(SimError::InsufficientLiquidity {
                requested: -stable_delta,
                max_fillable: self.reserve_stable - self.min_reserve,
            });
        }
        if new_volatile < self.min_reserve {
            return Err(SimError::InsufficientLiquidity {
                requested: -volatile_delta,
                max_fillable: self.reserve_volatile - self.min_reserve,
            });
        }
        self.reserve_stable = new_stable;
        self.reserve_volatile = new_volatile;
        Ok(())
    }
}
