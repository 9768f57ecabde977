use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::regime::Regime;

/// Immutable snapshot of the economy at the end of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub step: u64,
    pub stable_supply: f64,
    pub volatile_supply: f64,
    pub reserve_stable: f64,
    pub reserve_volatile: f64,
    /// Off-pool market price of the stable token.
    pub external_price: f64,
    /// Market price of the volatile token: market cap / supply.
    pub volatile_price: f64,
    /// Stable token price in the unit of account, derived from the reserves
    /// and `volatile_price`.
    pub spot_price: f64,
    pub regime: Regime,

    /// Controller supply deltas applied during this step.
    pub stable_minted: f64,
    pub volatile_minted: f64,
    /// Orders that hit `InsufficientLiquidity` and were clipped or dropped.
    pub clipped_orders: u32,
}

impl SimulationState {
    /// Volatile tokens per stable token in the pool.
    pub fn pool_rate(&self) -> f64 {
        self.reserve_volatile / self.reserve_stable
    }

    pub fn k(&self) -> f64 {
        self.reserve_stable * self.reserve_volatile
    }

    pub fn volatile_market_cap(&self) -> f64 {
        self.volatile_price * self.volatile_supply
    }

    pub fn liquidity_clipped(&self) -> bool {
        self.clipped_orders > 0
    }

    pub fn controller_active(&self) -> bool {
        self.stable_minted != 0.0 || self.volatile_minted != 0.0
    }
}

/// Read-only view handed to the controller and agents.
#[derive(Debug, Clone, Copy)]
pub struct MarketView {
    pub step: u64,
    pub peg: f64,
    pub spot_price: f64,
    pub external_price: f64,
    pub volatile_price: f64,
    pub reserve_stable: f64,
    pub reserve_volatile: f64,
    pub min_reserve: f64,
    pub swap_fee: f64,
    pub regime: Regime,
}

impl MarketView {
    /// max(0, (peg − spot) / peg); premiums count as zero.
    pub fn depeg(&self) -> f64 {
        ((self.peg - self.spot_price) / self.peg).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Termination {
    /// Ran the configured number of steps.
    Completed,
    /// Volatile price fell below the configured floor.
    VolatileWorthless { step: u64 },
    /// A price or supply became non-finite. The run is truncated.
    NumericalDivergence { step: u64, field: String },
}

/// Ordered snapshots of one run, starting with the initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub seed: u64,
    pub states: Vec<SimulationState>,
    pub termination: Termination,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// True only when the run was cut short by numerical divergence.
    pub fn is_truncated(&self) -> bool {
        matches!(self.termination, Termination::NumericalDivergence { .. })
    }

    pub fn final_state(&self) -> Option<&SimulationState> {
        self.states.last()
    }

    pub fn spot_prices(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.spot_price).collect()
    }

    pub fn volatile_prices(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.volatile_price).collect()
    }

    pub fn volatile_supplies(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.volatile_supply).collect()
    }

    /// First step recorded in `regime`, if the run ever entered it.
    pub fn first_step_in(&self, regime: Regime) -> Option<u64> {
        self.states.iter().find(|s| s.regime == regime).map(|s| s.step)
    }

    /// `Err(NumericalDivergence)` for a truncated run, `Ok` otherwise.
    pub fn ensure_finite(&self) -> SimResult<()> {
        match &self.termination {
            Termination::NumericalDivergence { step, field } => Err(SimError::NumericalDivergence {
                step: *step,
                field: field.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
