//! Mint/burn peg stabilizer.
//!
//! Observes the stable token's deviation from peg and trades supply of one
//! token against the other through the pool:
//! - below peg: burn stable out of the pool, mint volatile into it (contraction)
//! - above peg: mint stable into the pool, burn volatile out of it (expansion)
//!
//! Both legs land in the pool reserve of the same token, so for each token
//! the supply delta equals the reserve delta.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{invalid, SimResult};
use crate::replenish::PoolReplenisher;
use crate::state::MarketView;

/// Share of the pool's headroom above its floor the controller may consume in one step.
const HEADROOM_USE: f64 = 0.99;

/// How the controller sizes each step's supply adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ControllerMode {
    /// Correct a fixed share of the price deviation every step.
    #[default]
    Proportional,
    /// Repay net trader flow into the pool over a recovery window that
    /// shortens as the stable trades further below peg.
    VirtualPool { pool_recovery_period: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Fraction of the deviation corrected per step, scaled by the stable reserve.
    pub mint_rate: f64,
    /// Relative deviation from peg tolerated without intervention.
    pub deviation_threshold: f64,
    /// Per-step cap on the stable volume moved, as a fraction of the stable
    /// reserve. Lifted in the collapsed regime.
    pub max_mint_fraction: f64,
    #[serde(default)]
    pub mode: ControllerMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            mint_rate: 0.2,
            deviation_threshold: 0.01,
            max_mint_fraction: 0.05,
            mode: ControllerMode::Proportional,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.mint_rate >= 0.0 && self.mint_rate.is_finite()) {
            return Err(invalid(format!(
                "mint_rate must be non-negative, got {}",
                self.mint_rate
            )));
        }
        if !(self.deviation_threshold >= 0.0 && self.deviation_threshold < 1.0) {
            return Err(invalid(format!(
                "deviation_threshold must be in [0, 1), got {}",
                self.deviation_threshold
            )));
        }
        if !(self.max_mint_fraction > 0.0 && self.max_mint_fraction <= 1.0) {
            return Err(invalid(format!(
                "max_mint_fraction must be in (0, 1], got {}",
                self.max_mint_fraction
            )));
        }
        if let ControllerMode::VirtualPool {
            pool_recovery_period: 0,
        } = self.mode
        {
            return Err(invalid("pool_recovery_period must be at least 1"));
        }
        Ok(())
    }
}

/// Supply change requested by the controller for one step. Positive = mint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SupplyAdjustment {
    pub stable_delta: f64,
    pub volatile_delta: f64,
}

impl SupplyAdjustment {
    pub fn is_noop(&self) -> bool {
        self.stable_delta == 0.0 && self.volatile_delta == 0.0
    }

    pub fn minted_volatile(&self) -> f64 {
        self.volatile_delta.max(0.0)
    }

    pub fn burned_stable(&self) -> f64 {
        (-self.stable_delta).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct MintBurnController {
    pub config: ControllerConfig,
    replenisher: Option<PoolReplenisher>,
}

impl MintBurnController {
    pub fn new(config: ControllerConfig) -> Self {
        let replenisher = match config.mode {
            ControllerMode::Proportional => None,
            ControllerMode::VirtualPool {
                pool_recovery_period,
            } => Some(PoolReplenisher::new(pool_recovery_period)),
        };
        MintBurnController {
            config,
            replenisher,
        }
    }

    /// Replenishment state, present only in virtual-pool mode.
    pub fn replenisher(&self) -> Option<&PoolReplenisher> {
        self.replenisher.as_ref()
    }

    /// (spot − peg) / peg
    pub fn deviation(&self, market: &MarketView) -> f64 {
        (market.spot_price - market.peg) / market.peg
    }

    /// One step of whichever mode is configured. `stable_flow` is the net
    /// stable amount traders put into the pool this step.
    pub fn step(
        &mut self,
        market: &MarketView,
        uncapped: bool,
        stable_flow: f64,
    ) -> SupplyAdjustment {
        match self.config.mode {
            ControllerMode::Proportional => self.rebalance(market, uncapped),
            ControllerMode::VirtualPool { .. } => self.replenish(market, stable_flow),
        }
    }

    /// Compute this step's supply adjustment. `uncapped` removes the
    /// per-step volume cap; the pool's reserve floor still applies.
    pub fn rebalance(&self, market: &MarketView, uncapped: bool) -> SupplyAdjustment {
        let deviation = self.deviation(market);
        if deviation.abs() <= self.config.deviation_threshold || market.volatile_price <= 0.0 {
            return SupplyAdjustment::default();
        }

        let mut volume = self.config.mint_rate * deviation.abs() * market.reserve_stable;
        if !uncapped {
            volume = volume.min(self.config.max_mint_fraction * market.reserve_stable);
        }

        let adjustment = legs(market, if deviation < 0.0 { volume } else { -volume });
        debug!(
            step = market.step,
            deviation,
            stable_delta = adjustment.stable_delta,
            volatile_delta = adjustment.volatile_delta,
            uncapped,
            "controller rebalance"
        );
        adjustment
    }

    /// Virtual-pool mode: book the flow, repay the slot that falls due.
    /// Whatever the reserve floor blocks is deferred to the next step.
    pub fn replenish(&mut self, market: &MarketView, stable_flow: f64) -> SupplyAdjustment {
        let replenisher = match self.replenisher.as_mut() {
            Some(r) => r,
            None => return SupplyAdjustment::default(),
        };
        if market.volatile_price <= 0.0 {
            return SupplyAdjustment::default();
        }
        replenisher.update_delta(stable_flow);
        let due = replenisher.restore(market.spot_price / market.peg);

        let adjustment = legs(market, due);
        replenisher.defer(due + adjustment.stable_delta);
        debug!(
            step = market.step,
            due,
            outstanding = replenisher.delta(),
            stable_delta = adjustment.stable_delta,
            volatile_delta = adjustment.volatile_delta,
            "pool replenishment"
        );
        adjustment
    }

    /// Undo the bookkeeping of an adjustment the pool refused to apply. In
    /// virtual-pool mode the amount falls due again next step.
    pub fn revert(&mut self, adjustment: &SupplyAdjustment) {
        if let Some(r) = self.replenisher.as_mut() {
            r.defer(-adjustment.stable_delta);
        }
    }
}

/// Both legs for a stable volume. Positive burns that much stable out of the
/// pool (contraction), negative mints it in (expansion). The stable side is
/// valued at peg and paid for in volatile at its market price, and neither
/// reserve is taken below its floor.
fn legs(market: &MarketView, stable_volume: f64) -> SupplyAdjustment {
    if stable_volume == 0.0 || !stable_volume.is_finite() {
        return SupplyAdjustment::default();
    }
    let to_volatile = market.peg / market.volatile_price;
    if stable_volume > 0.0 {
        let headroom = (market.reserve_stable - market.min_reserve).max(0.0) * HEADROOM_USE;
        let burned = stable_volume.min(headroom);
        SupplyAdjustment {
            stable_delta: -burned,
            volatile_delta: burned * to_volatile,
        }
    } else {
        let headroom = (market.reserve_volatile - market.min_reserve).max(0.0) * HEADROOM_USE;
        let burned_volatile = (-stable_volume * to_volatile).min(headroom);
        SupplyAdjustment {
            stable_delta: burned_volatile / to_volatile,
            volatile_delta: -burned_volatile,
        }
    }
}
