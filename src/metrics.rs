use std::ops::Range;

use serde::Serialize;

use crate::regime::Regime;
use crate::state::Trajectory;

/// Summary statistics for a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: u64,
    pub mse: f64,
    pub max_drawdown: f64,
    pub volatile_drawdown: f64,
    pub min_spot_price: f64,
    pub final_spot_price: f64,
    pub final_regime: Regime,
    pub panic_step: Option<u64>,
    pub collapse_step: Option<u64>,
    /// Steps in which at least one order was clipped by pool liquidity.
    pub clipped_steps: u64,
    /// final / initial volatile supply
    pub volatile_supply_growth: f64,
    pub truncated: bool,
}

/// Mean squared error of the stable spot price against `peg`, over the whole
/// trajectory or the given index window. Empty windows give 0.
pub fn mse_vs_peg(trajectory: &Trajectory, peg: f64, window: Option<Range<usize>>) -> f64 {
    let states = &trajectory.states;
    let range = window.unwrap_or(0..states.len());
    let end = range.end.min(states.len());
    let start = range.start.min(end);
    let slice = &states[start..end];
    if slice.is_empty() {
        return 0.0;
    }
    slice
        .iter()
        .map(|s| (s.spot_price - peg).powi(2))
        .sum::<f64>()
        / slice.len() as f64
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &p in prices {
        if p > peak {
            peak = p;
        }
        if peak > 0.0 {
            worst = worst.max((peak - p) / peak);
        }
    }
    worst
}

pub struct MetricsCollector;

impl MetricsCollector {
    /// Pure function of the trajectory; calling it twice yields the same summary.
    pub fn summarize(trajectory: &Trajectory, peg: f64) -> RunSummary {
        let states = &trajectory.states;
        let spot = trajectory.spot_prices();

        let (final_spot, final_regime, last_step) = match states.last() {
            Some(s) => (s.spot_price, s.regime, s.step),
            None => (0.0, Regime::Normal, 0),
        };
        let supply_growth = match (states.first(), states.last()) {
            (Some(first), Some(last)) if first.volatile_supply > 0.0 => {
                last.volatile_supply / first.volatile_supply
            }
            _ => 1.0,
        };

        RunSummary {
            steps: last_step,
            mse: mse_vs_peg(trajectory, peg, None),
            max_drawdown: max_drawdown(&spot),
            volatile_drawdown: max_drawdown(&trajectory.volatile_prices()),
            min_spot_price: spot.iter().cloned().fold(f64::INFINITY, f64::min),
            final_spot_price: final_spot,
            final_regime,
            panic_step: trajectory.first_step_in(Regime::Panic),
            collapse_step: trajectory.first_step_in(Regime::Collapsed),
            clipped_steps: states.iter().filter(|s| s.liquidity_clipped()).count() as u64,
            volatile_supply_growth: supply_growth,
            truncated: trajectory.is_truncated(),
        }
    }
}
