use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::agents::AgentProfile;
use crate::controller::ControllerMode;
use crate::engine::simulate;
use crate::error::{invalid, SimResult};
use crate::metrics::MetricsCollector;
use crate::regime::Regime;
use crate::scenario::ScenarioConfig;
use crate::state::Trajectory;

/// Parameters `sweep_param` knows how to override.
pub const SWEEPABLE_PARAMS: [&str; 6] = [
    "mint_rate",
    "deviation_threshold",
    "swap_fee",
    "volatility",
    "panic_fraction",
    "pool_recovery_period",
];

/// Aggregate statistics over a batch of independent runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloSummary {
    pub runs: usize,
    /// Share of runs that ever reached the collapsed regime.
    pub collapse_rate: f64,
    pub mean_mse: f64,
    pub p95_mse: f64,
    pub mean_drawdown: f64,
    pub truncated_runs: usize,
}

/// One point of a single-parameter sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub param: String,
    pub value: f64,
    pub summary: MonteCarloSummary,
}

/// Runs one base config under many seeds.
pub struct BatchRunner {
    pub base: ScenarioConfig,
}

impl BatchRunner {
    pub fn new(base: ScenarioConfig) -> Self {
        BatchRunner { base }
    }

    /// One independent engine per seed, in parallel. Results come back in
    /// the order of `seeds`.
    pub fn run_seeds(&self, seeds: &[u64]) -> SimResult<Vec<Trajectory>> {
        Self::run_config(&self.base, seeds)
    }

    fn run_config(config: &ScenarioConfig, seeds: &[u64]) -> SimResult<Vec<Trajectory>> {
        // Fail once up front instead of once per seed
        config.validate()?;
        seeds
            .par_iter()
            .map(|&seed| simulate(&config.with_seed(seed)))
            .collect()
    }

    /// Apply a named override to a config.
    fn apply_param(config: &mut ScenarioConfig, name: &str, val: f64) -> SimResult<()> {
        match name {
            "mint_rate" => config.controller.mint_rate = val,
            "deviation_threshold" => config.controller.deviation_threshold = val,
            "swap_fee" => config.amm.swap_fee = val,
            "volatility" => config.process = config.process.with_volatility(val),
            "panic_fraction" => {
                for spec in &mut config.agents {
                    if let AgentProfile::PanicSeller { panic_fraction } = &mut spec.profile {
                        *panic_fraction = val;
                    }
                }
            }
            // Switches the controller to virtual-pool mode
            "pool_recovery_period" => {
                if !(val >= 1.0 && val.fract() == 0.0) {
                    return Err(invalid(format!(
                        "pool_recovery_period must be a whole number of steps, got {}",
                        val
                    )));
                }
                config.controller.mode = ControllerMode::VirtualPool {
                    pool_recovery_period: val as usize,
                };
            }
            _ => {
                return Err(invalid(format!(
                    "unknown sweep parameter '{}', expected one of {:?}",
                    name, SWEEPABLE_PARAMS
                )))
            }
        }
        Ok(())
    }

    /// Re-run the seed batch once per value of `name`.
    pub fn sweep_param(
        &self,
        name: &str,
        values: &[f64],
        seeds: &[u64],
    ) -> SimResult<Vec<SweepPoint>> {
        let mut points = Vec::with_capacity(values.len());
        for &value in values {
            let mut config = self.base.clone();
            Self::apply_param(&mut config, name, value)?;
            let runs = Self::run_config(&config, seeds)?;
            let summary = summarize_batch(&runs, config.peg);
            info!(
                param = name,
                value,
                collapse_rate = summary.collapse_rate,
                mean_mse = summary.mean_mse,
                "sweep point done"
            );
            points.push(SweepPoint {
                param: name.to_string(),
                value,
                summary,
            });
        }
        Ok(points)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile, `p` in [0, 1].
fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub fn summarize_batch(trajectories: &[Trajectory], peg: f64) -> MonteCarloSummary {
    let summaries: Vec<_> = trajectories
        .iter()
        .map(|t| MetricsCollector::summarize(t, peg))
        .collect();
    let mses: Vec<f64> = summaries.iter().map(|s| s.mse).collect();
    let drawdowns: Vec<f64> = summaries.iter().map(|s| s.max_drawdown).collect();
    let collapsed = summaries
        .iter()
        .filter(|s| s.collapse_step.is_some() || s.final_regime == Regime::Collapsed)
        .count();

    MonteCarloSummary {
        runs: summaries.len(),
        collapse_rate: if summaries.is_empty() {
            0.0
        } else {
            collapsed as f64 / summaries.len() as f64
        },
        mean_mse: mean(&mses),
        p95_mse: percentile(&mses, 0.95),
        mean_drawdown: mean(&drawdowns),
        truncated_runs: summaries.iter().filter(|s| s.truncated).count(),
    }
}
