//! Exogenous reference price of the stable token.
//!
//! The process is advanced once per step by the engine, which owns the RNG
//! stream. Given the same seed and step count the sequence is bit-identical.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{invalid, SimResult};

/// Floor applied to every emitted price. A reference price cannot reach zero.
pub const MIN_PRICE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriceProcess {
    /// Euler step of dX = θ(μ − X)dt + σ dW.
    OrnsteinUhlenbeck {
        long_run_mean: f64,
        reversion_rate: f64,
        volatility: f64,
    },
    /// Exact log-normal step of dX = μX dt + σX dW.
    GeometricBrownian { drift: f64, volatility: f64 },
}

impl Default for PriceProcess {
    fn default() -> Self {
        PriceProcess::OrnsteinUhlenbeck {
            long_run_mean: 1.0,
            reversion_rate: 0.5,
            volatility: 0.01,
        }
    }
}

impl PriceProcess {
    pub fn next<R: Rng + ?Sized>(&self, previous: f64, dt: f64, rng: &mut R) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        let raw = match *self {
            PriceProcess::OrnsteinUhlenbeck {
                long_run_mean,
                reversion_rate,
                volatility,
            } => {
                previous
                    + reversion_rate * (long_run_mean - previous) * dt
                    + volatility * dt.sqrt() * z
            }
            PriceProcess::GeometricBrownian { drift, volatility } => {
                let log_step =
                    (drift - 0.5 * volatility * volatility) * dt + volatility * dt.sqrt() * z;
                previous * log_step.exp()
            }
        };
        // NaN falls through to the floor as well
        if raw > MIN_PRICE {
            raw
        } else {
            MIN_PRICE
        }
    }

    /// Same process with its long-run level scaled by `level_factor`.
    ///
    /// OU moves the mean it reverts to; GBM gets an extra drift of
    /// `ln(level_factor)` per unit time.
    pub fn shifted(&self, level_factor: f64) -> PriceProcess {
        match *self {
            PriceProcess::OrnsteinUhlenbeck {
                long_run_mean,
                reversion_rate,
                volatility,
            } => PriceProcess::OrnsteinUhlenbeck {
                long_run_mean: long_run_mean * level_factor,
                reversion_rate,
                volatility,
            },
            PriceProcess::GeometricBrownian { drift, volatility } => {
                PriceProcess::GeometricBrownian {
                    drift: drift + level_factor.ln(),
                    volatility,
                }
            }
        }
    }

    pub fn volatility(&self) -> f64 {
        match *self {
            PriceProcess::OrnsteinUhlenbeck { volatility, .. } => volatility,
            PriceProcess::GeometricBrownian { volatility, .. } => volatility,
        }
    }

    pub fn with_volatility(&self, sigma: f64) -> PriceProcess {
        let mut p = self.clone();
        match &mut p {
            PriceProcess::OrnsteinUhlenbeck { volatility, .. } => *volatility = sigma,
            PriceProcess::GeometricBrownian { volatility, .. } => *volatility = sigma,
        }
        p
    }

    pub fn validate(&self) -> SimResult<()> {
        match *self {
            PriceProcess::OrnsteinUhlenbeck {
                long_run_mean,
                reversion_rate,
                volatility,
            } => {
                if !(long_run_mean > 0.0 && long_run_mean.is_finite()) {
                    return Err(invalid(format!(
                        "long_run_mean must be positive, got {}",
                        long_run_mean
                    )));
                }
                if !(reversion_rate >= 0.0 && reversion_rate.is_finite()) {
                    return Err(invalid(format!(
                        "reversion_rate must be non-negative, got {}",
                        reversion_rate
                    )));
                }
                if !(volatility >= 0.0 && volatility.is_finite()) {
                    return Err(invalid(format!(
                        "volatility must be non-negative, got {}",
                        volatility
                    )));
                }
            }
            PriceProcess::GeometricBrownian { drift, volatility } => {
                if !drift.is_finite() {
                    return Err(invalid("drift must be finite"));
                }
                if !(volatility >= 0.0 && volatility.is_finite()) {
                    return Err(invalid(format!(
                        "volatility must be non-negative, got {}",
                        volatility
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Scripted multiplicative shift of the reference price level over
/// `[start_step, start_step + duration)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceShock {
    pub start_step: u64,
    pub duration: u64,
    /// 0.7 = the process reverts to 70% of its normal level while active.
    pub level_factor: f64,
}

impl PriceShock {
    pub fn is_active(&self, step: u64) -> bool {
        step >= self.start_step && step < self.start_step.saturating_add(self.duration)
    }
}

/// Combined level factor of every shock active at `step`.
pub fn shock_factor(shocks: &[PriceShock], step: u64) -> f64 {
    shocks
        .iter()
        .filter(|s| s.is_active(step))
        .map(|s| s.level_factor)
        .product()
}
