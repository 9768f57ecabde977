//! Panic scenario injector: a three-state regime machine.
//!
//! ```text
//! Normal --(sustained depeg | scripted step)--> Panic
//! Panic  --(sustained recovery)---------------> Normal
//! Panic  --(supply blow-up | price decline)---> Collapsed   (absorbing)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, SimResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Normal,
    Panic,
    Collapsed,
}

impl Regime {
    pub fn name(&self) -> &'static str {
        match self {
            Regime::Normal => "normal",
            Regime::Panic => "panic",
            Regime::Collapsed => "collapsed",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanicConfig {
    /// Downside depeg (fraction of peg) that counts toward a panic trigger.
    pub trigger_deviation: f64,
    /// Consecutive steps of depeg above trigger before entering panic.
    pub trigger_window: u64,
    /// Forces normal → panic at this step (historical replay).
    pub scripted_panic_step: Option<u64>,
    /// Consecutive steps at or below trigger before panic → normal.
    pub recovery_window: u64,
    /// Per-step volatile supply growth rate that marks collapse.
    pub collapse_supply_growth: f64,
    /// Decline of the volatile price from its initial value that marks collapse.
    pub collapse_price_decline: f64,
    /// Per-step decay of volatile market cap while in panic.
    pub panic_confidence_decay: f64,
    /// Per-step decay of volatile market cap once collapsed.
    pub collapse_confidence_decay: f64,
    /// Fraction of stable balance every non-passive agent dumps per step once collapsed.
    pub collapse_sell_fraction: f64,
    /// Explicit trigger for passive holders.
    pub passive_exit_step: Option<u64>,
    pub passive_exit_fraction: f64,
}

impl Default for PanicConfig {
    fn default() -> Self {
        PanicConfig {
            trigger_deviation: 0.05,
            trigger_window: 5,
            scripted_panic_step: None,
            recovery_window: 50,
            collapse_supply_growth: 0.10,
            collapse_price_decline: 0.90,
            panic_confidence_decay: 0.01,
            collapse_confidence_decay: 0.05,
            collapse_sell_fraction: 0.5,
            passive_exit_step: None,
            passive_exit_fraction: 0.5,
        }
    }
}

impl PanicConfig {
    pub fn validate(&self) -> SimResult<()> {
        let fractions = [
            ("trigger_deviation", self.trigger_deviation),
            ("collapse_price_decline", self.collapse_price_decline),
            ("panic_confidence_decay", self.panic_confidence_decay),
            ("collapse_confidence_decay", self.collapse_confidence_decay),
            ("collapse_sell_fraction", self.collapse_sell_fraction),
            ("passive_exit_fraction", self.passive_exit_fraction),
        ];
        for (name, v) in fractions {
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid(format!("{} must be in [0, 1], got {}", name, v)));
            }
        }
        if self.trigger_deviation <= 0.0 {
            return Err(invalid("trigger_deviation must be positive"));
        }
        if self.collapse_price_decline <= 0.0 || self.collapse_price_decline >= 1.0 {
            return Err(invalid(format!(
                "collapse_price_decline must be in (0, 1), got {}",
                self.collapse_price_decline
            )));
        }
        if self.panic_confidence_decay >= 1.0 || self.collapse_confidence_decay >= 1.0 {
            return Err(invalid("confidence decay must be below 1"));
        }
        if self.trigger_window == 0 || self.recovery_window == 0 {
            return Err(invalid("trigger_window and recovery_window must be at least 1"));
        }
        if !(self.collapse_supply_growth > 0.0 && self.collapse_supply_growth.is_finite()) {
            return Err(invalid(format!(
                "collapse_supply_growth must be positive, got {}",
                self.collapse_supply_growth
            )));
        }
        Ok(())
    }

    /// Per-step market cap decay applied to the volatile token in `regime`.
    pub fn confidence_decay(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Normal => 0.0,
            Regime::Panic => self.panic_confidence_decay,
            Regime::Collapsed => self.collapse_confidence_decay,
        }
    }
}

/// What the injector sees at the end of a step.
#[derive(Debug, Clone, Copy)]
pub struct RegimeSignal {
    pub step: u64,
    /// max(0, (peg − spot) / peg)
    pub depeg: f64,
    /// volatile_supply(t) / volatile_supply(t−1) − 1
    pub supply_growth: f64,
    /// 1 − volatile_price(t) / volatile_price(0)
    pub volatile_decline: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Regime,
    pub to: Regime,
    pub step: u64,
}

#[derive(Debug, Clone)]
pub struct PanicScenarioInjector {
    pub config: PanicConfig,
    regime: Regime,
    depeg_streak: u64,
    calm_streak: u64,
}

impl PanicScenarioInjector {
    pub fn new(config: PanicConfig) -> Self {
        PanicScenarioInjector {
            config,
            regime: Regime::Normal,
            depeg_streak: 0,
            calm_streak: 0,
        }
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    /// Feed one end-of-step observation; returns the transition taken, if any.
    pub fn observe(&mut self, signal: &RegimeSignal) -> Option<Transition> {
        let depegged = signal.depeg > self.config.trigger_deviation;
        if depegged {
            self.depeg_streak += 1;
            self.calm_streak = 0;
        } else {
            self.depeg_streak = 0;
            self.calm_streak += 1;
        }

        let from = self.regime;
        let next = match from {
            Regime::Normal => {
                let scripted = self.config.scripted_panic_step == Some(signal.step);
                if scripted || self.depeg_streak >= self.config.trigger_window {
                    Regime::Panic
                } else {
                    Regime::Normal
                }
            }
            Regime::Panic => {
                if signal.supply_growth > self.config.collapse_supply_growth
                    || signal.volatile_decline > self.config.collapse_price_decline
                {
                    Regime::Collapsed
                } else if self.calm_streak >= self.config.recovery_window {
                    Regime::Normal
                } else {
                    Regime::Panic
                }
            }
            Regime::Collapsed => Regime::Collapsed,
        };

        if next == from {
            return None;
        }
        self.regime = next;
        // Streaks restart on every regime change
        self.depeg_streak = 0;
        self.calm_streak = 0;
        Some(Transition {
            from,
            to: next,
            step: signal.step,
        })
    }
}
