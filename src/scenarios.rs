use crate::agents::{AgentProfile, AgentSpec};
use crate::controller::ControllerConfig;
use crate::engine::simulate;
use crate::error::SimResult;
use crate::price_process::{PriceProcess, PriceShock};
use crate::regime::PanicConfig;
use crate::scenario::{ScenarioConfig, TokenConfig};
use crate::state::Trajectory;

pub const DEFAULT_STEPS: u64 = 1000;

/// Scripted panic step of the Terra-style preset.
pub const TERRA_PANIC_STEP: u64 = 60;

/// The Terra-style preset reaches the collapsed regime by this step.
pub const TERRA_COLLAPSE_DEADLINE: u64 = 200;

/// Named scenario presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ScenarioId {
    SteadyPeg = 1,
    NoisyMarket = 2,
    BankRun = 3,
    ScriptedDepeg = 4,
    TerraCollapse = 5,
}

impl ScenarioId {
    pub fn all() -> Vec<ScenarioId> {
        use ScenarioId::*;
        vec![SteadyPeg, NoisyMarket, BankRun, ScriptedDepeg, TerraCollapse]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SteadyPeg => "steady_peg",
            Self::NoisyMarket => "noisy_market",
            Self::BankRun => "bank_run",
            Self::ScriptedDepeg => "scripted_depeg",
            Self::TerraCollapse => "terra_collapse",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SteadyPeg => "Low-volatility reference price, arbitrageurs only",
            Self::NoisyMarket => "Random traders with drifting volume around the peg",
            Self::BankRun => "Passive holders exit at once, panic sellers follow",
            Self::ScriptedDepeg => "Panic forced at a fixed step, then recovery",
            Self::TerraCollapse => "Sustained negative shock, heavy panic selling, uncapped minting",
        }
    }

    /// Build the preset's config.
    pub fn config(&self, steps: u64, seed: u64) -> ScenarioConfig {
        let base = ScenarioConfig {
            seed,
            steps,
            ..ScenarioConfig::default()
        };
        match self {
            Self::SteadyPeg => base,
            Self::NoisyMarket => noisy_market(base),
            Self::BankRun => bank_run(base, steps),
            Self::ScriptedDepeg => scripted_depeg(base, steps),
            Self::TerraCollapse => terra_collapse(base),
        }
    }
}

/// Build and run a preset.
pub fn run_preset(id: ScenarioId, steps: u64, seed: u64) -> SimResult<Trajectory> {
    simulate(&id.config(steps, seed))
}

// ═══════════════════════════════════════════════════════════════════════
// Preset builders
// ═══════════════════════════════════════════════════════════════════════

fn noisy_market(mut c: ScenarioConfig) -> ScenarioConfig {
    c.process = c.process.with_volatility(0.02);
    c.agents.push(AgentSpec::noise_traders(10, 100_000.0));
    c
}

fn bank_run(mut c: ScenarioConfig, steps: u64) -> ScenarioConfig {
    c.agents = vec![
        AgentSpec::arbitrageurs(5, 200_000.0),
        AgentSpec::panic_sellers(5, 100_000.0, 0.05),
        AgentSpec::passive(10, 100_000.0),
    ];
    c.panic = PanicConfig {
        trigger_window: 3,
        passive_exit_step: Some(steps / 3),
        passive_exit_fraction: 0.8,
        ..PanicConfig::default()
    };
    c
}

fn scripted_depeg(mut c: ScenarioConfig, steps: u64) -> ScenarioConfig {
    c.agents = vec![
        AgentSpec::arbitrageurs(5, 200_000.0),
        AgentSpec::panic_sellers(5, 100_000.0, 0.10),
        AgentSpec::passive(10, 50_000.0),
    ];
    c.panic = PanicConfig {
        scripted_panic_step: Some(steps / 4),
        ..PanicConfig::default()
    };
    c
}

/// Large panic-seller population, a reference price that settles 30% under
/// the peg, and a controller that corrects half the deviation per step.
fn terra_collapse(mut c: ScenarioConfig) -> ScenarioConfig {
    c.tokens = TokenConfig {
        stable_supply: 20_000_000.0,
        volatile_supply: 10_000_000.0,
        initial_volatile_price: 1.0,
    };
    c.process = PriceProcess::OrnsteinUhlenbeck {
        long_run_mean: 1.0,
        reversion_rate: 0.3,
        volatility: 0.01,
    };
    c.shocks = vec![PriceShock {
        start_step: 50,
        duration: u64::MAX,
        level_factor: 0.7,
    }];
    c.controller = ControllerConfig {
        mint_rate: 0.5,
        deviation_threshold: 0.01,
        max_mint_fraction: 0.05,
        ..ControllerConfig::default()
    };
    c.agents = vec![
        AgentSpec::arbitrageurs(3, 300_000.0),
        AgentSpec {
            profile: AgentProfile::PanicSeller {
                panic_fraction: 0.25,
            },
            count: 20,
            stable_balance: 200_000.0,
            volatile_balance: 0.0,
            risk_threshold: 0.03,
        },
        AgentSpec::passive(10, 100_000.0),
    ];
    c.panic = PanicConfig {
        trigger_deviation: 0.05,
        trigger_window: 3,
        scripted_panic_step: Some(TERRA_PANIC_STEP),
        recovery_window: 200,
        collapse_supply_growth: 0.10,
        collapse_price_decline: 0.90,
        panic_confidence_decay: 0.08,
        collapse_confidence_decay: 0.12,
        collapse_sell_fraction: 0.5,
        passive_exit_step: None,
        passive_exit_fraction: 0.0,
    };
    c
}
