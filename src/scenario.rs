use serde::{Deserialize, Serialize};

use crate::agents::AgentSpec;
use crate::controller::ControllerConfig;
use crate::error::{invalid, SimResult};
use crate::price_process::{PriceProcess, PriceShock};
use crate::regime::PanicConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmmConfig {
    pub initial_stable: f64,
    pub initial_volatile: f64,
    pub swap_fee: f64,
    /// Reserve floor; swaps and controller legs that would breach it are rejected.
    pub min_reserve: f64,
}

impl Default for AmmConfig {
    fn default() -> Self {
        AmmConfig {
            initial_stable: 1_000_000.0,
            initial_volatile: 1_000_000.0,
            swap_fee: 0.003,
            min_reserve: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Total stable supply, pool and agents included.
    pub stable_supply: f64,
    /// Total volatile supply, pool and agents included.
    pub volatile_supply: f64,
    pub initial_volatile_price: f64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            stable_supply: 10_000_000.0,
            volatile_supply: 10_000_000.0,
            initial_volatile_price: 1.0,
        }
    }
}

/// Static parameters of one run. Never mutated once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub seed: u64,
    /// Number of steps after the initial state.
    pub steps: u64,
    pub dt: f64,
    pub peg: f64,
    pub process: PriceProcess,
    pub initial_external_price: f64,
    pub shocks: Vec<PriceShock>,
    pub amm: AmmConfig,
    pub tokens: TokenConfig,
    pub controller: ControllerConfig,
    pub agents: Vec<AgentSpec>,
    pub panic: PanicConfig,
    /// Runs stop early once the volatile price drops below this.
    pub min_volatile_price: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            seed: 42,
            steps: 1000,
            dt: 1.0,
            peg: 1.0,
            process: PriceProcess::default(),
            initial_external_price: 1.0,
            shocks: Vec::new(),
            amm: AmmConfig::default(),
            tokens: TokenConfig::default(),
            controller: ControllerConfig::default(),
            agents: vec![
                AgentSpec::arbitrageurs(5, 200_000.0),
                AgentSpec::passive(10, 50_000.0),
            ],
            panic: PanicConfig::default(),
            min_volatile_price: 1e-9,
        }
    }
}

fn positive(name: &str, v: f64) -> SimResult<()> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{} must be positive, got {}", name, v)))
    }
}

impl ScenarioConfig {
    /// Every check that can fail a run happens here, before any state exists.
    pub fn validate(&self) -> SimResult<()> {
        if self.steps == 0 {
            return Err(invalid("steps must be at least 1"));
        }
        positive("dt", self.dt)?;
        positive("peg", self.peg)?;
        positive("initial_external_price", self.initial_external_price)?;
        positive("amm.initial_stable", self.amm.initial_stable)?;
        positive("amm.initial_volatile", self.amm.initial_volatile)?;
        positive("amm.min_reserve", self.amm.min_reserve)?;
        positive("tokens.initial_volatile_price", self.tokens.initial_volatile_price)?;
        positive("min_volatile_price", self.min_volatile_price)?;

        if !(0.0..1.0).contains(&self.amm.swap_fee) {
            return Err(invalid(format!(
                "swap_fee must be in [0, 1), got {}",
                self.amm.swap_fee
            )));
        }
        if self.amm.initial_stable <= self.amm.min_reserve
            || self.amm.initial_volatile <= self.amm.min_reserve
        {
            return Err(invalid("initial reserves must exceed min_reserve"));
        }
        if self.min_volatile_price >= self.tokens.initial_volatile_price {
            return Err(invalid(
                "min_volatile_price must be below initial_volatile_price",
            ));
        }

        self.process.validate()?;
        self.controller.validate()?;
        self.panic.validate()?;
        for shock in &self.shocks {
            positive("shock.level_factor", shock.level_factor)?;
        }
        for spec in &self.agents {
            spec.validate()?;
        }

        // Supplies cover everything held in the pool and by agents
        let agent_stable: f64 = self
            .agents
            .iter()
            .map(|s| s.stable_balance * s.count as f64)
            .sum();
        let agent_volatile: f64 = self
            .agents
            .iter()
            .map(|s| s.volatile_balance * s.count as f64)
            .sum();
        if self.tokens.stable_supply < self.amm.initial_stable + agent_stable {
            return Err(invalid(format!(
                "stable_supply {} is below pool {} + agent holdings {}",
                self.tokens.stable_supply, self.amm.initial_stable, agent_stable
            )));
        }
        if self.tokens.volatile_supply < self.amm.initial_volatile + agent_volatile {
            return Err(invalid(format!(
                "volatile_supply {} is below pool {} + agent holdings {}",
                self.tokens.volatile_supply, self.amm.initial_volatile, agent_volatile
            )));
        }
        Ok(())
    }

    /// Builder-style seed override; the rest of the config is shared.
    pub fn with_seed(&self, seed: u64) -> ScenarioConfig {
        ScenarioConfig {
            seed,
            ..self.clone()
        }
    }
}
