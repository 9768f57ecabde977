use rand::Rng;
use rand_distr::{Distribution, Exp, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::amm::SwapDirection;
use crate::error::{invalid, SimResult};
use crate::regime::Regime;
use crate::state::MarketView;

/// Orders smaller than this are not worth submitting.
const DUST: f64 = 1e-6;

/// Rejection-sampling budget for exponential wallet draws.
const MAX_WALLET_DRAWS: usize = 64;

// ═══════════════════════════════════════════════════════════════════════
// Profiles and specs
// ═══════════════════════════════════════════════════════════════════════

/// Closed set of trader behaviors. All dispatch goes through [`decide`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentProfile {
    /// Trades the pool toward the external reference price.
    Arbitrageur {
        /// Fraction of the relevant reserve traded per unit of relative gap.
        aggressiveness: f64,
        /// Relative gap below which the trade is not worth it.
        threshold: f64,
    },
    /// Sizes each trade to maximize its own profit against the external
    /// price, net of the pool fee.
    OptimalArbitrageur {
        threshold: f64,
        /// Largest input accepted in a single trade.
        max_input: f64,
    },
    /// Dumps stable when the regime turns or its own risk threshold is breached.
    PanicSeller {
        /// Fraction of the current stable balance sold per active step.
        panic_fraction: f64,
    },
    /// Holds unless an explicit exit is scripted.
    Passive,
    /// Random buyer/seller with a drifting trade volume. Below
    /// `peg − panic_band` the trade mean shifts toward selling.
    NoiseTrader {
        /// Starting trade volume, in unit of account.
        base_volume: f64,
        /// Std-dev of the per-step volume random walk.
        volume_sigma: f64,
        panic_band: f64,
        /// Probability that a wallet draw reaches the full balance; sets the
        /// exponential wallet distribution's rate.
        wallet_tail_probability: f64,
    },
}

impl AgentProfile {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentProfile::Arbitrageur { .. } => "arbitrageur",
            AgentProfile::OptimalArbitrageur { .. } => "optimal_arbitrageur",
            AgentProfile::PanicSeller { .. } => "panic_seller",
            AgentProfile::Passive => "passive",
            AgentProfile::NoiseTrader { .. } => "noise_trader",
        }
    }

    pub fn is_passive(&self) -> bool {
        matches!(self, AgentProfile::Passive)
    }

    pub fn validate(&self) -> SimResult<()> {
        match *self {
            AgentProfile::Arbitrageur {
                aggressiveness,
                threshold,
            } => {
                if !(aggressiveness >= 0.0 && aggressiveness <= 1.0) {
                    return Err(invalid(format!(
                        "arbitrageur aggressiveness must be in [0, 1], got {}",
                        aggressiveness
                    )));
                }
                if !(threshold >= 0.0 && threshold < 1.0) {
                    return Err(invalid(format!(
                        "arbitrageur threshold must be in [0, 1), got {}",
                        threshold
                    )));
                }
            }
            AgentProfile::OptimalArbitrageur {
                threshold,
                max_input,
            } => {
                if !(threshold >= 0.0 && threshold < 1.0) {
                    return Err(invalid(format!(
                        "arbitrageur threshold must be in [0, 1), got {}",
                        threshold
                    )));
                }
                if !(max_input > 0.0) {
                    return Err(invalid(format!(
                        "max_input must be positive, got {}",
                        max_input
                    )));
                }
            }
            AgentProfile::PanicSeller { panic_fraction } => {
                if !(panic_fraction > 0.0 && panic_fraction <= 1.0) {
                    return Err(invalid(format!(
                        "panic_fraction must be in (0, 1], got {}",
                        panic_fraction
                    )));
                }
            }
            AgentProfile::Passive => {}
            AgentProfile::NoiseTrader {
                base_volume,
                volume_sigma,
                panic_band,
                wallet_tail_probability,
            } => {
                if !(base_volume >= 0.0 && volume_sigma >= 0.0 && panic_band >= 0.0) {
                    return Err(invalid("noise trader volumes and band must be non-negative"));
                }
                if !(wallet_tail_probability > 0.0 && wallet_tail_probability < 1.0) {
                    return Err(invalid(format!(
                        "wallet_tail_probability must be in (0, 1), got {}",
                        wallet_tail_probability
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Population description: `count` identical agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub profile: AgentProfile,
    pub count: usize,
    pub stable_balance: f64,
    pub volatile_balance: f64,
    /// Downside depeg at which the agent panics on its own.
    pub risk_threshold: f64,
}

impl AgentSpec {
    pub fn arbitrageurs(count: usize, balance: f64) -> Self {
        AgentSpec {
            profile: AgentProfile::Arbitrageur {
                aggressiveness: 0.1,
                threshold: 0.002,
            },
            count,
            stable_balance: balance,
            volatile_balance: balance,
            risk_threshold: 1.0,
        }
    }

    pub fn optimal_arbitrageurs(count: usize, balance: f64, max_input: f64) -> Self {
        AgentSpec {
            profile: AgentProfile::OptimalArbitrageur {
                threshold: 0.002,
                max_input,
            },
            count,
            stable_balance: balance,
            volatile_balance: balance,
            risk_threshold: 1.0,
        }
    }

    pub fn panic_sellers(count: usize, stable_balance: f64, risk_threshold: f64) -> Self {
        AgentSpec {
            profile: AgentProfile::PanicSeller {
                panic_fraction: 0.25,
            },
            count,
            stable_balance,
            volatile_balance: 0.0,
            risk_threshold,
        }
    }

    pub fn passive(count: usize, stable_balance: f64) -> Self {
        AgentSpec {
            profile: AgentProfile::Passive,
            count,
            stable_balance,
            volatile_balance: 0.0,
            risk_threshold: 1.0,
        }
    }

    pub fn noise_traders(count: usize, balance: f64) -> Self {
        AgentSpec {
            profile: AgentProfile::NoiseTrader {
                base_volume: 1_000.0,
                volume_sigma: 100.0,
                panic_band: 0.05,
                wallet_tail_probability: 0.001,
            },
            count,
            stable_balance: balance,
            volatile_balance: balance,
            risk_threshold: 1.0,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        self.profile.validate()?;
        if !(self.stable_balance >= 0.0 && self.stable_balance.is_finite()) {
            return Err(invalid(format!(
                "agent stable_balance must be non-negative, got {}",
                self.stable_balance
            )));
        }
        if !(self.volatile_balance >= 0.0 && self.volatile_balance.is_finite()) {
            return Err(invalid(format!(
                "agent volatile_balance must be non-negative, got {}",
                self.volatile_balance
            )));
        }
        if !(self.risk_threshold > 0.0) {
            return Err(invalid(format!(
                "risk_threshold must be positive, got {}",
                self.risk_threshold
            )));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Agent and order
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: usize,
    pub stable_balance: f64,
    pub volatile_balance: f64,
    pub profile: AgentProfile,
    pub risk_threshold: f64,
    /// Current trade volume of a noise trader; unused by other profiles.
    pub trade_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub agent_id: usize,
    pub direction: SwapDirection,
    pub amount_in: f64,
}

/// Per-step inputs beyond the market snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext {
    pub market: MarketView,
    pub collapse_sell_fraction: f64,
    /// `Some(fraction)` on the step a passive exit is scripted.
    pub passive_exit: Option<f64>,
}

fn sell_stable(agent: &Agent, fraction: f64) -> Option<Order> {
    let amount = agent.stable_balance * fraction;
    (amount > DUST).then_some(Order {
        agent_id: agent.id,
        direction: SwapDirection::StableToVolatile,
        amount_in: amount,
    })
}

/// Single decision function for every profile and regime.
///
/// Reads the market snapshot only; the returned order is executed later by
/// the engine. Noise traders also advance their volume random walk here.
pub fn decide<R: Rng + ?Sized>(
    agent: &mut Agent,
    ctx: &DecisionContext,
    rng: &mut R,
) -> Option<Order> {
    let market = &ctx.market;

    if market.regime == Regime::Collapsed && !agent.profile.is_passive() {
        let fraction = match agent.profile {
            AgentProfile::PanicSeller { panic_fraction } => {
                panic_fraction.max(ctx.collapse_sell_fraction)
            }
            _ => ctx.collapse_sell_fraction,
        };
        return sell_stable(agent, fraction);
    }

    match agent.profile {
        AgentProfile::Arbitrageur {
            aggressiveness,
            threshold,
        } => {
            let gap = relative_gap(market)?;
            if gap.abs() <= threshold {
                return None;
            }
            let (direction, amount) = if gap > 0.0 {
                // Pool stable is cheap: pay volatile, receive stable
                (
                    SwapDirection::VolatileToStable,
                    (aggressiveness * gap * market.reserve_volatile).min(agent.volatile_balance),
                )
            } else {
                (
                    SwapDirection::StableToVolatile,
                    (aggressiveness * -gap * market.reserve_stable).min(agent.stable_balance),
                )
            };
            (amount > DUST).then_some(Order {
                agent_id: agent.id,
                direction,
                amount_in: amount,
            })
        }
        AgentProfile::OptimalArbitrageur {
            threshold,
            max_input,
        } => {
            let gap = relative_gap(market)?;
            if gap.abs() <= threshold {
                return None;
            }
            let (direction, size) = optimal_arbitrage(market, gap > 0.0)?;
            let balance = match direction {
                SwapDirection::VolatileToStable => agent.volatile_balance,
                SwapDirection::StableToVolatile => agent.stable_balance,
            };
            let amount = size.min(max_input).min(balance);
            (amount > DUST).then_some(Order {
                agent_id: agent.id,
                direction,
                amount_in: amount,
            })
        }
        AgentProfile::PanicSeller { panic_fraction } => {
            let triggered =
                market.regime == Regime::Panic || market.depeg() > agent.risk_threshold;
            if triggered {
                sell_stable(agent, panic_fraction)
            } else {
                None
            }
        }
        AgentProfile::Passive => ctx.passive_exit.and_then(|f| sell_stable(agent, f)),
        AgentProfile::NoiseTrader {
            volume_sigma,
            panic_band,
            wallet_tail_probability,
            ..
        } => {
            let walk: f64 = rng.sample(StandardNormal);
            agent.trade_volume = (agent.trade_volume + volume_sigma * walk).abs();

            let mean = if market.spot_price > market.peg - panic_band {
                0.0
            } else {
                market.peg / market.spot_price - 1.0
            };
            let z: f64 = rng.sample(StandardNormal);
            // Positive = sell stable, in unit of account
            let trade_value = (mean + z) * agent.trade_volume;

            let (direction, wanted, balance) = if trade_value > 0.0 {
                (
                    SwapDirection::StableToVolatile,
                    trade_value / market.spot_price,
                    agent.stable_balance,
                )
            } else {
                (
                    SwapDirection::VolatileToStable,
                    -trade_value / market.volatile_price,
                    agent.volatile_balance,
                )
            };
            let wallet = draw_wallet(balance, wallet_tail_probability, rng);
            let amount = wanted.min(wallet);
            (amount > DUST).then_some(Order {
                agent_id: agent.id,
                direction,
                amount_in: amount,
            })
        }
    }
}

/// (external − spot) / external, or `None` when either price is unusable.
fn relative_gap(market: &MarketView) -> Option<f64> {
    let gap = (market.external_price - market.spot_price) / market.external_price;
    gap.is_finite().then_some(gap)
}

/// Profit-maximizing input against a constant-product pool, valuing stable
/// at the external price and volatile at its market price. Returns `None`
/// when no positive trade exists.
pub fn optimal_arbitrage(market: &MarketView, buy_stable: bool) -> Option<(SwapDirection, f64)> {
    let gamma = 1.0 - market.swap_fee;
    let (r_s, r_v) = (market.reserve_stable, market.reserve_volatile);
    if !(gamma > 0.0 && market.volatile_price > 0.0 && market.external_price > 0.0) {
        return None;
    }
    let (direction, size) = if buy_stable {
        let target = (r_v * r_s * gamma * market.external_price / market.volatile_price).sqrt();
        (SwapDirection::VolatileToStable, (target - r_v) / gamma)
    } else {
        let target = (r_s * r_v * gamma * market.volatile_price / market.external_price).sqrt();
        (SwapDirection::StableToVolatile, (target - r_s) / gamma)
    };
    (size.is_finite() && size > 0.0).then_some((direction, size))
}

/// Exponentially distributed wallet size truncated at `balance`; the rate is
/// set so that `P(W ≥ balance) = tail_probability`.
pub fn draw_wallet<R: Rng + ?Sized>(balance: f64, tail_probability: f64, rng: &mut R) -> f64 {
    if !(balance > 0.0) {
        return 0.0;
    }
    let rate = -tail_probability.ln() / balance;
    let exp = match Exp::new(rate) {
        Ok(d) => d,
        Err(_) => return balance,
    };
    for _ in 0..MAX_WALLET_DRAWS {
        let w: f64 = exp.sample(rng);
        if w <= balance {
            return w;
        }
    }
    balance
}

// ═══════════════════════════════════════════════════════════════════════
// Agent pool
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct AgentPool {
    pub agents: Vec<Agent>,
}

impl AgentPool {
    /// Ids are assigned sequentially in `AgentSpec` order.
    pub fn from_specs(specs: &[AgentSpec]) -> Self {
        let mut agents = Vec::new();
        for spec in specs {
            for _ in 0..spec.count {
                let base_volume = match spec.profile {
                    AgentProfile::NoiseTrader { base_volume, .. } => base_volume,
                    _ => 0.0,
                };
                agents.push(Agent {
                    id: agents.len(),
                    stable_balance: spec.stable_balance,
                    volatile_balance: spec.volatile_balance,
                    profile: spec.profile.clone(),
                    risk_threshold: spec.risk_threshold,
                    trade_volume: base_volume,
                });
            }
        }
        AgentPool { agents }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Gather this step's orders. Every agent decides against the same
    /// snapshot; execution order is ascending `agent_id`.
    pub fn collect_orders<R: Rng + ?Sized>(
        &mut self,
        ctx: &DecisionContext,
        rng: &mut R,
    ) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .agents
            .iter_mut()
            .filter_map(|agent| decide(agent, ctx, rng))
            .collect();
        orders.sort_by_key(|o| o.agent_id);
        orders
    }

    /// Debit the input and credit the output of an executed order.
    pub fn settle(&mut self, order: &Order, amount_in: f64, amount_out: f64) {
        let agent = &mut self.agents[order.agent_id];
        let remaining = match order.direction {
            SwapDirection::StableToVolatile => agent.stable_balance - amount_in,
            SwapDirection::VolatileToStable => agent.volatile_balance - amount_in,
        };
        if remaining < -DUST {
            panic!(
                "agent balance went negative settling {:?} (in={}, out={}): {:?}",
                order, amount_in, amount_out, agent
            );
        }
        // Absorb float residue from selling a whole balance
        let remaining = remaining.max(0.0);
        match order.direction {
            SwapDirection::StableToVolatile => {
                agent.stable_balance = remaining;
                agent.volatile_balance += amount_out;
            }
            SwapDirection::VolatileToStable => {
                agent.volatile_balance = remaining;
                agent.stable_balance += amount_out;
            }
        }
    }

    pub fn total_stable(&self) -> f64 {
        self.agents.iter().map(|a| a.stable_balance).sum()
    }

    pub fn total_volatile(&self) -> f64 {
        self.agents.iter().map(|a| a.volatile_balance).sum()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.agents.iter().filter(|a| a.profile.kind() == kind).count()
    }
}
