use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::agents::{AgentPool, DecisionContext, Order};
use crate::amm::Amm;
use crate::controller::{MintBurnController, SupplyAdjustment};
use crate::error::{SimError, SimResult};
use crate::price_process::shock_factor;
use crate::regime::{PanicScenarioInjector, Regime, RegimeSignal};
use crate::scenario::ScenarioConfig;
use crate::state::{MarketView, SimulationState, Termination, Trajectory};

/// Clipped orders take this share of the pool's max fillable input, so the
/// retried swap lands strictly inside the reserve floor.
const CLIP_MARGIN: f64 = 0.999;

/// Relative slack when checking supply >= reserve.
const SUPPLY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Advanced(SimulationState),
    Finished(Termination),
}

/// Owns one run: its RNG stream, pool, agents, controller and regime machine.
///
/// Each step reads the previous snapshot and appends a new one; snapshots are
/// never modified after they are recorded.
pub struct SimulationEngine {
    config: ScenarioConfig,
    rng: StdRng,
    amm: Amm,
    agents: AgentPool,
    controller: MintBurnController,
    injector: PanicScenarioInjector,
    volatile_market_cap: f64,
    states: Vec<SimulationState>,
    finished: Option<Termination>,
}

impl SimulationEngine {
    /// Fails with `InvalidConfig` before anything is built.
    pub fn new(config: &ScenarioConfig) -> SimResult<Self> {
        config.validate()?;

        let amm = Amm::new(
            config.amm.initial_stable,
            config.amm.initial_volatile,
            config.amm.swap_fee,
            config.amm.min_reserve,
        );
        let volatile_price = config.tokens.initial_volatile_price;
        let initial = SimulationState {
            step: 0,
            stable_supply: config.tokens.stable_supply,
            volatile_supply: config.tokens.volatile_supply,
            reserve_stable: amm.reserve_stable(),
            reserve_volatile: amm.reserve_volatile(),
            external_price: config.initial_external_price,
            volatile_price,
            spot_price: amm.stable_price(volatile_price),
            regime: Regime::Normal,
            stable_minted: 0.0,
            volatile_minted: 0.0,
            clipped_orders: 0,
        };

        Ok(SimulationEngine {
            rng: StdRng::seed_from_u64(config.seed),
            amm,
            agents: AgentPool::from_specs(&config.agents),
            controller: MintBurnController::new(config.controller.clone()),
            injector: PanicScenarioInjector::new(config.panic.clone()),
            volatile_market_cap: volatile_price * config.tokens.volatile_supply,
            states: vec![initial],
            finished: None,
            config: config.clone(),
        })
    }

    pub fn with_seed(config: &ScenarioConfig, seed: u64) -> SimResult<Self> {
        Self::new(&config.with_seed(seed))
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn amm(&self) -> &Amm {
        &self.amm
    }

    pub fn agents(&self) -> &AgentPool {
        &self.agents
    }

    pub fn regime(&self) -> Regime {
        self.injector.regime()
    }

    pub fn states(&self) -> &[SimulationState] {
        &self.states
    }

    pub fn initial_state(&self) -> &SimulationState {
        &self.states[0]
    }

    fn last_state(&self) -> &SimulationState {
        // The initial state is pushed in `new`, so this is never empty
        &self.states[self.states.len() - 1]
    }

    fn market_view(&self, step: u64, external_price: f64, volatile_price: f64, regime: Regime) -> MarketView {
        MarketView {
            step,
            peg: self.config.peg,
            spot_price: self.amm.stable_price(volatile_price),
            external_price,
            volatile_price,
            reserve_stable: self.amm.reserve_stable(),
            reserve_volatile: self.amm.reserve_volatile(),
            min_reserve: self.amm.min_reserve,
            swap_fee: self.amm.swap_fee,
            regime,
        }
    }

    /// Execute one order, clipping it to the fillable maximum on
    /// `InsufficientLiquidity`. Returns true if the order was clipped.
    fn execute(&mut self, order: &Order) -> bool {
        match self.amm.swap(order.direction, order.amount_in) {
            Ok(out) => {
                self.agents.settle(order, order.amount_in, out);
                false
            }
            Err(SimError::InsufficientLiquidity { max_fillable, .. }) => {
                let clipped = (max_fillable * CLIP_MARGIN).min(order.amount_in);
                let filled = if clipped > 0.0 {
                    match self.amm.swap(order.direction, clipped) {
                        Ok(out) => {
                            self.agents.settle(order, clipped, out);
                            clipped
                        }
                        Err(e) => {
                            warn!(
                                agent = order.agent_id,
                                amount = clipped,
                                error = %e,
                                "clipped retry failed"
                            );
                            0.0
                        }
                    }
                } else {
                    0.0
                };
                warn!(
                    agent = order.agent_id,
                    requested = order.amount_in,
                    filled,
                    "order clipped by pool liquidity"
                );
                true
            }
            Err(e) => {
                debug!(agent = order.agent_id, error = %e, "order skipped");
                false
            }
        }
    }

    /// Advance one step. Once the run has terminated this keeps returning
    /// `Finished` without touching any state.
    pub fn step(&mut self) -> StepResult {
        if let Some(t) = &self.finished {
            return StepResult::Finished(t.clone());
        }

        let prev = self.last_state().clone();
        let step = prev.step + 1;
        let peg = self.config.peg;

        // (1) External reference price
        let factor = shock_factor(&self.config.shocks, step);
        let external_price = if factor != 1.0 {
            self.config
                .process
                .shifted(factor)
                .next(prev.external_price, self.config.dt, &mut self.rng)
        } else {
            self.config
                .process
                .next(prev.external_price, self.config.dt, &mut self.rng)
        };

        // (2) Agents decide against the pre-trade market and last step's regime
        let ctx = DecisionContext {
            market: self.market_view(step, external_price, prev.volatile_price, prev.regime),
            collapse_sell_fraction: self.config.panic.collapse_sell_fraction,
            passive_exit: (self.config.panic.passive_exit_step == Some(step))
                .then_some(self.config.panic.passive_exit_fraction),
        };
        let orders = self.agents.collect_orders(&ctx, &mut self.rng);

        // (3) Swaps in agent-id order
        let stable_before = self.amm.reserve_stable();
        let mut clipped_orders = 0u32;
        for order in &orders {
            if self.execute(order) {
                clipped_orders += 1;
            }
        }

        // (4) Controller
        let post_trade = self.market_view(step, external_price, prev.volatile_price, prev.regime);
        let stable_flow = self.amm.reserve_stable() - stable_before;
        let proposed = self.controller.step(
            &post_trade,
            prev.regime == Regime::Collapsed,
            stable_flow,
        );
        let applied = if proposed.is_noop() {
            proposed
        } else {
            match self
                .amm
                .apply_controller_adjustment(proposed.stable_delta, proposed.volatile_delta)
            {
                Ok(()) => proposed,
                Err(e) => {
                    warn!(step, error = %e, "controller adjustment rejected by pool");
                    self.controller.revert(&proposed);
                    SupplyAdjustment::default()
                }
            }
        };
        let stable_supply = prev.stable_supply + applied.stable_delta;
        let volatile_supply = prev.volatile_supply + applied.volatile_delta;

        // (5) Revalue the volatile token: dilution plus regime confidence loss
        self.volatile_market_cap *= 1.0 - self.config.panic.confidence_decay(prev.regime);
        let volatile_price = self.volatile_market_cap / volatile_supply;
        let spot_price = self.amm.stable_price(volatile_price);

        let mut state = SimulationState {
            step,
            stable_supply,
            volatile_supply,
            reserve_stable: self.amm.reserve_stable(),
            reserve_volatile: self.amm.reserve_volatile(),
            external_price,
            volatile_price,
            spot_price,
            regime: prev.regime,
            stable_minted: applied.stable_delta,
            volatile_minted: applied.volatile_delta,
            clipped_orders,
        };

        // (6) Non-finite values end the run; the bad snapshot is not recorded
        if let Some(field) = non_finite_field(&state) {
            error!(step, field, "numerical divergence, truncating run");
            let t = Termination::NumericalDivergence {
                step,
                field: field.to_string(),
            };
            self.finished = Some(t.clone());
            return StepResult::Finished(t);
        }
        check_invariants(&state);

        // (7) Regime machine sees the end-of-step market
        let signal = RegimeSignal {
            step,
            depeg: ((peg - spot_price) / peg).max(0.0),
            supply_growth: volatile_supply / prev.volatile_supply - 1.0,
            volatile_decline: 1.0 - volatile_price / self.config.tokens.initial_volatile_price,
        };
        if let Some(t) = self.injector.observe(&signal) {
            match t.to {
                Regime::Collapsed => warn!(
                    step,
                    volatile_price,
                    volatile_supply,
                    "regime {} -> {}",
                    t.from,
                    t.to
                ),
                _ => info!(step, spot_price, "regime {} -> {}", t.from, t.to),
            }
        }
        state.regime = self.injector.regime();

        // (8) Record, then check termination
        self.states.push(state.clone());
        if volatile_price < self.config.min_volatile_price {
            warn!(step, volatile_price, "volatile token worthless, stopping run");
            self.finished = Some(Termination::VolatileWorthless { step });
        } else if step >= self.config.steps {
            self.finished = Some(Termination::Completed);
        }

        StepResult::Advanced(state)
    }

    /// Run to termination and hand back the trajectory.
    pub fn run(mut self) -> Trajectory {
        info!(
            seed = self.config.seed,
            steps = self.config.steps,
            agents = self.agents.len(),
            "starting run"
        );
        let termination = loop {
            if let StepResult::Finished(t) = self.step() {
                break t;
            }
        };
        let last = self.last_state();
        info!(
            steps = last.step,
            spot_price = last.spot_price,
            regime = %last.regime,
            termination = ?termination,
            "run finished"
        );
        Trajectory {
            seed: self.config.seed,
            states: self.states,
            termination,
        }
    }
}

/// Validate, build and run in one call.
pub fn simulate(config: &ScenarioConfig) -> SimResult<Trajectory> {
    Ok(SimulationEngine::new(config)?.run())
}

fn non_finite_field(state: &SimulationState) -> Option<&'static str> {
    let fields = [
        ("external_price", state.external_price),
        ("volatile_price", state.volatile_price),
        ("spot_price", state.spot_price),
        ("stable_supply", state.stable_supply),
        ("volatile_supply", state.volatile_supply),
        ("reserve_stable", state.reserve_stable),
        ("reserve_volatile", state.reserve_volatile),
    ];
    fields
        .iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(name, _)| *name)
}

/// Negative balances or supplies below pool reserves mean a component broke
/// its contract. Abort with the full snapshot.
fn check_invariants(state: &SimulationState) {
    let violation = if state.reserve_stable < 0.0 || state.reserve_volatile < 0.0 {
        Some("negative pool reserve")
    } else if state.stable_supply < 0.0 || state.volatile_supply < 0.0 {
        Some("negative token supply")
    } else if state.stable_supply < state.reserve_stable * (1.0 - SUPPLY_TOLERANCE) {
        Some("stable supply below pool reserve")
    } else if state.volatile_supply < state.reserve_volatile * (1.0 - SUPPLY_TOLERANCE) {
        Some("volatile supply below pool reserve")
    } else {
        None
    };
    if let Some(msg) = violation {
        panic!("invariant violated ({}): {:?}", msg, state);
    }
}
