use approx::assert_relative_eq;

use depeg_sim::agents::AgentSpec;
use depeg_sim::price_process::PriceProcess;
use depeg_sim::regime::{PanicConfig, Regime};
use depeg_sim::{
    simulate, ScenarioConfig, SimError, SimulationEngine, StepResult, Termination, Trajectory,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn short_config(steps: u64, seed: u64) -> ScenarioConfig {
    ScenarioConfig {
        steps,
        seed,
        ..ScenarioConfig::default()
    }
}

/// Tiny pool, deep-pocketed sellers forced into panic early.
fn thin_pool_config() -> ScenarioConfig {
    let mut c = short_config(200, 3);
    c.amm.initial_stable = 1_000.0;
    c.amm.initial_volatile = 1_000.0;
    c.amm.min_reserve = 100.0;
    c.agents = vec![
        AgentSpec::panic_sellers(5, 100_000.0, 0.01),
        AgentSpec::passive(5, 10_000.0),
    ];
    c.panic = PanicConfig {
        scripted_panic_step: Some(5),
        ..PanicConfig::default()
    };
    c
}

#[test]
fn test_same_seed_is_byte_identical() {
    init_tracing();
    let config = short_config(300, 1234);
    let a = simulate(&config).unwrap();
    let b = simulate(&config).unwrap();
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());

    let c = simulate(&config.with_seed(1235)).unwrap();
    assert_ne!(a.to_json().unwrap(), c.to_json().unwrap());
}

#[test]
fn test_trajectory_shape() {
    let t = simulate(&short_config(250, 7)).unwrap();
    assert_eq!(t.len(), 251);
    assert_eq!(t.termination, Termination::Completed);
    assert!(!t.is_truncated());
    assert!(t.ensure_finite().is_ok());
    for (i, s) in t.states.iter().enumerate() {
        assert_eq!(s.step, i as u64);
    }
}

#[test]
fn test_k_never_decreases_without_controller_action() {
    let mut config = short_config(500, 99);
    config.agents.push(AgentSpec::noise_traders(10, 100_000.0));
    let t = simulate(&config).unwrap();

    let mut checked = 0;
    for w in t.states.windows(2) {
        if w[1].controller_active() {
            continue;
        }
        checked += 1;
        assert!(
            w[1].k() >= w[0].k() * (1.0 - 1e-12),
            "k fell at step {}: {} -> {}",
            w[1].step,
            w[0].k(),
            w[1].k()
        );
    }
    assert!(checked > 100, "too few swap-only steps: {}", checked);
}

#[test]
fn test_supply_changes_are_double_entry() {
    let mut config = short_config(300, 5);
    config.process = config.process.with_volatility(0.03);
    let t = simulate(&config).unwrap();

    let mut active = 0;
    for w in t.states.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        assert_relative_eq!(
            cur.stable_supply - prev.stable_supply,
            cur.stable_minted,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            cur.volatile_supply - prev.volatile_supply,
            cur.volatile_minted,
            epsilon = 1e-6
        );
        // Controller legs are valued at peg on the stable side
        if cur.controller_active() {
            active += 1;
            assert_relative_eq!(
                cur.stable_minted * config.peg,
                -cur.volatile_minted * prev.volatile_price,
                max_relative = 1e-9
            );
        }
        assert!(cur.stable_supply >= cur.reserve_stable * (1.0 - 1e-9));
        assert!(cur.volatile_supply >= cur.reserve_volatile * (1.0 - 1e-9));
    }
    assert!(active > 0, "controller never acted at 3% volatility");
}

#[test]
fn test_liquidity_floor_holds_under_massive_selling() {
    init_tracing();
    let config = thin_pool_config();
    let t = simulate(&config).unwrap();

    assert!(t.states.iter().any(|s| s.liquidity_clipped()));
    for s in &t.states {
        assert!(s.reserve_stable >= config.amm.min_reserve, "step {}", s.step);
        assert!(s.reserve_volatile >= config.amm.min_reserve, "step {}", s.step);
        assert!(s.spot_price.is_finite() && s.spot_price > 0.0);
    }
    assert_eq!(t.first_step_in(Regime::Panic), Some(5));
}

#[test]
fn test_invalid_configs_rejected_before_running() {
    let mut cases = Vec::new();

    let mut c = ScenarioConfig::default();
    c.steps = 0;
    cases.push(c);

    let mut c = ScenarioConfig::default();
    c.amm.swap_fee = -0.01;
    cases.push(c);

    let mut c = ScenarioConfig::default();
    c.amm.initial_stable = 0.0;
    cases.push(c);

    let mut c = ScenarioConfig::default();
    c.tokens.stable_supply = 500_000.0;
    cases.push(c);

    let mut c = ScenarioConfig::default();
    c.peg = 0.0;
    cases.push(c);

    let mut c = ScenarioConfig::default();
    c.agents.push(AgentSpec::panic_sellers(1, f64::NAN, 0.05));
    cases.push(c);

    let mut c = ScenarioConfig::default();
    c.controller.max_mint_fraction = 2.0;
    cases.push(c);

    for (i, c) in cases.iter().enumerate() {
        match simulate(c) {
            Err(SimError::InvalidConfig(msg)) => assert!(!msg.is_empty()),
            Err(e) => panic!("case {}: expected InvalidConfig, got {}", i, e),
            Ok(_) => panic!("case {}: expected InvalidConfig, got a trajectory", i),
        }
    }
}

#[test]
fn test_step_by_step_matches_run() {
    let config = short_config(50, 21);
    let mut engine = SimulationEngine::new(&config).unwrap();
    assert_eq!(engine.initial_state().step, 0);
    assert_eq!(engine.regime(), Regime::Normal);

    let mut advanced = 0;
    loop {
        match engine.step() {
            StepResult::Advanced(s) => {
                advanced += 1;
                assert_eq!(s.step, advanced);
            }
            StepResult::Finished(t) => {
                assert_eq!(t, Termination::Completed);
                break;
            }
        }
    }
    assert_eq!(advanced, 50);
    // Further steps are no-ops
    assert!(matches!(engine.step(), StepResult::Finished(_)));
    assert_eq!(engine.states().len(), 51);

    let stepped = engine.states().to_vec();
    let whole = simulate(&config).unwrap();
    assert_eq!(stepped, whole.states);
}

#[test]
fn test_agent_holdings_plus_pool_fit_in_supply() {
    let config = short_config(300, 17);
    let mut engine = SimulationEngine::new(&config).unwrap();
    while let StepResult::Advanced(s) = engine.step() {
        let stable_held = engine.agents().total_stable() + engine.amm().reserve_stable();
        assert!(
            stable_held <= s.stable_supply * (1.0 + 1e-9),
            "step {}: {} held vs {} supply",
            s.step,
            stable_held,
            s.stable_supply
        );
        assert!(engine.agents().agents.iter().all(|a| a.stable_balance >= 0.0));
    }
}

#[test]
fn test_truncated_trajectory_reports_divergence() {
    let t = Trajectory {
        seed: 1,
        states: Vec::new(),
        termination: Termination::NumericalDivergence {
            step: 12,
            field: "volatile_price".to_string(),
        },
    };
    assert!(t.is_truncated());
    assert_eq!(
        t.ensure_finite(),
        Err(SimError::NumericalDivergence {
            step: 12,
            field: "volatile_price".to_string()
        })
    );
}

#[test]
fn test_runaway_price_truncates_run() {
    init_tracing();
    let mut config = short_config(50, 4);
    config.process = PriceProcess::GeometricBrownian {
        drift: 800.0,
        volatility: 0.0,
    };
    assert!(config.validate().is_ok());

    // exp(800) overflows on the first step
    let t = simulate(&config).unwrap();
    match &t.termination {
        Termination::NumericalDivergence { step, field } => {
            assert_eq!(*step, 1);
            assert_eq!(field, "external_price");
        }
        other => panic!("expected NumericalDivergence, got {:?}", other),
    }
    assert!(t.is_truncated());
    // Only the initial state was recorded
    assert_eq!(t.len(), 1);
    assert!(t.ensure_finite().is_err());
}
