use approx::assert_relative_eq;

use depeg_sim::metrics::{max_drawdown, mse_vs_peg, MetricsCollector};
use depeg_sim::regime::Regime;
use depeg_sim::scenarios::ScenarioId;
use depeg_sim::state::{SimulationState, Termination, Trajectory};
use depeg_sim::simulate;

fn state(step: u64, spot: f64, regime: Regime) -> SimulationState {
    SimulationState {
        step,
        stable_supply: 1_000.0,
        volatile_supply: 1_000.0 + step as f64,
        reserve_stable: 100.0,
        reserve_volatile: 100.0,
        external_price: 1.0,
        volatile_price: 1.0,
        spot_price: spot,
        regime,
        stable_minted: 0.0,
        volatile_minted: 0.0,
        clipped_orders: if step == 2 { 3 } else { 0 },
    }
}

fn handmade() -> Trajectory {
    Trajectory {
        seed: 0,
        states: vec![
            state(0, 1.0, Regime::Normal),
            state(1, 1.1, Regime::Normal),
            state(2, 0.9, Regime::Panic),
            state(3, 0.55, Regime::Collapsed),
        ],
        termination: Termination::Completed,
    }
}

#[test]
fn test_mse_by_hand() {
    let t = handmade();
    // (0 + 0.01 + 0.01 + 0.2025) / 4
    assert_relative_eq!(mse_vs_peg(&t, 1.0, None), 0.2225 / 4.0, max_relative = 1e-12);
    assert_relative_eq!(mse_vs_peg(&t, 1.0, Some(1..3)), 0.01, max_relative = 1e-12);
    assert_eq!(mse_vs_peg(&t, 1.0, Some(10..20)), 0.0);
}

#[test]
fn test_drawdown_by_hand() {
    assert_relative_eq!(max_drawdown(&[1.0, 1.1, 0.9, 0.55]), 0.5, max_relative = 1e-12);
    assert_relative_eq!(max_drawdown(&[1.0, 0.8, 1.2, 0.9]), 0.25, max_relative = 1e-12);
    assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]), 0.0);
    assert_eq!(max_drawdown(&[]), 0.0);
}

#[test]
fn test_summary_fields() {
    let s = MetricsCollector::summarize(&handmade(), 1.0);
    assert_eq!(s.steps, 3);
    assert_eq!(s.final_regime, Regime::Collapsed);
    assert_eq!(s.panic_step, Some(2));
    assert_eq!(s.collapse_step, Some(3));
    assert_eq!(s.clipped_steps, 1);
    assert_relative_eq!(s.min_spot_price, 0.55);
    assert_relative_eq!(s.final_spot_price, 0.55);
    assert_relative_eq!(s.volatile_supply_growth, 1_003.0 / 1_000.0);
    assert!(!s.truncated);
}

#[test]
fn test_summary_is_idempotent() {
    let config = ScenarioId::NoisyMarket.config(400, 77);
    let t = simulate(&config).unwrap();
    let before = t.clone();

    let a = MetricsCollector::summarize(&t, config.peg);
    let b = MetricsCollector::summarize(&t, config.peg);
    assert_eq!(a, b);
    assert_eq!(a.mse.to_bits(), b.mse.to_bits());
    assert_eq!(a.max_drawdown.to_bits(), b.max_drawdown.to_bits());
    // Summarizing never touches the run
    assert_eq!(t, before);
}

#[test]
fn test_summary_serializes() {
    let s = MetricsCollector::summarize(&handmade(), 1.0);
    let json = serde_json::to_string(&s).unwrap();
    assert!(json.contains("\"final_regime\":\"Collapsed\""));
    assert!(json.contains("\"collapse_step\":3"));
}
