use approx::assert_relative_eq;
use depeg_sim::controller::{ControllerConfig, ControllerMode, MintBurnController};
use depeg_sim::regime::Regime;
use depeg_sim::state::MarketView;

fn market(spot: f64, volatile_price: f64, reserve_stable: f64) -> MarketView {
    MarketView {
        step: 1,
        peg: 1.0,
        spot_price: spot,
        external_price: 1.0,
        volatile_price,
        reserve_stable,
        reserve_volatile: reserve_stable,
        min_reserve: 1.0,
        swap_fee: 0.003,
        regime: Regime::Normal,
    }
}

#[test]
fn test_no_action_inside_threshold() {
    let c = MintBurnController::new(ControllerConfig::default());
    for spot in [0.995, 1.0, 1.009] {
        let adj = c.rebalance(&market(spot, 1.0, 1_000_000.0), false);
        assert!(adj.is_noop(), "spot {} should not trigger: {:?}", spot, adj);
    }
}

#[test]
fn test_contraction_below_peg() {
    let c = MintBurnController::new(ControllerConfig::default());
    let adj = c.rebalance(&market(0.9, 2.0, 1_000_000.0), false);

    // 0.2 · 0.1 · 1M stable burned, paid for with volatile at price 2
    assert_relative_eq!(adj.stable_delta, -20_000.0, max_relative = 1e-12);
    assert_relative_eq!(adj.volatile_delta, 10_000.0, max_relative = 1e-12);
    assert_relative_eq!(adj.burned_stable(), 20_000.0, max_relative = 1e-12);
    assert_relative_eq!(adj.minted_volatile(), 10_000.0, max_relative = 1e-12);
}

#[test]
fn test_expansion_above_peg() {
    let c = MintBurnController::new(ControllerConfig::default());
    let adj = c.rebalance(&market(1.1, 2.0, 1_000_000.0), false);

    assert_relative_eq!(adj.stable_delta, 20_000.0, max_relative = 1e-12);
    assert_relative_eq!(adj.volatile_delta, -10_000.0, max_relative = 1e-12);
    assert_eq!(adj.minted_volatile(), 0.0);
    assert_eq!(adj.burned_stable(), 0.0);
}

#[test]
fn test_legs_balance_in_unit_of_account() {
    let c = MintBurnController::new(ControllerConfig::default());
    for (spot, vp) in [(0.8, 0.3), (0.97, 5.0), (1.2, 0.7), (1.03, 12.0)] {
        let adj = c.rebalance(&market(spot, vp, 500_000.0), false);
        assert!(!adj.is_noop());
        assert_relative_eq!(
            adj.stable_delta * 1.0,
            -adj.volatile_delta * vp,
            max_relative = 1e-12
        );
    }
}

#[test]
fn test_volume_cap_and_uncapped_mode() {
    let c = MintBurnController::new(ControllerConfig::default());
    let m = market(0.5, 1.0, 1_000_000.0);

    // 0.2 · 0.5 · 1M = 100k, capped at 5% of the reserve
    let capped = c.rebalance(&m, false);
    assert_relative_eq!(capped.stable_delta, -50_000.0, max_relative = 1e-12);

    let uncapped = c.rebalance(&m, true);
    assert_relative_eq!(uncapped.stable_delta, -100_000.0, max_relative = 1e-12);
}

#[test]
fn test_adjustment_stays_above_reserve_floor() {
    let c = MintBurnController::new(ControllerConfig {
        mint_rate: 1.0,
        deviation_threshold: 0.01,
        max_mint_fraction: 1.0,
        ..ControllerConfig::default()
    });
    let mut m = market(0.5, 1.0, 100.0);
    m.min_reserve = 90.0;

    let adj = c.rebalance(&m, true);
    assert!(adj.stable_delta < 0.0);
    assert!(m.reserve_stable + adj.stable_delta > m.min_reserve);
}

#[test]
fn test_config_validation() {
    assert!(ControllerConfig::default().validate().is_ok());

    let bad = [
        ControllerConfig {
            mint_rate: -0.1,
            ..ControllerConfig::default()
        },
        ControllerConfig {
            deviation_threshold: 1.5,
            ..ControllerConfig::default()
        },
        ControllerConfig {
            max_mint_fraction: 0.0,
            ..ControllerConfig::default()
        },
        ControllerConfig {
            mode: ControllerMode::VirtualPool {
                pool_recovery_period: 0,
            },
            ..ControllerConfig::default()
        },
    ];
    for cfg in bad {
        assert!(cfg.validate().is_err(), "{:?} should be rejected", cfg);
    }
}
