// Integration tests for grid ladders and the bootstrap that places them

mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use common::{create_temp_dir, create_test_config, MockExchange};
use grid_profit_engine::core::bootstrap::bootstrap_buys;
use grid_profit_engine::core::grid::{active_buy_window, generate_levels, MAX_LEVELS};
use grid_profit_engine::{CorruptStatePolicy, GridBounds, ProfitSplitter, Side, TradingMode};

#[test]
fn test_default_ladder_spans_bounds() {
    let levels = assert_ok!(generate_levels(dec!(0.13), dec!(0.32), dec!(1.0)));

    assert_eq!(levels.first(), Some(&dec!(0.13)));
    assert_eq!(levels.last(), Some(&dec!(0.32)));
    assert!(levels.windows(2).all(|w| w[0] < w[1]));
    // 0.13 * 1.01^90 is just under 0.32
    assert_eq!(levels.len(), 92);
}

#[test]
fn test_bad_ladders_are_rejected() {
    assert_err!(generate_levels(dec!(0.32), dec!(0.13), dec!(1.0)));
    assert_err!(generate_levels(dec!(0), dec!(0.32), dec!(1.0)));
    assert_err!(generate_levels(dec!(0.13), dec!(0.32), dec!(0)));
    // 0.001% steps over a 100x range need far more than the cap
    assert_err!(generate_levels(dec!(1), dec!(100), dec!(0.001)));
    assert!(MAX_LEVELS >= 1000);
}

#[test]
fn test_buy_window_is_nearest_below_price() {
    let levels = generate_levels(dec!(0.13), dec!(0.32), dec!(1.0)).unwrap();
    let window = active_buy_window(&levels, dec!(0.20), 3);

    assert_eq!(window.len(), 3);
    assert!(window.iter().all(|l| *l < dec!(0.20)));
    let below: Vec<Decimal> = levels.iter().copied().filter(|l| *l < dec!(0.20)).collect();
    assert!(window.iter().all(|l| below[below.len() - 3..].contains(l)));
}

#[tokio::test]
async fn test_bootstrap_respects_cycle_budget_and_open_levels() {
    let dir = create_temp_dir();
    let mut config = create_test_config(dir.path());
    config.grid.max_cycle_usd = dec!(20);
    let exchange = MockExchange::new();
    let mut splitter =
        ProfitSplitter::open(config.split.clone(), config.split_state_path(), CorruptStatePolicy::Refuse).unwrap();
    let bounds = GridBounds::new(config.grid.low, config.grid.high);

    let report = assert_ok!(bootstrap_buys(&exchange, &config, bounds, exchange.limits, &mut splitter).await);
    assert_eq!(report.placed, 4);
    assert!(exchange.created().iter().all(|r| r.side == Side::Buy));

    // Resting levels are skipped; a fresh cycle budget fills the remaining candidates
    let again = assert_ok!(bootstrap_buys(&exchange, &config, bounds, exchange.limits, &mut splitter).await);
    assert_eq!(again.already_open, 4);
    assert_eq!(again.placed, 3);
    assert_eq!(exchange.created().len(), 7);

    let third = assert_ok!(bootstrap_buys(&exchange, &config, bounds, exchange.limits, &mut splitter).await);
    assert_eq!(third.already_open, 7);
    assert_eq!(third.placed, 0);
}

#[tokio::test]
async fn test_bootstrap_spends_reinvestment_pool() {
    let dir = create_temp_dir();
    let mut config = create_test_config(dir.path());
    config.grid.max_bootstrap_orders = 1;
    let exchange = MockExchange::new();
    let mut splitter =
        ProfitSplitter::open(config.split.clone(), config.split_state_path(), CorruptStatePolicy::Refuse).unwrap();
    // Two chunks of profit put $4 into the reinvest pool
    splitter.handle_realized_profit(&exchange, dec!(8)).await.unwrap();
    let bounds = GridBounds::new(config.grid.low, config.grid.high);

    let report = bootstrap_buys(&exchange, &config, bounds, exchange.limits, &mut splitter)
        .await
        .unwrap();
    assert_eq!(report.placed, 1);
    assert_eq!(splitter.state().reinvest_pool_usd, Decimal::ZERO);
    assert_eq!(splitter.state().total_reinvested_usd, dec!(4));
    // $5 base + $4 reinvested
    assert!(report.committed_usd > dec!(8));
}

#[tokio::test]
async fn test_live_bootstrap_checks_free_balance() {
    let dir = create_temp_dir();
    let mut config = create_test_config(dir.path());
    config.exchange.mode = TradingMode::Live;
    let exchange = MockExchange::new();
    exchange.set_quote_balance(dec!(3));
    let mut splitter =
        ProfitSplitter::open(config.split.clone(), config.split_state_path(), CorruptStatePolicy::Refuse).unwrap();
    let bounds = GridBounds::new(config.grid.low, config.grid.high);

    let report = bootstrap_buys(&exchange, &config, bounds, exchange.limits, &mut splitter)
        .await
        .unwrap();
    assert_eq!(report.placed, 0);
    assert!(exchange.created().is_empty());
}
