// Integration tests for the FIFO profit watcher

mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{create_temp_dir, create_test_config, MockExchange};
use grid_profit_engine::core::profit_watcher::settle_fold;
use grid_profit_engine::{
    Config, CorruptStatePolicy, ProfitSplitter, ProfitWatcher, Side, StateStore, StatsRecorder,
    WatcherState,
};

fn open_watcher(config: &Config) -> ProfitWatcher {
    ProfitWatcher::open(
        &config.exchange.symbol,
        &config.ledger,
        config.watcher_state_path(),
        CorruptStatePolicy::Refuse,
    )
    .expect("Failed to open watcher")
}

fn zero_fee_config(dir: &std::path::Path) -> Config {
    let mut config = create_test_config(dir);
    config.ledger.fee_rate_each_side = Decimal::ZERO;
    config
}

#[tokio::test]
async fn test_bootstrap_skips_existing_history() {
    let dir = create_temp_dir();
    let config = zero_fee_config(dir.path());
    let exchange = MockExchange::new();
    exchange.add_trade(Side::Buy, dec!(0.10), dec!(100));
    let newest = exchange.add_trade(Side::Sell, dec!(0.30), dec!(100));

    let mut watcher = open_watcher(&config);
    assert_eq!(watcher.bootstrap(&exchange).await.unwrap(), Some(newest));

    let summary = watcher.poll(&exchange).await.unwrap();
    assert!(summary.is_empty());
    assert!(watcher.ledger().is_empty());
}

#[tokio::test]
async fn test_poll_realizes_fifo_profit_exactly_once() {
    let dir = create_temp_dir();
    let config = zero_fee_config(dir.path());
    let exchange = MockExchange::new();

    let mut watcher = open_watcher(&config);
    watcher.bootstrap(&exchange).await.unwrap();

    exchange.add_trade(Side::Buy, dec!(0.20), dec!(10));
    exchange.add_trade(Side::Buy, dec!(0.22), dec!(10));
    exchange.add_trade(Side::Sell, dec!(0.25), dec!(15));

    let summary = watcher.poll(&exchange).await.unwrap();
    assert_eq!(summary.trades, 3);
    // 10 * 0.05 + 5 * 0.03
    assert_eq!(summary.realized, dec!(0.65));
    assert_eq!(summary.sell_trades, 1);
    assert_eq!(watcher.ledger().inventory_qty(), dec!(5));

    let again = watcher.poll(&exchange).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_checkpoint_and_inventory_survive_restart() {
    let dir = create_temp_dir();
    let config = zero_fee_config(dir.path());
    let exchange = MockExchange::new();

    let last = {
        let mut watcher = open_watcher(&config);
        exchange.add_trade(Side::Buy, dec!(0.20), dec!(10));
        watcher.poll(&exchange).await.unwrap();
        watcher.last_trade_id()
    };

    let saved: WatcherState = StateStore::new(config.watcher_state_path(), CorruptStatePolicy::Refuse)
        .load()
        .unwrap();
    assert_eq!(saved.last_trade_id, last);
    assert_eq!(saved.inventory.len(), 1);

    let mut watcher = open_watcher(&config);
    exchange.add_trade(Side::Sell, dec!(0.21), dec!(10));
    let summary = watcher.poll(&exchange).await.unwrap();
    assert_eq!(summary.trades, 1);
    assert_eq!(summary.realized, dec!(0.1));
    assert!(watcher.ledger().is_empty());
}

#[tokio::test]
async fn test_poll_pages_through_large_backlogs() {
    let dir = create_temp_dir();
    let mut config = zero_fee_config(dir.path());
    config.ledger.trades_fetch_limit = 2;
    let exchange = MockExchange::new();

    exchange.add_trade(Side::Sell, dec!(0.18), dec!(1));
    let mut watcher = open_watcher(&config);
    watcher.bootstrap(&exchange).await.unwrap();
    for _ in 0..5 {
        exchange.add_trade(Side::Buy, dec!(0.20), dec!(1));
    }

    let last = exchange.add_trade(Side::Buy, dec!(0.20), dec!(1));
    let summary = watcher.poll(&exchange).await.unwrap();
    assert_eq!(summary.trades, 6);
    assert_eq!(watcher.last_trade_id(), Some(last));
    assert_eq!(watcher.ledger().inventory_qty(), dec!(6));
}

#[tokio::test]
async fn test_backfill_folds_history_from_since() {
    let dir = create_temp_dir();
    let config = zero_fee_config(dir.path());
    let exchange = MockExchange::new();
    exchange.add_trade(Side::Buy, dec!(0.20), dec!(10));
    exchange.add_trade(Side::Sell, dec!(0.30), dec!(10));

    let mut watcher = open_watcher(&config);
    let summary = watcher.backfill(&exchange, 0).await.unwrap();

    assert_eq!(summary.trades, 2);
    assert_eq!(summary.realized, dec!(1));
}

#[tokio::test]
async fn test_unmatched_sell_realizes_nothing() {
    let dir = create_temp_dir();
    let config = zero_fee_config(dir.path());
    let exchange = MockExchange::new();
    let mut watcher = open_watcher(&config);
    watcher.bootstrap(&exchange).await.unwrap();

    exchange.add_trade(Side::Sell, dec!(0.30), dec!(7));
    let summary = watcher.poll(&exchange).await.unwrap();

    assert_eq!(summary.realized, Decimal::ZERO);
    assert_eq!(summary.sell_trades, 0);
    assert_eq!(summary.unmatched_qty, dec!(7));
}

#[tokio::test]
async fn test_settle_fold_feeds_stats_and_splitter() {
    let dir = create_temp_dir();
    let config = zero_fee_config(dir.path());
    let exchange = MockExchange::new();
    let stats = StatsRecorder::new(config.runtime_stats_path());
    let mut splitter =
        ProfitSplitter::open(config.split.clone(), config.split_state_path(), CorruptStatePolicy::Refuse)
            .unwrap();

    let mut watcher = open_watcher(&config);
    watcher.bootstrap(&exchange).await.unwrap();
    exchange.add_trade(Side::Buy, dec!(0.20), dec!(100));
    exchange.add_trade(Side::Sell, dec!(0.25), dec!(100));

    let summary = watcher.poll(&exchange).await.unwrap();
    assert_eq!(summary.realized, dec!(5));
    let outcome = settle_fold(&summary, &exchange, &stats, Some(&mut splitter))
        .await
        .unwrap()
        .expect("profit was realized");

    assert_eq!(outcome.chunks, 1);
    assert_eq!(splitter.state().split_accumulator_usd, dec!(1));
    let recorded = stats.read().unwrap();
    assert_eq!(recorded.cumulative_profit_usd, dec!(5));
    assert_eq!(recorded.sell_trades_count, 1);
    assert_eq!(recorded.splits_count, 1);

    // An empty fold touches nothing
    let empty = watcher.poll(&exchange).await.unwrap();
    assert!(settle_fold(&empty, &exchange, &stats, None).await.unwrap().is_none());
    assert_eq!(stats.read().unwrap().sell_trades_count, 1);
}
