// State inspection commands - read the JSON state files without an exchange
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use grid_profit_engine::core::{active_buy_window, generate_levels};
use grid_profit_engine::{
    Config, CorruptStatePolicy, GridBounds, ProfitSplitter, RuntimeStats, SplitState, StateStore,
    TradingResult, TradingState, WatcherState,
};

/// Bounds a running engine would use: recentered ones first
fn active_bounds(config: &Config) -> TradingResult<GridBounds> {
    let state: TradingState = StateStore::new(config.trading_state_path(), CorruptStatePolicy::Refuse).load()?;
    Ok(state
        .dyn_bounds
        .unwrap_or_else(|| GridBounds::new(config.grid.low, config.grid.high)))
}

pub fn show_levels(config: &Config, below: Option<Decimal>, count: usize) -> TradingResult<()> {
    let bounds = active_bounds(config)?;
    let levels = generate_levels(bounds.low, bounds.high, config.grid.step_pct)?;

    info!(
        "🪜 Grid {}..{} step {}% -> {} levels",
        bounds.low,
        bounds.high,
        config.grid.step_pct,
        levels.len()
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match below {
        Some(price) => {
            for level in active_buy_window(&levels, price, count) {
                info!("  {}", level);
            }
        }
        None => {
            for (idx, level) in levels.iter().enumerate() {
                info!("  {:>4}  {}", idx, level);
            }
        }
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

fn print_state<T>(title: &str, store: &StateStore<T>) -> TradingResult<()>
where
    T: Serialize + serde::de::DeserializeOwned + Default,
{
    info!("📄 {} ({})", title, store.path().display());
    if !store.path().exists() {
        info!("  not written yet");
        return Ok(());
    }
    match store.load() {
        Ok(state) => {
            let body = serde_json::to_string_pretty(&state)?;
            for line in body.lines() {
                info!("  {}", line);
            }
        }
        Err(e) => warn!("  ⚠️  unreadable: {}", e),
    }
    Ok(())
}

pub fn show_status(config: &Config) -> TradingResult<()> {
    // Refuse: inspecting must never quarantine or reset a file
    let policy = CorruptStatePolicy::Refuse;

    info!("📊 Engine State");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("⚙️  {} | mode {:?} | profit source {:?}", config.exchange.symbol, config.exchange.mode, config.engine.profit_source);
    print_state("Trading state", &StateStore::<TradingState>::new(config.trading_state_path(), policy))?;
    print_state("Split state", &StateStore::<SplitState>::new(config.split_state_path(), policy))?;
    print_state("Watcher checkpoint", &StateStore::<WatcherState>::new(config.watcher_state_path(), policy))?;
    print_state("Runtime stats", &StateStore::<RuntimeStats>::new(config.runtime_stats_path(), policy))?;
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

pub fn split_status(config: &Config) -> TradingResult<()> {
    let splitter = ProfitSplitter::open(config.split.clone(), config.split_state_path(), CorruptStatePolicy::Refuse)?;
    let state = splitter.state();

    info!("✂️  Profit split ({}% to BNB, chunk ${})", config.split.ratio * Decimal::from(100), config.split.chunk_usd);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Accumulator:      ${}", state.split_accumulator_usd);
    info!("  BNB pending:      ${}", state.bnb_pending_usd);
    info!("  Reinvest pool:    ${}", state.reinvest_pool_usd);
    info!("  Sent to BNB:      ${}", state.total_sent_to_bnb_usd);
    info!("  Reinvested:       ${}", state.total_reinvested_usd);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

pub fn split_pull(config: &Config, usd: Decimal) -> TradingResult<()> {
    let mut splitter =
        ProfitSplitter::open(config.split.clone(), config.split_state_path(), config.state.corrupt_policy)?;
    let pulled = splitter.pull_reinvestment(usd)?;
    if pulled < usd {
        warn!("⚠️  Pool only held ${} of the requested ${}", pulled, usd);
    }
    info!(
        "💸 Pulled ${} from the reinvestment pool (${} left)",
        pulled,
        splitter.state().reinvest_pool_usd
    );
    Ok(())
}
