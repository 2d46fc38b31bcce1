// Run command: wire the exchange and drive the engine
use std::sync::Arc;

use tracing::{error, info, warn};

use grid_profit_engine::core::TickReport;
use grid_profit_engine::{
    Config, Engine, Exchange, GracefulShutdown, PaperExchange, TradingError, TradingMode,
    TradingResult,
};

/// Exchange for the configured mode; only the paper venue ships with the binary
pub fn open_exchange(config: &Config) -> TradingResult<Arc<dyn Exchange>> {
    match config.exchange.mode {
        TradingMode::Paper => {
            info!(
                "🧪 PAPER mode: {} from {} ({}% walk, seed {})",
                config.exchange.symbol,
                config.paper.start_price,
                config.paper.volatility_pct,
                config.paper.seed
            );
            Ok(Arc::new(PaperExchange::from_config(config)?))
        }
        TradingMode::Live => {
            error!("❌ Live mode needs an exchange client implementing the Exchange trait");
            error!("   This build only bundles the paper exchange; set [exchange] mode = \"paper\"");
            Err(TradingError::ConfigValidation(
                "live mode has no bundled exchange client".to_string(),
            ))
        }
    }
}

pub async fn run_engine(config: Config, once: bool, no_bootstrap: bool) -> TradingResult<()> {
    let exchange = open_exchange(&config)?;

    let mut engine = Engine::new(config, exchange).await?;
    if no_bootstrap {
        engine.skip_bootstrap();
    }

    if once {
        let tick = engine.tick().await?;
        print_tick(&tick);
        return Ok(());
    }

    let shutdown = GracefulShutdown::new();
    shutdown.listen_for_signals();
    engine.run(&shutdown).await?;

    let stats = engine.stats().read()?;
    info!(
        "📊 Session end: cumulative profit ${} over {} sells | BNB ${}",
        stats.cumulative_profit_usd, stats.sell_trades_count, stats.bnb_converted_usd
    );
    Ok(())
}

fn print_tick(tick: &TickReport) {
    let r = &tick.reconcile;
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "🔁 Sells: {} placed, {} adopted, {} deferred, {} failed, {} closed",
        r.sells_placed, r.sells_adopted, r.sells_deferred, r.sells_failed, r.sells_closed
    );
    info!("💰 Realized from pairs: ${}", r.realized_usd());
    if let Some(fold) = &tick.fold {
        info!(
            "📒 FIFO: {} trades folded, ${} realized, {} unmatched qty",
            fold.trades, fold.realized, fold.unmatched_qty
        );
    }
    if tick.chunks_split > 0 {
        info!("✂️  Chunks split: {} (BNB bought ${})", tick.chunks_split, tick.bnb_bought_usd);
    }
    if let Some((reason, bounds)) = &tick.recentered {
        info!("🎯 Recentered ({:?}) to {}..{}", reason, bounds.low, bounds.high);
    }
    if let Some(b) = &tick.bootstrap {
        info!(
            "🪜 Bootstrap: {} placed, {} already open, {} failed, ${} committed",
            b.placed, b.already_open, b.failed, b.committed_usd
        );
    }
    if r.sells_failed > 0 {
        warn!("⚠️  {} paired sells failed and will be retried next iteration", r.sells_failed);
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
