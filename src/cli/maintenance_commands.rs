// Maintenance commands - regrid the book and seed sells from inventory
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use grid_profit_engine::core::maintenance::{
    cancel_open_orders, is_seed_order, place_orders, plan_regrid, plan_seed_sells, PlannedOrder,
    RegridParams, SeedSellParams,
};
use grid_profit_engine::{
    Config, CorruptStatePolicy, GridBounds, StateStore, TradingResult, TradingState,
};

use crate::run_commands::open_exchange;

pub struct RegridArgs {
    pub low: Option<Decimal>,
    pub high: Option<Decimal>,
    pub step_pct: Option<Decimal>,
    pub order_usd: Option<Decimal>,
    pub cancel_only: bool,
    pub apply: bool,
}

fn print_preview(title: &str, orders: &[PlannedOrder]) {
    info!("{} ({}):", title, orders.len());
    if orders.len() <= 6 {
        for o in orders {
            info!("  {} x {}  {}", o.price, o.amount, o.client_order_id);
        }
        return;
    }
    for o in &orders[..3] {
        info!("  {} x {}  {}", o.price, o.amount, o.client_order_id);
    }
    info!("  ...");
    for o in &orders[orders.len() - 3..] {
        info!("  {} x {}  {}", o.price, o.amount, o.client_order_id);
    }
}

pub async fn regrid(config: &Config, args: RegridArgs) -> TradingResult<()> {
    let exchange = open_exchange(config)?;
    let symbol = config.exchange.symbol.as_str();

    let cancelled = cancel_open_orders(exchange.as_ref(), symbol, |_| true).await?;
    info!("🧹 Cancelled {} orders ({} failed)", cancelled.cancelled, cancelled.failed);
    if args.cancel_only {
        return Ok(());
    }

    let store: StateStore<TradingState> = StateStore::new(config.trading_state_path(), CorruptStatePolicy::Refuse);
    let mut state = store.load()?;
    let current = state
        .dyn_bounds
        .unwrap_or_else(|| GridBounds::new(config.grid.low, config.grid.high));
    let params = RegridParams {
        low: args.low.unwrap_or(current.low),
        high: args.high.unwrap_or(current.high),
        step_pct: args.step_pct.unwrap_or(config.grid.step_pct),
        order_usd: args.order_usd.unwrap_or(config.grid.base_order_usd),
        fee_buffer: config.grid.fee_buffer,
    };

    let limits = exchange.market_limits(symbol).await?;
    let last = exchange.fetch_ticker(symbol).await?.last;
    let plan = plan_regrid(&params, last, limits, Utc::now().timestamp())?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📋 {} | last {}", symbol, last);
    info!("   Range {}..{} step {}% | ${} per order | {} levels", params.low, params.high, params.step_pct, params.order_usd, plan.levels);
    info!("   {} buys, {} sells", plan.buys.len(), plan.sells.len());

    if !args.apply {
        print_preview("🟢 Buys", &plan.buys);
        print_preview("🔴 Sells", &plan.sells);
        info!("💡 Preview only, pass --apply to place these orders");
        return Ok(());
    }

    let buys = place_orders(exchange.as_ref(), symbol, &plan.buys).await?;
    let sells = place_orders(exchange.as_ref(), symbol, &plan.sells).await?;
    info!(
        "✅ Grid placed: {} buys ({} failed), {} sells ({} failed)",
        buys.placed, buys.failed, sells.placed, sells.failed
    );

    let applied = GridBounds::new(params.low, params.high);
    if applied != current {
        state.dyn_bounds = Some(applied);
        store.save(&state)?;
        info!("📌 Engine bounds set to {}..{}", applied.low, applied.high);
    }
    Ok(())
}

pub struct SeedSellArgs {
    pub levels: usize,
    pub step_pct: Decimal,
    pub lot: Decimal,
    pub dry_run: bool,
    pub cancel_seed: bool,
}

pub async fn seed_sells(config: &Config, args: SeedSellArgs) -> TradingResult<()> {
    let exchange = open_exchange(config)?;
    let symbol = config.exchange.symbol.as_str();

    if args.cancel_seed {
        let report = cancel_open_orders(exchange.as_ref(), symbol, is_seed_order).await?;
        info!("🧹 Cancelled {} seed sells ({} failed)", report.cancelled, report.failed);
        return Ok(());
    }

    let limits = exchange.market_limits(symbol).await?;
    let params = SeedSellParams {
        levels: args.levels,
        step_pct: args.step_pct,
        lot: args.lot,
    };
    let plan = plan_seed_sells(
        exchange.as_ref(),
        symbol,
        config.base_asset(),
        &params,
        limits,
        Utc::now().timestamp(),
    )
    .await?;

    info!("📋 {} last {} | free {} {}", symbol, plan.last_price, plan.free_base, config.base_asset());
    if plan.orders.is_empty() {
        info!("Nothing to place, every target sits next to an existing sell");
        return Ok(());
    }
    print_preview("🔴 Seed sells", &plan.orders);
    if args.dry_run {
        info!("💡 Dry run, nothing was sent");
        return Ok(());
    }

    let report = place_orders(exchange.as_ref(), symbol, &plan.orders).await?;
    if report.failed > 0 {
        warn!("⚠️  {} seed sells failed", report.failed);
    }
    info!("✅ Placed {} seed sells", report.placed);
    Ok(())
}
