// Initial ladder of buys below market

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

use crate::config::{Config, TradingMode};
use crate::core::grid::{levels_at_or_below, step_width};
use crate::core::precision::{round_down, scale_to_min_notional};
use crate::core::profit_splitter::ProfitSplitter;
use crate::core::recenter::GridBounds;
use crate::core::types::{MarketLimits, OrderRequest, Side};
use crate::error::TradingResult;
use crate::exchange::Exchange;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapReport {
    pub placed: usize,
    /// Levels that already hold an open buy
    pub already_open: usize,
    pub failed: usize,
    pub committed_usd: Decimal,
}

/// Client order id for the buy at ladder index `idx`
pub fn buy_client_id(idx: usize) -> String {
    format!("B-{}-{}", idx, Utc::now().timestamp_millis() % 10_000_000)
}

/// Place buys on the ladder levels at or below the last price, nearest first.
///
/// Each order spends `base_order_usd` plus whatever the reinvestment pool can
/// add, up to another `base_order_usd`. Placement stops at
/// `max_bootstrap_orders`, when `max_cycle_usd` is used up or when the free
/// quote balance runs out. Per-order failures are logged and skipped; fatal
/// errors are returned.
pub async fn bootstrap_buys(
    exchange: &dyn Exchange,
    config: &Config,
    bounds: GridBounds,
    limits: MarketLimits,
    splitter: &mut ProfitSplitter,
) -> TradingResult<BootstrapReport> {
    let symbol = config.exchange.symbol.as_str();
    let grid = &config.grid;
    let mut report = BootstrapReport::default();

    let ticker = exchange.fetch_ticker(symbol).await?;
    let price = ticker.last;
    let candidates =
        levels_at_or_below(bounds.low, bounds.high, grid.step_pct, price, grid.max_bootstrap_orders)?;
    if candidates.is_empty() {
        info!("📉 Price {} is below the grid ({}..{}), nothing to bootstrap", price, bounds.low, bounds.high);
        return Ok(report);
    }

    let mut quote_free = match config.exchange.mode {
        TradingMode::Live => exchange.fetch_balance().await?.free(&config.exchange.quote_asset),
        TradingMode::Paper => grid.max_cycle_usd,
    };
    let mut budget = grid.max_cycle_usd;

    let needed = (Decimal::from(candidates.len()) * grid.base_order_usd).min(budget);
    if quote_free < needed {
        warn!(
            "⚠️  Insufficient {} balance: {} free, need >= {}. Skipping bootstrap",
            config.exchange.quote_asset, quote_free, needed
        );
        return Ok(report);
    }

    let open_buy_prices: Vec<Decimal> = exchange
        .fetch_open_orders(symbol)
        .await?
        .into_iter()
        .filter(|o| o.side == Side::Buy)
        .filter_map(|o| o.price)
        .collect();

    for (idx, level) in candidates {
        if budget < grid.base_order_usd || quote_free < grid.base_order_usd {
            debug!("Bootstrap budget exhausted (budget {}, free {})", budget, quote_free);
            break;
        }

        let tolerance = step_width(level, grid.step_pct) / dec!(2);
        if open_buy_prices.iter().any(|p| (*p - level).abs() <= tolerance) {
            report.already_open += 1;
            continue;
        }

        let extra = splitter.pull_reinvestment(grid.base_order_usd)?;
        let usd = grid.base_order_usd + extra;

        let limit_price = round_down(level, limits.price_tick);
        let qty = round_down(usd / limit_price, limits.amount_step);
        let qty = scale_to_min_notional(qty, limit_price, limits.min_notional, grid.fee_buffer, limits.amount_step);
        if qty <= Decimal::ZERO || limit_price <= Decimal::ZERO {
            splitter.restore_reinvestment(extra)?;
            continue;
        }

        let request = OrderRequest::limit(symbol, Side::Buy, qty, limit_price).with_client_id(buy_client_id(idx));
        match exchange.create_order(&request).await {
            Ok(order) => {
                let notional = qty * limit_price;
                info!(
                    "🟢 BUY {} @ {} (${}{}) | id={}",
                    qty,
                    limit_price,
                    usd,
                    if extra > Decimal::ZERO { format!(" incl. ${} reinvested", extra) } else { String::new() },
                    order.id
                );
                report.placed += 1;
                report.committed_usd += notional;
                budget -= usd;
                quote_free -= notional;
            }
            Err(e) => {
                splitter.restore_reinvestment(extra)?;
                if e.is_fatal() {
                    error!("❌ Bootstrap stopped: {}", e);
                    return Err(e);
                }
                warn!("⚠️  Buy at level {} ({}) failed: {}", idx, limit_price, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "🪜 Bootstrapped {} buy orders (${} committed, {} levels already open, {} failed)",
        report.placed, report.committed_usd, report.already_open, report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_client_id_shape() {
        let id = buy_client_id(42);
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "B");
        assert_eq!(parts[1], "42");
        assert!(parts[2].parse::<i64>().is_ok());
        assert!(id.len() <= 36);
    }
}
