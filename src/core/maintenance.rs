//! Operator actions outside the poll loop
//!
//! - `regrid`: cancel every open order on the pair, then preview or place a
//!   fresh ladder of buys below and sells above the last price;
//! - `seed sells`: ladder limit sells above the market out of free base
//!   inventory, tagged `SEED-` so they can be cancelled as a group.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::core::grid::generate_levels;
use crate::core::precision::{round_down, round_up, scale_to_min_notional};
use crate::core::types::{MarketLimits, Order, OrderRequest, Side};
use crate::error::{TradingError, TradingResult};
use crate::exchange::Exchange;

/// Client order id prefix of inventory sells
pub const SEED_TAG: &str = "SEED";

/// Relative distance under which a seed target counts as already covered
const SEED_NEAR_PCT: Decimal = dec!(0.05);

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub client_order_id: String,
}

impl PlannedOrder {
    fn request(&self, symbol: &str) -> OrderRequest {
        OrderRequest::limit(symbol, self.side, self.amount, self.price).with_client_id(self.client_order_id.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CancelReport {
    pub cancelled: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceReport {
    pub placed: usize,
    pub failed: usize,
}

/// Cancel every open order on `symbol` accepted by `filter`.
///
/// A failed cancel is logged and counted; fatal errors stop the sweep.
pub async fn cancel_open_orders<F>(exchange: &dyn Exchange, symbol: &str, filter: F) -> TradingResult<CancelReport>
where
    F: Fn(&Order) -> bool,
{
    let open: Vec<Order> = exchange
        .fetch_open_orders(symbol)
        .await?
        .into_iter()
        .filter(|o| filter(o))
        .collect();
    let mut report = CancelReport::default();
    if open.is_empty() {
        info!("✅ No open orders to cancel on {}", symbol);
        return Ok(report);
    }

    info!("🧹 Cancelling {} open orders on {}", open.len(), symbol);
    for order in &open {
        match exchange.cancel_order(&order.id, symbol).await {
            Ok(()) => {
                info!(
                    "  - cancelled {} ({} {} @ {})",
                    order.id,
                    order.side,
                    order.amount,
                    order.price.unwrap_or_default()
                );
                report.cancelled += 1;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("⚠️  Cancel failed for {}: {}", order.id, e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Place planned limit orders one by one, logging and skipping failures
pub async fn place_orders(exchange: &dyn Exchange, symbol: &str, orders: &[PlannedOrder]) -> TradingResult<PlaceReport> {
    let mut report = PlaceReport::default();
    for planned in orders {
        match exchange.create_order(&planned.request(symbol)).await {
            Ok(order) => {
                info!(
                    "  + {} {} @ {} | id={}",
                    planned.side, planned.amount, planned.price, order.id
                );
                report.placed += 1;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("⚠️  {} {} @ {} failed: {}", planned.side, planned.amount, planned.price, e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Parameters of a new grid laid over the current price
#[derive(Debug, Clone, PartialEq)]
pub struct RegridParams {
    pub low: Decimal,
    pub high: Decimal,
    pub step_pct: Decimal,
    pub order_usd: Decimal,
    pub fee_buffer: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegridPlan {
    pub last_price: Decimal,
    pub levels: usize,
    /// Ascending by price
    pub buys: Vec<PlannedOrder>,
    /// Ascending by price
    pub sells: Vec<PlannedOrder>,
}

/// Buys on every level below `last_price` and sells on every level above it.
/// A level exactly at the price gets neither. `stamp` keeps client ids unique
/// across repeated regrids.
pub fn plan_regrid(
    params: &RegridParams,
    last_price: Decimal,
    limits: MarketLimits,
    stamp: i64,
) -> TradingResult<RegridPlan> {
    let levels = generate_levels(params.low, params.high, params.step_pct)?;
    let mut plan = RegridPlan {
        last_price,
        levels: levels.len(),
        ..RegridPlan::default()
    };

    for level in levels {
        let (side, price) = if level < last_price {
            (Side::Buy, round_down(level, limits.price_tick))
        } else if level > last_price {
            (Side::Sell, round_up(level, limits.price_tick))
        } else {
            continue;
        };
        if price <= Decimal::ZERO {
            continue;
        }
        let amount = round_down(params.order_usd / price, limits.amount_step);
        let amount = scale_to_min_notional(amount, price, limits.min_notional, params.fee_buffer, limits.amount_step);
        if amount <= Decimal::ZERO {
            continue;
        }

        let micros = (price * dec!(1000000)).trunc();
        let (tag, bucket) = match side {
            Side::Buy => ("GB", &mut plan.buys),
            Side::Sell => ("GS", &mut plan.sells),
        };
        bucket.push(PlannedOrder {
            side,
            price,
            amount,
            client_order_id: format!("{}-{}-{}", tag, micros, stamp % 10_000_000),
        });
    }
    Ok(plan)
}

/// Parameters of an inventory sell ladder
#[derive(Debug, Clone, PartialEq)]
pub struct SeedSellParams {
    pub levels: usize,
    pub step_pct: Decimal,
    /// Base amount per sell
    pub lot: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedPlan {
    pub last_price: Decimal,
    pub free_base: Decimal,
    /// Nearest to the price first
    pub orders: Vec<PlannedOrder>,
    /// Targets dropped because an open sell already sits next to them
    pub skipped_near_existing: usize,
}

fn is_near(price: Decimal, existing: Decimal) -> bool {
    existing > Decimal::ZERO && ((price - existing).abs() / existing) * dec!(100) <= SEED_NEAR_PCT
}

/// Sells `step_pct`% apart starting one step above the last price, as many as
/// the free base balance covers in whole lots, capped at `params.levels`.
pub async fn plan_seed_sells(
    exchange: &dyn Exchange,
    symbol: &str,
    base_asset: &str,
    params: &SeedSellParams,
    limits: MarketLimits,
    stamp: i64,
) -> TradingResult<SeedPlan> {
    if params.lot <= Decimal::ZERO || params.step_pct <= Decimal::ZERO {
        return Err(TradingError::InvalidParameter(
            "lot/step_pct".into(),
            format!("must be positive, got {} / {}", params.lot, params.step_pct),
        ));
    }

    let last_price = exchange.fetch_ticker(symbol).await?.last;
    let free_base = exchange.fetch_balance().await?.free(base_asset);
    let lot = round_down(params.lot, limits.amount_step);

    let affordable = if lot > Decimal::ZERO {
        (free_base / lot).floor().to_usize().unwrap_or(0)
    } else {
        0
    };
    let count = params.levels.min(affordable);
    if count == 0 {
        return Err(TradingError::InsufficientBalance {
            required: lot,
            available: free_base,
        });
    }

    let existing: Vec<Decimal> = exchange
        .fetch_open_orders(symbol)
        .await?
        .into_iter()
        .filter(|o| o.side == Side::Sell)
        .filter_map(|o| o.price)
        .collect();

    let factor = Decimal::ONE + params.step_pct / dec!(100);
    let mut plan = SeedPlan {
        last_price,
        free_base,
        ..SeedPlan::default()
    };
    let mut target = last_price;
    for i in 1..=count {
        target *= factor;
        if existing.iter().any(|p| is_near(target, *p)) {
            info!("⏭️  Skipping {} near an existing sell", target.round_dp(8));
            plan.skipped_near_existing += 1;
            continue;
        }
        plan.orders.push(PlannedOrder {
            side: Side::Sell,
            price: round_up(target, limits.price_tick),
            amount: lot,
            client_order_id: format!("{}-{}-{}", SEED_TAG, stamp, i),
        });
    }
    Ok(plan)
}

/// Whether an order was placed by `plan_seed_sells`
pub fn is_seed_order(order: &Order) -> bool {
    order
        .client_order_id
        .as_deref()
        .is_some_and(|id| id.starts_with(SEED_TAG))
}
