//! Buy/sell pairing and per-pair realized profit
//!
//! Each poll fetches recent orders and advances every buy through
//! `OPEN -> FILLED -> SELL_OPEN -> SELL_FILLED`:
//!
//! - a filled buy that has not been processed gets exactly one paired sell
//!   one grid step above its average fill price;
//! - a filled sell whose parent buy is known realizes
//!   `(sell_avg - buy_avg) * min(sell_qty, buy_qty)`.
//!
//! Sell placement is guarded by a deterministic client order id
//! (`S-<buy id>`) kept in the persisted `in_flight_sells` map. A sell that
//! already exists under that id is adopted instead of being placed again.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::precision::{round_down, scale_to_min_notional};
use crate::core::recenter::GridBounds;
use crate::core::types::{
    MarketLimits, Order, OrderRequest, ProfitSourceKind, RealizedProfitEvent, Side,
};
use crate::error::TradingResult;
use crate::exchange::Exchange;
use crate::persistence::{CorruptStatePolicy, StateStore};

/// Longest client order id most spot venues accept
const MAX_CLIENT_ID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Contents of `trading_state.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    #[serde(default)]
    pub processed_buys: BTreeSet<String>,
    /// buy id -> sell id
    #[serde(default)]
    pub child_sells: BTreeMap<String, String>,
    #[serde(default)]
    pub buy_fills: BTreeMap<String, Fill>,
    #[serde(default)]
    pub sell_fills: BTreeMap<String, Fill>,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub realized_profit_usd: Decimal,
    /// Sell client order id -> unix seconds of the first placement attempt
    #[serde(default)]
    pub in_flight_sells: BTreeMap<String, i64>,
    /// Bounds chosen by the last recenter, if any
    #[serde(default)]
    pub dyn_bounds: Option<GridBounds>,
}

impl TradingState {
    /// Parent buy of a sell, by reverse lookup of `child_sells`
    pub fn parent_of(&self, sell_id: &str) -> Option<&str> {
        self.child_sells
            .iter()
            .find(|(_, child)| child.as_str() == sell_id)
            .map(|(buy, _)| buy.as_str())
    }

    fn record_pair(&mut self, buy_id: &str, sell_id: &str, buy_fill: Fill) {
        self.processed_buys.insert(buy_id.to_string());
        self.child_sells.insert(buy_id.to_string(), sell_id.to_string());
        self.buy_fills.insert(buy_id.to_string(), buy_fill);
    }
}

/// Deterministic client order id for the sell paired with `buy_id`.
///
/// Ids that are already safe and short enough map to `S-<buy id>`. Anything
/// else maps to `SH-` plus a name-based UUID of the full id, so two buys
/// never share a key.
pub fn sell_client_id(buy_id: &str) -> String {
    let safe = buy_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe && !buy_id.is_empty() && buy_id.len() + 2 <= MAX_CLIENT_ID_LEN {
        return format!("S-{}", buy_id);
    }
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, buy_id.as_bytes());
    format!("SH-{}", digest.simple())
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub symbol: String,
    pub step_pct: Decimal,
    pub fee_buffer: Decimal,
    pub orders_fetch_limit: usize,
    pub in_flight_ttl_secs: u64,
}

/// Summary of one `reconcile` pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub sells_placed: usize,
    pub sells_adopted: usize,
    /// Placements skipped because an earlier attempt is still in flight
    pub sells_deferred: usize,
    pub sells_failed: usize,
    /// Filled sells matched to a known parent buy
    pub sells_closed: u64,
    pub profit_events: Vec<RealizedProfitEvent>,
}

impl ReconcileReport {
    pub fn realized_usd(&self) -> Decimal {
        self.profit_events.iter().map(|e| e.amount_usd).sum()
    }
}

enum Placement {
    Placed,
    Adopted,
    Deferred,
    Skipped,
    Failed,
}

pub struct OrderLifecycleTracker {
    settings: TrackerSettings,
    limits: MarketLimits,
    store: StateStore<TradingState>,
    state: TradingState,
}

impl OrderLifecycleTracker {
    pub fn open(
        settings: TrackerSettings,
        limits: MarketLimits,
        path: impl Into<PathBuf>,
        policy: CorruptStatePolicy,
    ) -> TradingResult<Self> {
        let store = StateStore::new(path, policy);
        let state: TradingState = store.load()?;
        info!(
            "📒 Trading state: {} processed buys, {} sells filled, realized ${}",
            state.processed_buys.len(),
            state.sell_fills.len(),
            state.realized_profit_usd
        );
        Ok(Self {
            settings,
            limits,
            store,
            state,
        })
    }

    pub fn state(&self) -> &TradingState {
        &self.state
    }

    pub fn set_dyn_bounds(&mut self, bounds: GridBounds) -> TradingResult<()> {
        self.state.dyn_bounds = Some(bounds);
        self.store.save(&self.state)
    }

    pub async fn reconcile(&mut self, exchange: &dyn Exchange) -> TradingResult<ReconcileReport> {
        let mut orders = exchange
            .fetch_orders(&self.settings.symbol, self.settings.orders_fetch_limit)
            .await?;
        orders.sort_by(|a, b| a.timestamp_ms.cmp(&b.timestamp_ms).then_with(|| a.id.cmp(&b.id)));

        let mut report = ReconcileReport::default();
        let symbol = self.settings.symbol.clone();

        let filled_buys: Vec<&Order> = orders
            .iter()
            .filter(|o| o.is_filled(&symbol, Side::Buy))
            .filter(|o| !self.state.processed_buys.contains(&o.id))
            .collect();

        for buy in filled_buys {
            match self.handle_filled_buy(exchange, buy, &orders).await? {
                Placement::Placed => report.sells_placed += 1,
                Placement::Adopted => report.sells_adopted += 1,
                Placement::Deferred => report.sells_deferred += 1,
                Placement::Failed => report.sells_failed += 1,
                Placement::Skipped => {}
            }
        }

        let mut dirty = false;
        for sell in orders.iter().filter(|o| o.is_filled(&symbol, Side::Sell)) {
            if self.state.sell_fills.contains_key(&sell.id) {
                continue;
            }
            if let Some(event) = self.handle_filled_sell(sell, &mut report) {
                report.profit_events.push(event);
            }
            dirty = true;
        }
        if dirty {
            self.store.save(&self.state)?;
        }

        Ok(report)
    }

    async fn handle_filled_buy(
        &mut self,
        exchange: &dyn Exchange,
        buy: &Order,
        orders: &[Order],
    ) -> TradingResult<Placement> {
        let fill_price = buy.fill_price();
        let fill_amount = buy.fill_amount();
        if fill_price <= Decimal::ZERO || fill_amount <= Decimal::ZERO {
            debug!("Ignoring buy {} with empty fill", buy.id);
            return Ok(Placement::Skipped);
        }
        let buy_fill = Fill {
            price: fill_price,
            amount: fill_amount,
        };

        let key = sell_client_id(&buy.id);

        let existing = orders
            .iter()
            .find(|o| o.side == Side::Sell && o.client_order_id.as_deref() == Some(key.as_str()));
        if let Some(sell) = existing {
            info!("🔗 Adopting sell {} ({}) for buy {}", sell.id, key, buy.id);
            self.state.record_pair(&buy.id, &sell.id, buy_fill);
            self.state.in_flight_sells.remove(&key);
            self.store.save(&self.state)?;
            return Ok(Placement::Adopted);
        }

        let now = Utc::now().timestamp();
        if let Some(&started) = self.state.in_flight_sells.get(&key) {
            let age = now - started;
            if age < self.settings.in_flight_ttl_secs as i64 {
                debug!("Sell {} for buy {} still in flight ({}s)", key, buy.id, age);
                return Ok(Placement::Deferred);
            }
            warn!(
                "⚠️  Sell {} for buy {} unconfirmed after {}s, retrying placement",
                key, buy.id, age
            );
        }

        let target = round_down(
            fill_price * (Decimal::ONE + self.settings.step_pct / dec!(100)),
            self.limits.price_tick,
        );
        let qty = round_down(
            fill_amount * (Decimal::ONE - self.settings.fee_buffer),
            self.limits.amount_step,
        );
        let qty = scale_to_min_notional(
            qty,
            target,
            self.limits.min_notional,
            self.settings.fee_buffer,
            self.limits.amount_step,
        );
        if qty <= Decimal::ZERO || target <= Decimal::ZERO {
            warn!("⚠️  Buy {} rounds to an empty sell (qty {} @ {})", buy.id, qty, target);
            return Ok(Placement::Skipped);
        }

        self.state.in_flight_sells.insert(key.clone(), now);
        self.store.save(&self.state)?;

        let request = OrderRequest::limit(&self.settings.symbol, Side::Sell, qty, target)
            .with_client_id(key.clone());

        match exchange.create_order(&request).await {
            Ok(sell) => {
                info!(
                    "🔴 SELL {} @ {} for buy {} (filled {} @ {}) | id={}",
                    qty, target, buy.id, fill_amount, fill_price, sell.id
                );
                self.state.record_pair(&buy.id, &sell.id, buy_fill);
                self.state.in_flight_sells.remove(&key);
                self.store.save(&self.state)?;
                Ok(Placement::Placed)
            }
            Err(e) if e.is_fatal() => {
                error!("❌ Sell placement for buy {} failed fatally: {}", buy.id, e);
                self.state.in_flight_sells.remove(&key);
                self.store.save(&self.state)?;
                Err(e)
            }
            Err(e) if e.is_ambiguous_placement() => {
                warn!(
                    "⚠️  Sell {} for buy {} may have reached the exchange ({}), will look for it next poll",
                    key, buy.id, e
                );
                Ok(Placement::Failed)
            }
            Err(e) => {
                warn!("⚠️  Sell for buy {} failed, retrying next poll: {}", buy.id, e);
                self.state.in_flight_sells.remove(&key);
                self.store.save(&self.state)?;
                Ok(Placement::Failed)
            }
        }
    }

    fn handle_filled_sell(
        &mut self,
        sell: &Order,
        report: &mut ReconcileReport,
    ) -> Option<RealizedProfitEvent> {
        let price = sell.fill_price();
        let amount = sell.fill_amount();
        if price <= Decimal::ZERO || amount <= Decimal::ZERO {
            return None;
        }

        let parent = self.state.parent_of(&sell.id).map(str::to_string);
        let profit = match parent.as_deref().and_then(|buy_id| self.state.buy_fills.get(buy_id)) {
            Some(buy_fill) => {
                report.sells_closed += 1;
                (price - buy_fill.price) * amount.min(buy_fill.amount)
            }
            None => {
                debug!("Sell {} has no known parent buy, recording without profit", sell.id);
                Decimal::ZERO
            }
        };

        self.state
            .sell_fills
            .insert(sell.id.clone(), Fill { price, amount });

        if profit > Decimal::ZERO {
            self.state.realized_profit_usd += profit;
            info!(
                "✅ Realized +${} on sell {} (total ${})",
                profit.round_dp(6),
                sell.id,
                self.state.realized_profit_usd.round_dp(6)
            );
            Some(RealizedProfitEvent {
                amount_usd: profit,
                source: ProfitSourceKind::PairMatch,
            })
        } else {
            if parent.is_some() {
                info!("Sell {} closed without profit ({})", sell.id, profit.round_dp(6));
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sell_client_id_is_deterministic() {
        assert_eq!(sell_client_id("12345"), "S-12345");
        assert_eq!(sell_client_id("12345"), sell_client_id("12345"));
    }

    #[test]
    fn test_unsafe_or_long_ids_are_hashed() {
        let id = sell_client_id("abc/12:3 4");
        assert!(id.starts_with("SH-"));
        assert!(id.len() <= MAX_CLIENT_ID_LEN);
        assert_eq!(id, sell_client_id("abc/12:3 4"));

        let long = "x".repeat(50) + "tail";
        let id = sell_client_id(&long);
        assert!(id.starts_with("SH-"));
        assert!(id.len() <= MAX_CLIENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_distinct_buys_never_share_a_sell_id() {
        assert_ne!(sell_client_id("a/b"), sell_client_id("ab"));
        assert_ne!(sell_client_id("a b"), sell_client_id("a/b"));

        let prefix = "7".repeat(40);
        assert_ne!(sell_client_id(&format!("1{}", prefix)), sell_client_id(&format!("2{}", prefix)));
        // A raw id can never collide with a hashed one
        assert_ne!(sell_client_id("H-x"), sell_client_id("x/"));
        assert!(sell_client_id("H-x").starts_with("S-"));
    }

    #[test]
    fn test_parent_lookup() {
        let mut state = TradingState::default();
        state.child_sells.insert("b1".into(), "s1".into());
        state.child_sells.insert("b2".into(), "s2".into());
        assert_eq!(state.parent_of("s2"), Some("b2"));
        assert_eq!(state.parent_of("s3"), None);
    }

    #[test]
    fn test_old_state_files_still_load() {
        let json = r#"{
            "processed_buys": ["1"],
            "child_sells": {"1": "2"},
            "buy_fills": {"1": {"price": 0.2, "amount": 25.0}},
            "sell_fills": {},
            "realized_profit_usd": 0.0
        }"#;
        let state: TradingState = serde_json::from_str(json).unwrap();
        assert!(state.in_flight_sells.is_empty());
        assert!(state.dyn_bounds.is_none());
        assert_eq!(state.buy_fills["1"].amount, dec!(25));
    }
}
