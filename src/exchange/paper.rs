// Paper Exchange
// In-process spot venue: seeded random-walk prices, limit orders that fill
// when the walk crosses them, quote-sized market buys and tracked balances

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Exchange;
use crate::config::Config;
use crate::core::precision::round_down;
use crate::core::types::{
    AssetBalance, Balance, MarketLimits, Order, OrderKind, OrderQuantity, OrderRequest,
    OrderStatus, Side, Ticker, Trade, TradeQuery,
};
use crate::error::{TradingError, TradingResult};
use crate::persistence::{CorruptStatePolicy, StateStore};

/// Operation a scripted fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperOp {
    Any,
    FetchTicker,
    FetchOrders,
    FetchTrades,
    CreateOrder,
    CancelOrder,
    FetchBalance,
    MarketLimits,
}

/// Contents of `paper_exchange.json`: counters that continue across sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperCounters {
    #[serde(default)]
    pub next_trade_id: u64,
    #[serde(default)]
    pub clock_ms: i64,
}

#[derive(Debug, Clone)]
struct PaperMarket {
    price: Decimal,
    limits: MarketLimits,
}

struct PaperBook {
    rng: StdRng,
    volatility: Decimal,
    markets: HashMap<String, PaperMarket>,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    balances: HashMap<String, AssetBalance>,
    next_trade_id: u64,
    clock_ms: i64,
    faults: VecDeque<(PaperOp, TradingError)>,
    counters: Option<StateStore<PaperCounters>>,
}

pub struct PaperExchange {
    primary: String,
    book: Mutex<PaperBook>,
}

fn split_symbol(symbol: &str) -> (&str, &str) {
    symbol.split_once('/').unwrap_or((symbol, "USDT"))
}

impl PaperExchange {
    pub fn new(symbol: &str, start_price: Decimal, limits: MarketLimits, seed: u64) -> Self {
        let mut markets = HashMap::new();
        markets.insert(
            symbol.to_string(),
            PaperMarket {
                price: start_price,
                limits,
            },
        );
        Self {
            primary: symbol.to_string(),
            book: Mutex::new(PaperBook {
                rng: StdRng::seed_from_u64(seed),
                volatility: Decimal::ZERO,
                markets,
                orders: Vec::new(),
                trades: Vec::new(),
                balances: HashMap::new(),
                next_trade_id: 1,
                clock_ms: Utc::now().timestamp_millis(),
                faults: VecDeque::new(),
                counters: None,
            }),
        }
    }

    /// Paper venue for the configured pair plus the BNB pair used by the splitter
    pub fn from_config(config: &Config) -> TradingResult<Self> {
        let paper = &config.paper;
        let exchange = Self::new(
            &config.exchange.symbol,
            paper.start_price,
            MarketLimits {
                price_tick: paper.price_tick,
                amount_step: paper.amount_step,
                min_notional: paper.min_notional,
            },
            paper.seed,
        )
        .with_volatility_pct(paper.volatility_pct)
        .with_balance(&config.exchange.quote_asset, paper.quote_balance);

        let exchange = if config.split.bnb_symbol != config.exchange.symbol {
            exchange.with_market(
                &config.split.bnb_symbol,
                paper.bnb_price,
                MarketLimits {
                    price_tick: dec!(0.01),
                    amount_step: dec!(0.001),
                    min_notional: dec!(5),
                },
            )
        } else {
            exchange
        };
        exchange.with_counters_file(config.paper_state_path())
    }

    /// Continue trade ids and the clock from `path`, saving them after every fill
    pub fn with_counters_file(mut self, path: impl Into<PathBuf>) -> TradingResult<Self> {
        let store = StateStore::new(path, CorruptStatePolicy::Reset);
        let saved: PaperCounters = store.load()?;
        let book = self.book.get_mut();
        book.next_trade_id = book.next_trade_id.max(saved.next_trade_id);
        book.clock_ms = book.clock_ms.max(saved.clock_ms);
        if saved.next_trade_id > 1 {
            info!("🧪 Paper trade ids continue from {}", book.next_trade_id);
        }
        book.counters = Some(store);
        Ok(self)
    }

    pub fn with_volatility_pct(mut self, pct: Decimal) -> Self {
        self.book.get_mut().volatility = pct / dec!(100);
        self
    }

    pub fn with_balance(mut self, asset: &str, free: Decimal) -> Self {
        self.book
            .get_mut()
            .balances
            .entry(asset.to_string())
            .or_default()
            .free = free;
        self
    }

    pub fn with_market(mut self, symbol: &str, price: Decimal, limits: MarketLimits) -> Self {
        self.book
            .get_mut()
            .markets
            .insert(symbol.to_string(), PaperMarket { price, limits });
        self
    }

    /// Fail the next call of `op` with `error`
    pub async fn inject_fault(&self, op: PaperOp, error: TradingError) {
        self.book.lock().await.faults.push_back((op, error));
    }

    /// Move a market to `price` and fill every limit order it crosses
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        let mut book = self.book.lock().await;
        if let Some(market) = book.markets.get_mut(symbol) {
            market.price = price;
        }
        book.match_orders(symbol);
    }

    pub async fn price(&self, symbol: &str) -> Option<Decimal> {
        self.book.lock().await.markets.get(symbol).map(|m| m.price)
    }

    /// One random-walk step on the primary pair
    pub async fn step(&self) -> Decimal {
        let mut book = self.book.lock().await;
        book.walk(&self.primary)
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.book.lock().await.orders.clone()
    }

    pub async fn trades(&self) -> Vec<Trade> {
        self.book.lock().await.trades.clone()
    }
}

impl PaperBook {
    fn take_fault(&mut self, op: PaperOp) -> TradingResult<()> {
        let hit = self
            .faults
            .iter()
            .position(|(target, _)| *target == op || *target == PaperOp::Any);
        match hit.and_then(|idx| self.faults.remove(idx)) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }

    fn tick_clock(&mut self) -> i64 {
        self.clock_ms += 1;
        self.clock_ms
    }

    fn market(&self, symbol: &str) -> TradingResult<&PaperMarket> {
        self.markets
            .get(symbol)
            .ok_or_else(|| TradingError::ExchangeResponse(format!("unknown market {}", symbol)))
    }

    fn walk(&mut self, symbol: &str) -> Decimal {
        let shock: f64 = self.rng.gen_range(-1.0..=1.0);
        let shock = Decimal::from_f64(shock).unwrap_or(Decimal::ZERO);
        let volatility = self.volatility;
        let Some(market) = self.markets.get_mut(symbol) else {
            return Decimal::ZERO;
        };
        let moved = market.price * (Decimal::ONE + volatility * shock);
        market.price = round_down(moved, market.limits.price_tick).max(market.limits.price_tick);
        let price = market.price;
        self.match_orders(symbol);
        price
    }

    fn match_orders(&mut self, symbol: &str) {
        let Some(price) = self.markets.get(symbol).map(|m| m.price) else {
            return;
        };
        let crossing: Vec<usize> = self
            .orders
            .iter()
            .enumerate()
            .filter(|(_, o)| o.symbol == symbol && o.status == OrderStatus::Open)
            .filter(|(_, o)| match (o.side, o.price) {
                (Side::Buy, Some(limit)) => price <= limit,
                (Side::Sell, Some(limit)) => price >= limit,
                _ => false,
            })
            .map(|(idx, _)| idx)
            .collect();

        for idx in crossing {
            let (side, amount, limit) = {
                let o = &self.orders[idx];
                (o.side, o.amount, o.price.unwrap_or(price))
            };
            self.settle_fill(symbol, side, amount, limit, true);
            let ts = self.tick_clock();
            let order_id = self.orders[idx].id.clone();
            let order = &mut self.orders[idx];
            order.status = OrderStatus::Filled;
            order.filled = amount;
            order.average = Some(limit);
            self.record_trade(&order_id, symbol, side, limit, amount, ts);
            debug!("Paper fill {} {} {} @ {}", side, amount, symbol, limit);
        }
    }

    /// Move balances for a fill; `reserved` means the cost was locked at placement
    fn settle_fill(&mut self, symbol: &str, side: Side, amount: Decimal, price: Decimal, reserved: bool) {
        let (base, quote) = split_symbol(symbol);
        let notional = amount * price;
        match side {
            Side::Buy => {
                let q = self.balances.entry(quote.to_string()).or_default();
                if reserved {
                    q.used -= notional;
                } else {
                    q.free -= notional;
                }
                self.balances.entry(base.to_string()).or_default().free += amount;
            }
            Side::Sell => {
                let b = self.balances.entry(base.to_string()).or_default();
                if reserved {
                    b.used -= amount;
                } else {
                    b.free -= amount;
                }
                self.balances.entry(quote.to_string()).or_default().free += notional;
            }
        }
    }

    fn record_trade(&mut self, order_id: &str, symbol: &str, side: Side, price: Decimal, amount: Decimal, ts: i64) {
        let id = self.next_trade_id;
        self.next_trade_id += 1;
        self.trades.push(Trade {
            id,
            order_id: order_id.to_string(),
            symbol: symbol.to_string(),
            side,
            price,
            amount,
            fee: None,
            timestamp_ms: ts,
        });
        self.persist_counters();
    }

    fn persist_counters(&self) {
        let Some(store) = &self.counters else {
            return;
        };
        let snapshot = PaperCounters {
            next_trade_id: self.next_trade_id,
            clock_ms: self.clock_ms,
        };
        if let Err(e) = store.save(&snapshot) {
            warn!("⚠️  Could not save paper counters: {}", e);
        }
    }

    fn free(&self, asset: &str) -> Decimal {
        self.balances.get(asset).map(|b| b.free).unwrap_or(Decimal::ZERO)
    }

    fn place(&mut self, request: &OrderRequest) -> TradingResult<Order> {
        let market = self.market(&request.symbol)?.clone();
        if let Some(cid) = &request.client_order_id {
            if self.orders.iter().any(|o| o.client_order_id.as_deref() == Some(cid.as_str())) {
                return Err(TradingError::DuplicateOrder(cid.clone()));
            }
        }
        let (base, quote) = split_symbol(&request.symbol);

        let (amount, price) = match (request.kind, request.quantity) {
            (OrderKind::Limit, OrderQuantity::Base(qty)) => {
                let price = request
                    .price
                    .ok_or_else(|| TradingError::OrderRejected("limit order without price".into()))?;
                (qty, price)
            }
            (OrderKind::Market, OrderQuantity::Quote(spend)) => {
                (round_down(spend / market.price, market.limits.amount_step), market.price)
            }
            (OrderKind::Market, OrderQuantity::Base(qty)) => (qty, market.price),
            (OrderKind::Limit, OrderQuantity::Quote(_)) => {
                return Err(TradingError::OrderRejected("quote-sized limit orders are not supported".into()))
            }
        };

        if amount <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(TradingError::OrderRejected(format!("empty order {} @ {}", amount, price)));
        }
        let notional = amount * price;
        if notional < market.limits.min_notional {
            return Err(TradingError::BelowMinimum(format!(
                "{} notional {} < {}",
                request.symbol, notional, market.limits.min_notional
            )));
        }
        let (asset, needed) = match request.side {
            Side::Buy => (quote, notional),
            Side::Sell => (base, amount),
        };
        let available = self.free(asset);
        if available < needed {
            return Err(TradingError::InsufficientBalance {
                required: needed,
                available,
            });
        }

        let ts = self.tick_clock();
        let mut order = Order {
            id: Uuid::new_v4().simple().to_string(),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            kind: request.kind,
            price: request.price,
            amount,
            filled: Decimal::ZERO,
            average: None,
            status: OrderStatus::Open,
            timestamp_ms: ts,
        };

        match request.kind {
            OrderKind::Market => {
                self.settle_fill(&request.symbol, request.side, amount, price, false);
                order.status = OrderStatus::Filled;
                order.filled = amount;
                order.average = Some(price);
                self.record_trade(&order.id, &request.symbol, request.side, price, amount, ts);
                self.orders.push(order.clone());
            }
            OrderKind::Limit => {
                let balance = self.balances.entry(asset.to_string()).or_default();
                balance.free -= needed;
                balance.used += needed;
                self.orders.push(order.clone());
                self.match_orders(&request.symbol);
                if let Some(latest) = self.orders.iter().find(|o| o.id == order.id) {
                    order = latest.clone();
                }
            }
        }
        Ok(order)
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn fetch_ticker(&self, symbol: &str) -> TradingResult<Ticker> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::FetchTicker)?;
        let market = book.market(symbol)?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: market.price,
            bid: Some(market.price - market.limits.price_tick),
            ask: Some(market.price + market.limits.price_tick),
        })
    }

    async fn fetch_open_orders(&self, symbol: &str) -> TradingResult<Vec<Order>> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::FetchOrders)?;
        Ok(book
            .orders
            .iter()
            .filter(|o| o.symbol == symbol && o.status == OrderStatus::Open)
            .cloned()
            .collect())
    }

    /// Each call is one poll: the primary pair takes a random-walk step first
    async fn fetch_orders(&self, symbol: &str, limit: usize) -> TradingResult<Vec<Order>> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::FetchOrders)?;
        if book.volatility > Decimal::ZERO {
            book.walk(&self.primary);
        }
        let matching: Vec<Order> = book.orders.iter().filter(|o| o.symbol == symbol).cloned().collect();
        let start = matching.len().saturating_sub(limit);
        Ok(matching[start..].to_vec())
    }

    async fn fetch_my_trades(&self, symbol: &str, query: TradeQuery) -> TradingResult<Vec<Trade>> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::FetchTrades)?;
        let matching: Vec<Trade> = book
            .trades
            .iter()
            .filter(|t| t.symbol == symbol)
            .filter(|t| query.from_id.map_or(true, |from| t.id > from))
            .filter(|t| query.since_ms.map_or(true, |since| t.timestamp_ms >= since))
            .cloned()
            .collect();

        let limit = query.limit.max(1);
        if query.from_id.is_none() && query.since_ms.is_none() {
            let start = matching.len().saturating_sub(limit);
            Ok(matching[start..].to_vec())
        } else {
            Ok(matching.into_iter().take(limit).collect())
        }
    }

    async fn create_order(&self, request: &OrderRequest) -> TradingResult<Order> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::CreateOrder)?;
        book.place(request)
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> TradingResult<()> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::CancelOrder)?;
        let (base, quote) = split_symbol(symbol);
        let Some(order) = book
            .orders
            .iter_mut()
            .find(|o| o.id == order_id && o.symbol == symbol && o.status == OrderStatus::Open)
        else {
            return Err(TradingError::OrderRejected(format!("no open order {}", order_id)));
        };
        order.status = OrderStatus::Canceled;
        let (asset, reserved) = match order.side {
            Side::Buy => (quote, order.amount * order.price.unwrap_or(Decimal::ZERO)),
            Side::Sell => (base, order.amount),
        };
        let balance = book.balances.entry(asset.to_string()).or_default();
        balance.used -= reserved;
        balance.free += reserved;
        Ok(())
    }

    async fn fetch_balance(&self) -> TradingResult<Balance> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::FetchBalance)?;
        Ok(Balance {
            assets: book.balances.clone(),
        })
    }

    async fn market_limits(&self, symbol: &str) -> TradingResult<MarketLimits> {
        let mut book = self.book.lock().await;
        book.take_fault(PaperOp::MarketLimits)?;
        Ok(book.market(symbol)?.limits)
    }
}
