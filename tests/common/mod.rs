// Common test utilities and helpers
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use grid_profit_engine::core::types::{OrderKind, OrderQuantity};
use grid_profit_engine::{
    Balance, Config, Exchange, MarketLimits, Order, OrderRequest, OrderStatus, Side, Ticker,
    Trade, TradeQuery, TradingError, TradingResult,
};

pub const SYMBOL: &str = "DOGE/USDT";
pub const BNB_SYMBOL: &str = "BNB/USDT";

/// Create a test configuration whose state lives under `data_dir`
pub fn create_test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.state.data_dir = data_dir.to_path_buf();
    config.recenter.enabled = false;
    config.engine.poll_interval_secs = 1;
    config
}

pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// How the next `create_order` call misbehaves
pub enum CreateFault {
    /// Rejected before reaching the book
    Reject(TradingError),
    /// Accepted by the book, but the caller sees an error (lost acknowledgement)
    LoseAck(TradingError),
}

#[derive(Default)]
struct MockState {
    price: Decimal,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    balance: Balance,
    created: Vec<OrderRequest>,
    faults: VecDeque<CreateFault>,
    limits_calls: usize,
    limits_fail: bool,
    bnb_min_notional: Decimal,
    next_id: u64,
    clock_ms: i64,
}

/// Scriptable exchange: orders and trades are pushed by the test
pub struct MockExchange {
    state: Mutex<MockState>,
    pub limits: MarketLimits,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                price: dec!(0.20),
                bnb_min_notional: dec!(5),
                next_id: 1000,
                clock_ms: 1_700_000_000_000,
                ..MockState::default()
            }),
            limits: MarketLimits {
                price_tick: dec!(0.00001),
                amount_step: dec!(1),
                min_notional: dec!(1),
            },
        }
    }

    pub fn set_price(&self, price: Decimal) {
        self.state.lock().unwrap().price = price;
    }

    pub fn set_quote_balance(&self, free: Decimal) {
        let mut state = self.state.lock().unwrap();
        state.balance.assets.entry("USDT".into()).or_default().free = free;
    }

    pub fn set_bnb_min_notional(&self, min: Decimal) {
        self.state.lock().unwrap().bnb_min_notional = min;
    }

    pub fn fail_market_limits(&self, fail: bool) {
        self.state.lock().unwrap().limits_fail = fail;
    }

    pub fn market_limits_calls(&self) -> usize {
        self.state.lock().unwrap().limits_calls
    }

    pub fn push_create_fault(&self, fault: CreateFault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    /// Requests that reached `create_order`, including failed ones
    pub fn created(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn order_by_client_id(&self, client_id: &str) -> Option<Order> {
        self.orders()
            .into_iter()
            .find(|o| o.client_order_id.as_deref() == Some(client_id))
    }

    /// Add an already filled limit order
    pub fn add_filled_order(&self, id: &str, side: Side, price: Decimal, amount: Decimal) -> Order {
        let mut state = self.state.lock().unwrap();
        state.clock_ms += 1000;
        let order = Order {
            id: id.to_string(),
            client_order_id: None,
            symbol: SYMBOL.to_string(),
            side,
            kind: OrderKind::Limit,
            price: Some(price),
            amount,
            filled: amount,
            average: Some(price),
            status: OrderStatus::Filled,
            timestamp_ms: state.clock_ms,
        };
        state.orders.push(order.clone());
        order
    }

    pub fn add_order(&self, order: Order) {
        self.state.lock().unwrap().orders.push(order);
    }

    /// Fill an open order completely at its limit price
    pub fn fill_order(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(order) = state.orders.iter_mut().find(|o| o.id == id) {
            order.status = OrderStatus::Filled;
            order.filled = order.amount;
            order.average = order.price;
        }
    }

    pub fn add_trade(&self, side: Side, price: Decimal, amount: Decimal) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.clock_ms += 1000;
        let id = state.next_id;
        let ts = state.clock_ms;
        state.trades.push(Trade {
            id,
            order_id: format!("t-order-{}", id),
            symbol: SYMBOL.to_string(),
            side,
            price,
            amount,
            fee: None,
            timestamp_ms: ts,
        });
        id
    }

    fn book_order(state: &mut MockState, request: &OrderRequest) -> Order {
        state.next_id += 1;
        state.clock_ms += 1000;
        let (amount, status, average) = match (request.kind, request.quantity) {
            (OrderKind::Market, OrderQuantity::Quote(quote)) => {
                (quote / dec!(600), OrderStatus::Filled, Some(dec!(600)))
            }
            (OrderKind::Market, OrderQuantity::Base(qty)) => (qty, OrderStatus::Filled, Some(state.price)),
            (_, OrderQuantity::Base(qty)) | (_, OrderQuantity::Quote(qty)) => (qty, OrderStatus::Open, None),
        };
        let order = Order {
            id: format!("{}", state.next_id),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            kind: request.kind,
            price: request.price,
            amount,
            filled: if status == OrderStatus::Filled { amount } else { Decimal::ZERO },
            average,
            status,
            timestamp_ms: state.clock_ms,
        };
        state.orders.push(order.clone());
        order
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_ticker(&self, symbol: &str) -> TradingResult<Ticker> {
        let price = self.state.lock().unwrap().price;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: price,
            bid: None,
            ask: None,
        })
    }

    async fn fetch_open_orders(&self, symbol: &str) -> TradingResult<Vec<Order>> {
        Ok(self
            .orders()
            .into_iter()
            .filter(|o| o.symbol == symbol && o.status == OrderStatus::Open)
            .collect())
    }

    async fn fetch_orders(&self, symbol: &str, limit: usize) -> TradingResult<Vec<Order>> {
        let orders: Vec<Order> = self.orders().into_iter().filter(|o| o.symbol == symbol).collect();
        let start = orders.len().saturating_sub(limit);
        Ok(orders[start..].to_vec())
    }

    async fn fetch_my_trades(&self, symbol: &str, query: TradeQuery) -> TradingResult<Vec<Trade>> {
        let state = self.state.lock().unwrap();
        let matching: Vec<Trade> = state
            .trades
            .iter()
            .filter(|t| t.symbol == symbol)
            .filter(|t| query.from_id.map_or(true, |from| t.id > from))
            .filter(|t| query.since_ms.map_or(true, |since| t.timestamp_ms >= since))
            .cloned()
            .collect();
        if query.from_id.is_none() && query.since_ms.is_none() {
            let start = matching.len().saturating_sub(query.limit);
            Ok(matching[start..].to_vec())
        } else {
            Ok(matching.into_iter().take(query.limit).collect())
        }
    }

    async fn create_order(&self, request: &OrderRequest) -> TradingResult<Order> {
        let mut state = self.state.lock().unwrap();
        state.created.push(request.clone());
        match state.faults.pop_front() {
            Some(CreateFault::Reject(e)) => Err(e),
            Some(CreateFault::LoseAck(e)) => {
                Self::book_order(&mut state, request);
                Err(e)
            }
            None => Ok(Self::book_order(&mut state, request)),
        }
    }

    async fn cancel_order(&self, order_id: &str, _symbol: &str) -> TradingResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                order.status = OrderStatus::Canceled;
                Ok(())
            }
            None => Err(TradingError::OrderRejected(format!("unknown order {}", order_id))),
        }
    }

    async fn fetch_balance(&self) -> TradingResult<Balance> {
        Ok(self.state.lock().unwrap().balance.clone())
    }

    async fn market_limits(&self, symbol: &str) -> TradingResult<MarketLimits> {
        let mut state = self.state.lock().unwrap();
        state.limits_calls += 1;
        if state.limits_fail {
            return Err(TradingError::ExchangeConnection("markets unavailable".into()));
        }
        if symbol == BNB_SYMBOL {
            Ok(MarketLimits {
                price_tick: dec!(0.01),
                amount_step: dec!(0.001),
                min_notional: state.bnb_min_notional,
            })
        } else {
            Ok(self.limits)
        }
    }
}
