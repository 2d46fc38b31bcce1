//! Exchange abstraction
//!
//! The engine only talks to a venue through [`Exchange`], so a live client,
//! the in-process [`PaperExchange`] and test doubles are interchangeable.

pub mod adapter;
pub mod paper;

use async_trait::async_trait;

use crate::core::types::{Balance, MarketLimits, Order, OrderRequest, Ticker, Trade, TradeQuery};
use crate::error::TradingResult;

pub use paper::PaperExchange;

/// Spot exchange operations used by the engine
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_ticker(&self, symbol: &str) -> TradingResult<Ticker>;

    async fn fetch_open_orders(&self, symbol: &str) -> TradingResult<Vec<Order>>;

    /// Most recent orders in any state, newest last
    async fn fetch_orders(&self, symbol: &str, limit: usize) -> TradingResult<Vec<Order>>;

    async fn fetch_my_trades(&self, symbol: &str, query: TradeQuery) -> TradingResult<Vec<Trade>>;

    async fn create_order(&self, request: &OrderRequest) -> TradingResult<Order>;

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> TradingResult<()>;

    async fn fetch_balance(&self) -> TradingResult<Balance>;

    async fn market_limits(&self, symbol: &str) -> TradingResult<MarketLimits>;
}
