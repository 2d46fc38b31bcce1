// Typed exchange boundary structs and engine events

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled: Decimal,
    pub average: Option<Decimal>,
    pub status: OrderStatus,
    pub timestamp_ms: i64,
}

impl Order {
    /// Average fill price, falling back to the limit price
    pub fn fill_price(&self) -> Decimal {
        self.average
            .filter(|p| *p > Decimal::ZERO)
            .or(self.price)
            .unwrap_or(Decimal::ZERO)
    }

    /// Exchange-reported filled amount, falling back to the order amount
    pub fn fill_amount(&self) -> Decimal {
        if self.filled > Decimal::ZERO {
            self.filled
        } else {
            self.amount
        }
    }

    pub fn is_filled(&self, symbol: &str, side: Side) -> bool {
        self.symbol == symbol && self.side == side && self.status == OrderStatus::Filled
    }
}

/// A single execution from the account's trade stream
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: u64,
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub last: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetBalance {
    pub free: Decimal,
    pub used: Decimal,
}

impl AssetBalance {
    pub fn total(&self) -> Decimal {
        self.free + self.used
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Balance {
    pub assets: HashMap<String, AssetBalance>,
}

impl Balance {
    pub fn free(&self, asset: &str) -> Decimal {
        self.assets.get(asset).map(|a| a.free).unwrap_or(Decimal::ZERO)
    }
}

/// Exchange trading rules for one symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketLimits {
    pub price_tick: Decimal,
    pub amount_step: Decimal,
    pub min_notional: Decimal,
}

/// How much to buy or sell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderQuantity {
    /// Amount of the base asset
    Base(Decimal),
    /// Amount of the quote asset to spend (market buys only)
    Quote(Decimal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: OrderQuantity,
    pub price: Option<Decimal>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: Side, amount: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            kind: OrderKind::Limit,
            quantity: OrderQuantity::Base(amount),
            price: Some(price),
            client_order_id: None,
        }
    }

    pub fn market_buy_quote(symbol: &str, quote_amount: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: Side::Buy,
            kind: OrderKind::Market,
            quantity: OrderQuantity::Quote(quote_amount),
            price: None,
            client_order_id: None,
        }
    }

    pub fn with_client_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }
}

/// Cursor for `fetch_my_trades`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeQuery {
    /// Only trades with an id strictly greater than this
    pub from_id: Option<u64>,
    /// Only trades at or after this unix time in milliseconds
    pub since_ms: Option<i64>,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfitSourceKind {
    PairMatch,
    FifoMatch,
}

/// Realized profit that is folded into the split accumulators right away
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealizedProfitEvent {
    pub amount_usd: Decimal,
    pub source: ProfitSourceKind,
}
