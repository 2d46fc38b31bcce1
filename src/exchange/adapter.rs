//! ccxt-shaped JSON to typed boundary structs
//!
//! A live client that speaks ccxt (or a REST bridge returning the same
//! unified shapes) hands raw `serde_json::Value`s to these functions; nothing
//! past this module ever looks at an untyped map.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use crate::core::types::{
    AssetBalance, Balance, MarketLimits, Order, OrderKind, OrderQuantity, OrderRequest,
    OrderStatus, Side, Ticker, Trade,
};
use crate::error::{TradingError, TradingResult};

const DEFAULT_PRICE_TICK: Decimal = dec!(0.00001);
const DEFAULT_AMOUNT_STEP: Decimal = dec!(1);
const DEFAULT_MIN_NOTIONAL: Decimal = dec!(1);

fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let raw = n.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .ok()
        }
        Value::String(s) if !s.trim().is_empty() => {
            let s = s.trim();
            Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)).ok()
        }
        _ => None,
    }
}

fn decimal_field(data: &Value, key: &str) -> Option<Decimal> {
    data.get(key).and_then(decimal)
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required<T>(value: Option<T>, what: &str, data: &Value) -> TradingResult<T> {
    value.ok_or_else(|| TradingError::ExchangeResponse(format!("missing {} in {}", what, data)))
}

fn parse_side(data: &Value) -> TradingResult<Side> {
    match data.get("side").and_then(Value::as_str).map(str::to_ascii_lowercase).as_deref() {
        Some("buy") => Ok(Side::Buy),
        Some("sell") => Ok(Side::Sell),
        _ => Err(TradingError::ExchangeResponse(format!("unknown side in {}", data))),
    }
}

fn parse_status(raw: Option<&str>) -> OrderStatus {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("closed") | Some("filled") => OrderStatus::Filled,
        Some("canceled") | Some("cancelled") | Some("expired") | Some("rejected") => OrderStatus::Canceled,
        _ => OrderStatus::Open,
    }
}

pub fn parse_order(data: &Value) -> TradingResult<Order> {
    let id = required(string_field(data, "id"), "order id", data)?;
    let kind = match data.get("type").and_then(Value::as_str) {
        Some("market") => OrderKind::Market,
        _ => OrderKind::Limit,
    };

    Ok(Order {
        id,
        client_order_id: string_field(data, "clientOrderId"),
        symbol: string_field(data, "symbol").unwrap_or_default(),
        side: parse_side(data)?,
        kind,
        price: decimal_field(data, "price").filter(|p| *p > Decimal::ZERO),
        amount: decimal_field(data, "amount").unwrap_or(Decimal::ZERO),
        filled: decimal_field(data, "filled").unwrap_or(Decimal::ZERO),
        average: decimal_field(data, "average").filter(|p| *p > Decimal::ZERO),
        status: parse_status(data.get("status").and_then(Value::as_str)),
        timestamp_ms: data.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
    })
}

pub fn parse_orders(data: &Value) -> TradingResult<Vec<Order>> {
    data.as_array()
        .map(|items| items.iter().map(parse_order).collect())
        .unwrap_or_else(|| Err(TradingError::ExchangeResponse("expected an order list".into())))
}

pub fn parse_trade(data: &Value) -> TradingResult<Trade> {
    let raw_id = required(string_field(data, "id"), "trade id", data)?;
    let id = raw_id
        .parse::<u64>()
        .map_err(|_| TradingError::ExchangeResponse(format!("non-numeric trade id '{}'", raw_id)))?;

    Ok(Trade {
        id,
        order_id: string_field(data, "order").unwrap_or_default(),
        symbol: string_field(data, "symbol").unwrap_or_default(),
        side: parse_side(data)?,
        price: decimal_field(data, "price").unwrap_or(Decimal::ZERO),
        amount: decimal_field(data, "amount").unwrap_or(Decimal::ZERO),
        fee: data.get("fee").and_then(|f| decimal_field(f, "cost")),
        timestamp_ms: data.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
    })
}

pub fn parse_trades(data: &Value) -> TradingResult<Vec<Trade>> {
    data.as_array()
        .map(|items| items.iter().map(parse_trade).collect())
        .unwrap_or_else(|| Err(TradingError::ExchangeResponse("expected a trade list".into())))
}

pub fn parse_ticker(data: &Value) -> TradingResult<Ticker> {
    let last = decimal_field(data, "last")
        .or_else(|| decimal_field(data, "close"))
        .filter(|p| *p > Decimal::ZERO);

    Ok(Ticker {
        symbol: string_field(data, "symbol").unwrap_or_default(),
        last: required(last, "last price", data)?,
        bid: decimal_field(data, "bid"),
        ask: decimal_field(data, "ask"),
    })
}

/// ccxt balance: `{"free": {...}, "used": {...}, "total": {...}}`
pub fn parse_balance(data: &Value) -> TradingResult<Balance> {
    let free = data
        .get("free")
        .and_then(Value::as_object)
        .ok_or_else(|| TradingError::ExchangeResponse("balance without 'free' section".into()))?;

    let mut assets = HashMap::new();
    for (asset, amount) in free {
        let used = data
            .get("used")
            .and_then(|u| u.get(asset))
            .and_then(decimal)
            .unwrap_or(Decimal::ZERO);
        assets.insert(
            asset.clone(),
            AssetBalance {
                free: decimal(amount).unwrap_or(Decimal::ZERO),
                used,
            },
        );
    }
    Ok(Balance { assets })
}

/// Trading rules from a ccxt market entry, preferring the raw Binance filters
/// over the unified precision fields
pub fn parse_market_limits(market: &Value) -> MarketLimits {
    let mut price_tick = None;
    let mut amount_step = None;
    let mut min_notional = None;

    if let Some(filters) = market.pointer("/info/filters").and_then(Value::as_array) {
        for filter in filters {
            match filter.get("filterType").and_then(Value::as_str) {
                Some("PRICE_FILTER") => price_tick = decimal_field(filter, "tickSize"),
                Some("LOT_SIZE") => amount_step = decimal_field(filter, "stepSize"),
                Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                    min_notional = Some(decimal_field(filter, "minNotional").unwrap_or(DEFAULT_MIN_NOTIONAL))
                }
                _ => {}
            }
        }
    }

    let price_tick = price_tick
        .or_else(|| market.pointer("/precision/price").and_then(decimal))
        .filter(|v| *v > Decimal::ZERO)
        .unwrap_or(DEFAULT_PRICE_TICK);
    let amount_step = amount_step
        .or_else(|| market.pointer("/precision/amount").and_then(decimal))
        .filter(|v| *v > Decimal::ZERO)
        .unwrap_or(DEFAULT_AMOUNT_STEP);
    let min_notional = min_notional
        .or_else(|| market.pointer("/limits/cost/min").and_then(decimal))
        .filter(|v| *v > Decimal::ZERO)
        .unwrap_or(DEFAULT_MIN_NOTIONAL);

    MarketLimits {
        price_tick: price_tick.normalize(),
        amount_step: amount_step.normalize(),
        min_notional,
    }
}

/// Arguments for ccxt `create_order(symbol, type, side, amount, price, params)`
pub fn order_request_params(request: &OrderRequest) -> Value {
    let kind = match request.kind {
        OrderKind::Limit => "limit",
        OrderKind::Market => "market",
    };
    let side = match request.side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    };

    let mut params = serde_json::Map::new();
    if let Some(id) = &request.client_order_id {
        params.insert("newClientOrderId".into(), json!(id));
    }
    let amount = match request.quantity {
        OrderQuantity::Base(qty) => json!(qty.to_string()),
        OrderQuantity::Quote(quote) => {
            params.insert("quoteOrderQty".into(), json!(quote.to_string()));
            Value::Null
        }
    };

    json!({
        "symbol": request.symbol,
        "type": kind,
        "side": side,
        "amount": amount,
        "price": request.price.map(|p| p.to_string()),
        "params": Value::Object(params),
    })
}

/// Map a ccxt exception class name onto the engine's error taxonomy
pub fn map_exchange_error(class: &str, message: &str) -> TradingError {
    let msg = message.to_string();
    match class {
        "AuthenticationError" | "PermissionDenied" | "AccountSuspended" => {
            TradingError::ExchangeAuthentication(msg)
        }
        "RateLimitExceeded" | "DDoSProtection" => TradingError::ExchangeRateLimit(msg),
        "RequestTimeout" => TradingError::ExchangeTimeout(msg),
        "NetworkError" | "ExchangeNotAvailable" | "OnMaintenance" => TradingError::ExchangeConnection(msg),
        "InsufficientFunds" => TradingError::InsufficientBalance {
            required: Decimal::ZERO,
            available: Decimal::ZERO,
        },
        "DuplicateOrderId" => TradingError::DuplicateOrder(msg),
        "InvalidOrder" if msg.contains("NOTIONAL") || msg.contains("MIN_NOTIONAL") => {
            TradingError::BelowMinimum(msg)
        }
        "InvalidOrder" | "OrderNotFound" | "OrderImmediatelyFillable" => TradingError::OrderRejected(msg),
        _ => TradingError::ExchangeResponse(format!("{}: {}", class, msg)),
    }
}
