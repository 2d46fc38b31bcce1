//! FIFO inventory ledger
//!
//! Buy trades append lots to the back of the queue; sell trades consume lots
//! from the front. Each matched slice realizes
//! `(sell - buy) * qty - (buy * qty + sell * qty) * fee_rate`.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::types::Side;

/// Lots at or below this quantity are treated as empty
pub const DUST_QTY: Decimal = dec!(0.000000000001);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InventoryLot {
    #[serde(with = "rust_decimal::serde::float")]
    pub qty: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Result of matching one sell against the inventory
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SellMatch {
    pub realized: Decimal,
    pub matched: Decimal,
    /// Sell quantity with no inventory behind it, dropped
    pub unmatched: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FifoLedger {
    lots: VecDeque<InventoryLot>,
    fee_rate_each_side: Decimal,
}

impl FifoLedger {
    pub fn new(fee_rate_each_side: Decimal) -> Self {
        Self {
            lots: VecDeque::new(),
            fee_rate_each_side,
        }
    }

    pub fn from_lots(lots: Vec<InventoryLot>, fee_rate_each_side: Decimal) -> Self {
        Self {
            lots: lots.into_iter().filter(|l| l.qty > DUST_QTY).collect(),
            fee_rate_each_side,
        }
    }

    pub fn lots(&self) -> impl Iterator<Item = &InventoryLot> {
        self.lots.iter()
    }

    pub fn to_lots(&self) -> Vec<InventoryLot> {
        self.lots.iter().copied().collect()
    }

    pub fn inventory_qty(&self) -> Decimal {
        self.lots.iter().map(|l| l.qty).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn record_buy(&mut self, price: Decimal, qty: Decimal) {
        if qty > DUST_QTY && price > Decimal::ZERO {
            self.lots.push_back(InventoryLot { qty, price });
        }
    }

    pub fn record_sell(&mut self, price: Decimal, qty: Decimal) -> SellMatch {
        let mut remaining = qty;
        let mut realized = Decimal::ZERO;

        while remaining > DUST_QTY {
            let Some(lot) = self.lots.front_mut() else {
                break;
            };
            let take = remaining.min(lot.qty);
            realized += slice_profit(lot.price, price, take, self.fee_rate_each_side);
            lot.qty -= take;
            remaining -= take;
            if lot.qty <= DUST_QTY {
                self.lots.pop_front();
            }
        }

        let unmatched = remaining.max(Decimal::ZERO);
        SellMatch {
            realized,
            matched: qty - unmatched,
            unmatched,
        }
    }

    /// Fold one trade; buys return `None`
    pub fn apply(&mut self, side: Side, price: Decimal, qty: Decimal) -> Option<SellMatch> {
        match side {
            Side::Buy => {
                self.record_buy(price, qty);
                None
            }
            Side::Sell => Some(self.record_sell(price, qty)),
        }
    }
}

/// Realized profit of selling `qty` bought at `buy_price` for `sell_price`, net of both fees
pub fn slice_profit(buy_price: Decimal, sell_price: Decimal, qty: Decimal, fee_rate: Decimal) -> Decimal {
    let gross = (sell_price - buy_price) * qty;
    let fees = (buy_price * qty + sell_price * qty) * fee_rate;
    gross - fees
}
