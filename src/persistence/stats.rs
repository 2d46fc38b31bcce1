// Runtime statistics consumed by the dashboard

use std::path::PathBuf;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CorruptStatePolicy, StateStore};
use crate::error::TradingResult;

/// Contents of `runtime_stats.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStats {
    #[serde(default, with = "rust_decimal::serde::float")]
    pub cumulative_profit_usd: Decimal,
    /// Sell trades that matched inventory or closed a pair
    #[serde(default)]
    pub sell_trades_count: u64,
    /// Chunks actually produced by the profit splitter
    #[serde(default)]
    pub splits_count: u64,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub bnb_converted_usd: Decimal,
    #[serde(default)]
    pub last_update_ts: f64,
}

pub struct StatsRecorder {
    store: StateStore<RuntimeStats>,
}

impl StatsRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        // A broken stats file only affects the dashboard, so never block on it
        Self {
            store: StateStore::new(path, CorruptStatePolicy::Reset),
        }
    }

    pub fn read(&self) -> TradingResult<RuntimeStats> {
        self.store.load()
    }

    /// Additive update of the cumulative counters
    pub fn add_realized_profit(
        &self,
        profit_usd: Decimal,
        sell_trades: u64,
        splits: u64,
    ) -> TradingResult<RuntimeStats> {
        self.update(|stats| {
            stats.cumulative_profit_usd += profit_usd;
            stats.sell_trades_count += sell_trades;
            stats.splits_count += splits;
        })
    }

    /// Absolute update: the splitter's total is the source of truth
    pub fn set_bnb_converted(&self, total_usd: Decimal) -> TradingResult<RuntimeStats> {
        self.update(|stats| stats.bnb_converted_usd = total_usd)
    }

    fn update(&self, apply: impl FnOnce(&mut RuntimeStats)) -> TradingResult<RuntimeStats> {
        let mut stats = self.store.load()?;
        apply(&mut stats);
        stats.last_update_ts = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.store.save(&stats)?;
        Ok(stats)
    }
}
