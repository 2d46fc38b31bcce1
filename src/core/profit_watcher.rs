//! Trade-stream reconciliation
//!
//! The watcher replays the account's executions since `last_trade_id`
//! through a [`FifoLedger`]. The checkpoint and the remaining inventory are
//! written to disk before any realized profit is handed to the splitter, so
//! a crash can leave profit unsplit but never folds a trade twice.

use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::core::fifo_ledger::{FifoLedger, InventoryLot};
use crate::core::profit_splitter::{ProfitSplitter, SplitOutcome};
use crate::core::types::{Trade, TradeQuery};
use crate::error::TradingResult;
use crate::exchange::Exchange;
use crate::persistence::{CorruptStatePolicy, StateStore, StatsRecorder};

/// Contents of `profit_watcher_state.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatcherState {
    #[serde(default, deserialize_with = "trade_id_from_any")]
    pub last_trade_id: Option<u64>,
    #[serde(default)]
    pub inventory: Vec<InventoryLot>,
}

// Older checkpoints stored the id as a string
fn trade_id_from_any<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Text(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Num(id)) => Ok(Some(id)),
        Some(RawId::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawId::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Totals of one batch of folded trades
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldSummary {
    pub trades: usize,
    pub realized: Decimal,
    /// Sell trades that matched at least some inventory
    pub sell_trades: u64,
    pub unmatched_qty: Decimal,
}

impl FoldSummary {
    fn merge(&mut self, other: FoldSummary) {
        self.trades += other.trades;
        self.realized += other.realized;
        self.sell_trades += other.sell_trades;
        self.unmatched_qty += other.unmatched_qty;
    }

    pub fn is_empty(&self) -> bool {
        self.trades == 0
    }
}

pub struct ProfitWatcher {
    symbol: String,
    fetch_limit: usize,
    ledger: FifoLedger,
    last_trade_id: Option<u64>,
    store: StateStore<WatcherState>,
}

impl ProfitWatcher {
    pub fn open(
        symbol: &str,
        config: &LedgerConfig,
        path: impl Into<PathBuf>,
        policy: CorruptStatePolicy,
    ) -> TradingResult<Self> {
        let store = StateStore::new(path, policy);
        let state: WatcherState = store.load()?;
        Ok(Self {
            symbol: symbol.to_string(),
            fetch_limit: config.trades_fetch_limit.max(1),
            ledger: FifoLedger::from_lots(state.inventory, config.fee_rate_each_side),
            last_trade_id: state.last_trade_id,
            store,
        })
    }

    pub fn last_trade_id(&self) -> Option<u64> {
        self.last_trade_id
    }

    pub fn ledger(&self) -> &FifoLedger {
        &self.ledger
    }

    /// Point the checkpoint at the newest existing trade without folding history
    pub async fn bootstrap(&mut self, exchange: &dyn Exchange) -> TradingResult<Option<u64>> {
        let recent = exchange
            .fetch_my_trades(
                &self.symbol,
                TradeQuery {
                    limit: self.fetch_limit,
                    ..TradeQuery::default()
                },
            )
            .await?;

        match recent.iter().filter(|t| t.symbol == self.symbol).map(|t| t.id).max() {
            Some(id) => {
                self.last_trade_id = Some(id);
                self.persist()?;
                info!("📍 Watcher checkpoint bootstrapped at trade {}", id);
            }
            None => info!("📍 No trades yet, waiting for the first one"),
        }
        Ok(self.last_trade_id)
    }

    /// Fold every trade newer than the checkpoint
    pub async fn poll(&mut self, exchange: &dyn Exchange) -> TradingResult<FoldSummary> {
        self.drain(exchange, None).await
    }

    /// Fold trades from `since_ms` onwards (still skipping anything at or before the checkpoint)
    pub async fn backfill(&mut self, exchange: &dyn Exchange, since_ms: i64) -> TradingResult<FoldSummary> {
        info!("⏪ Backfilling trades since {}", since_ms);
        let summary = self.drain(exchange, Some(since_ms)).await?;
        info!(
            "⏪ Backfill folded {} trades, realized ${}, {} sell trades",
            summary.trades,
            summary.realized.round_dp(6),
            summary.sell_trades
        );
        Ok(summary)
    }

    async fn drain(&mut self, exchange: &dyn Exchange, since_ms: Option<i64>) -> TradingResult<FoldSummary> {
        let mut total = FoldSummary::default();
        let mut since_ms = since_ms;

        loop {
            let query = TradeQuery {
                from_id: self.last_trade_id,
                since_ms,
                limit: self.fetch_limit,
            };
            let page = exchange.fetch_my_trades(&self.symbol, query).await?;
            let fetched = page.len();
            let before = self.last_trade_id;

            let summary = self.fold(page);
            if !summary.is_empty() {
                // checkpoint first, then anything downstream
                self.persist()?;
            }
            total.merge(summary);

            if fetched < self.fetch_limit || self.last_trade_id == before {
                break;
            }
            since_ms = None;
        }

        if !total.is_empty() {
            debug!(
                "Folded {} trades: realized ${} sell_trades={} checkpoint={:?}",
                total.trades, total.realized, total.sell_trades, self.last_trade_id
            );
        }
        if total.unmatched_qty > Decimal::ZERO {
            warn!(
                "⚠️  {} sold without matching inventory, dropped from FIFO accounting",
                total.unmatched_qty
            );
        }
        Ok(total)
    }

    /// Fold a batch into the ledger and advance the checkpoint
    pub fn fold(&mut self, mut trades: Vec<Trade>) -> FoldSummary {
        trades.retain(|t| t.symbol == self.symbol);
        if let Some(last) = self.last_trade_id {
            trades.retain(|t| t.id > last);
        }
        trades.sort_by(|a, b| a.timestamp_ms.cmp(&b.timestamp_ms).then(a.id.cmp(&b.id)));

        let mut summary = FoldSummary::default();
        for trade in &trades {
            summary.trades += 1;
            self.last_trade_id = Some(self.last_trade_id.map_or(trade.id, |last| last.max(trade.id)));

            if trade.price <= Decimal::ZERO || trade.amount <= Decimal::ZERO {
                debug!("Skipping empty trade {}", trade.id);
                continue;
            }
            if let Some(matched) = self.ledger.apply(trade.side, trade.price, trade.amount) {
                summary.realized += matched.realized;
                summary.unmatched_qty += matched.unmatched;
                if matched.matched > Decimal::ZERO {
                    summary.sell_trades += 1;
                }
            }
        }
        summary
    }

    fn persist(&self) -> TradingResult<()> {
        self.store.save(&WatcherState {
            last_trade_id: self.last_trade_id,
            inventory: self.ledger.to_lots(),
        })
    }
}

/// Push a folded batch into the runtime stats and, when the splitter is fed
/// from the trade stream, into the splitter
pub async fn settle_fold(
    summary: &FoldSummary,
    exchange: &dyn Exchange,
    stats: &StatsRecorder,
    splitter: Option<&mut ProfitSplitter>,
) -> TradingResult<Option<SplitOutcome>> {
    if summary.realized.is_zero() && summary.sell_trades == 0 {
        return Ok(None);
    }

    let mut outcome = None;
    let mut bnb_total = None;
    if let Some(splitter) = splitter {
        if summary.realized > Decimal::ZERO {
            outcome = Some(splitter.handle_realized_profit(exchange, summary.realized).await?);
            bnb_total = Some(splitter.state().total_sent_to_bnb_usd);
        }
    }

    let chunks = outcome.map(|o| o.chunks).unwrap_or(0);
    stats.add_realized_profit(summary.realized, summary.sell_trades, chunks)?;
    if let Some(total) = bnb_total {
        stats.set_bnb_converted(total)?;
    }
    Ok(outcome)
}
