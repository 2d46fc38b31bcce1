//! Chunked profit splitting
//!
//! Realized profit accumulates until it forms whole chunks of
//! `split.chunk_usd`. Each chunk is divided between a BNB pool and a
//! reinvestment pool by `split.ratio`. The BNB pool is spent with one
//! quote-sized market buy as soon as it covers the exchange minimum cost of
//! the BNB pair. The reinvestment pool is drained by the buy-placement path
//! through [`ProfitSplitter::pull_reinvestment`].

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SplitConfig;
use crate::core::types::OrderRequest;
use crate::error::TradingResult;
use crate::exchange::Exchange;
use crate::persistence::{CorruptStatePolicy, StateStore};

/// Contents of `split_state.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitState {
    /// Profit not yet forming a whole chunk; always below the chunk size
    #[serde(default, with = "rust_decimal::serde::float")]
    pub split_accumulator_usd: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub bnb_pending_usd: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub reinvest_pool_usd: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub total_sent_to_bnb_usd: Decimal,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub total_reinvested_usd: Decimal,
    #[serde(default)]
    pub last_update_ts: f64,
}

/// What a single `handle_realized_profit` call did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SplitOutcome {
    pub chunks: u64,
    /// Quote amount spent on BNB, when a purchase went through
    pub bnb_bought_usd: Option<Decimal>,
}

pub struct ProfitSplitter {
    config: SplitConfig,
    store: StateStore<SplitState>,
    state: SplitState,
    min_cost_cache: Option<(Decimal, Instant)>,
}

impl ProfitSplitter {
    /// Load the split state from `path`, starting from zero when it is absent
    pub fn open(
        config: SplitConfig,
        path: impl Into<PathBuf>,
        policy: CorruptStatePolicy,
    ) -> TradingResult<Self> {
        let store = StateStore::new(path, policy);
        let state: SplitState = store.load()?;
        debug!(
            "Split state: acc=${} bnb_pending=${} reinvest_pool=${}",
            state.split_accumulator_usd, state.bnb_pending_usd, state.reinvest_pool_usd
        );
        Ok(Self {
            config,
            store,
            state,
            min_cost_cache: None,
        })
    }

    pub fn state(&self) -> &SplitState {
        &self.state
    }

    pub async fn handle_realized_profit(
        &mut self,
        exchange: &dyn Exchange,
        profit_usd: Decimal,
    ) -> TradingResult<SplitOutcome> {
        if profit_usd <= Decimal::ZERO {
            return Ok(SplitOutcome::default());
        }

        let chunk = self.config.chunk_usd;
        self.state.split_accumulator_usd += profit_usd;

        let whole = (self.state.split_accumulator_usd / chunk).floor();
        let chunks = whole.to_u64().unwrap_or(0);
        if chunks > 0 {
            let remainder = self.state.split_accumulator_usd - whole * chunk;
            let to_bnb = chunk * self.config.ratio;
            let to_reinvest = chunk - to_bnb;
            self.state.bnb_pending_usd += to_bnb * whole;
            self.state.reinvest_pool_usd += to_reinvest * whole;
            self.state.split_accumulator_usd = remainder;
            info!(
                "💰 Split {} chunk(s) of ${}: bnb_pending=${} reinvest_pool=${} acc=${}",
                chunks,
                chunk,
                self.state.bnb_pending_usd,
                self.state.reinvest_pool_usd,
                self.state.split_accumulator_usd
            );
        }

        let bnb_bought_usd = self.try_buy_bnb(exchange).await;
        self.persist()?;

        Ok(SplitOutcome {
            chunks,
            bnb_bought_usd,
        })
    }

    async fn try_buy_bnb(&mut self, exchange: &dyn Exchange) -> Option<Decimal> {
        let pending = self.state.bnb_pending_usd;
        if pending <= Decimal::ZERO {
            return None;
        }
        let min_cost = self.min_order_cost(exchange).await;
        if pending < min_cost {
            debug!("BNB pending ${} below min cost ${}", pending, min_cost);
            return None;
        }

        let request = OrderRequest::market_buy_quote(&self.config.bnb_symbol, pending)
            .with_client_id(format!("SPLITBNB-{}", Utc::now().timestamp()));

        match exchange.create_order(&request).await {
            Ok(order) => {
                self.state.total_sent_to_bnb_usd += pending;
                self.state.bnb_pending_usd = Decimal::ZERO;
                info!(
                    "🟡 Bought {} for ${} (order {}, total sent ${})",
                    self.config.bnb_symbol, pending, order.id, self.state.total_sent_to_bnb_usd
                );
                Some(pending)
            }
            Err(e) => {
                warn!(
                    "⚠️  BNB purchase of ${} failed, keeping it pending: {}",
                    pending, e
                );
                None
            }
        }
    }

    /// Minimum order cost of the BNB pair, cached for `min_cost_cache_secs`
    async fn min_order_cost(&mut self, exchange: &dyn Exchange) -> Decimal {
        let ttl = Duration::from_secs(self.config.min_cost_cache_secs);
        if let Some((cost, fetched_at)) = self.min_cost_cache {
            if fetched_at.elapsed() < ttl {
                return cost;
            }
        }

        match exchange.market_limits(&self.config.bnb_symbol).await {
            Ok(limits) if limits.min_notional > Decimal::ZERO => {
                self.min_cost_cache = Some((limits.min_notional, Instant::now()));
                limits.min_notional
            }
            Ok(_) => self.config.fallback_min_cost,
            Err(e) => {
                warn!(
                    "⚠️  Could not fetch min cost for {}, using ${}: {}",
                    self.config.bnb_symbol, self.config.fallback_min_cost, e
                );
                self.config.fallback_min_cost
            }
        }
    }

    /// Take up to `max_usd` out of the reinvestment pool
    pub fn pull_reinvestment(&mut self, max_usd: Decimal) -> TradingResult<Decimal> {
        if max_usd <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        let take = self.state.reinvest_pool_usd.min(max_usd);
        if take > Decimal::ZERO {
            self.state.reinvest_pool_usd -= take;
            self.state.total_reinvested_usd += take;
            self.persist()?;
            debug!("Pulled ${} from reinvest pool (left ${})", take, self.state.reinvest_pool_usd);
        }
        Ok(take.max(Decimal::ZERO))
    }

    /// Give back a pulled amount whose order never got placed
    pub fn restore_reinvestment(&mut self, amount_usd: Decimal) -> TradingResult<()> {
        if amount_usd <= Decimal::ZERO {
            return Ok(());
        }
        self.state.reinvest_pool_usd += amount_usd;
        self.state.total_reinvested_usd -= amount_usd;
        self.persist()
    }

    fn persist(&mut self) -> TradingResult<()> {
        self.state.last_update_ts = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.store.save(&self.state)
    }
}
