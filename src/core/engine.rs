//! Poll loop owning every stateful component
//!
//! One `tick` reconciles orders, routes realized profit to the splitter,
//! evaluates the recenter policy and (re)places the bootstrap ladder when
//! needed. `run` repeats ticks until the shutdown flag is set or a fatal
//! error occurs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ProfitSource};
use crate::core::bootstrap::{bootstrap_buys, BootstrapReport};
use crate::core::order_tracker::{OrderLifecycleTracker, ReconcileReport, TrackerSettings};
use crate::core::profit_splitter::ProfitSplitter;
use crate::core::profit_watcher::{settle_fold, FoldSummary, ProfitWatcher};
use crate::core::recenter::{recenter_bounds, GridBounds, RecenterPolicy, RecenterReason};
use crate::core::shutdown::GracefulShutdown;
use crate::core::types::MarketLimits;
use crate::error::TradingResult;
use crate::exchange::Exchange;
use crate::persistence::StatsRecorder;

/// What one `tick` did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub reconcile: ReconcileReport,
    pub fold: Option<FoldSummary>,
    pub chunks_split: u64,
    pub bnb_bought_usd: Decimal,
    pub recentered: Option<(RecenterReason, GridBounds)>,
    pub bootstrap: Option<BootstrapReport>,
}

pub struct Engine {
    config: Config,
    exchange: Arc<dyn Exchange>,
    limits: MarketLimits,
    tracker: OrderLifecycleTracker,
    splitter: ProfitSplitter,
    watcher: Option<ProfitWatcher>,
    stats: StatsRecorder,
    recenter: RecenterPolicy,
    needs_bootstrap: bool,
    watcher_primed: bool,
}

impl Engine {
    /// Load all state and fetch the market limits of the traded symbol
    pub async fn new(config: Config, exchange: Arc<dyn Exchange>) -> TradingResult<Self> {
        config.validate()?;
        let policy = config.state.corrupt_policy;
        let limits = exchange.market_limits(&config.exchange.symbol).await?;
        info!(
            "📐 {} limits: tick={} step={} min_notional={}",
            config.exchange.symbol, limits.price_tick, limits.amount_step, limits.min_notional
        );

        let tracker = OrderLifecycleTracker::open(
            TrackerSettings {
                symbol: config.exchange.symbol.clone(),
                step_pct: config.grid.step_pct,
                fee_buffer: config.grid.fee_buffer,
                orders_fetch_limit: config.engine.orders_fetch_limit,
                in_flight_ttl_secs: config.engine.in_flight_ttl_secs,
            },
            limits,
            config.trading_state_path(),
            policy,
        )?;
        let splitter = ProfitSplitter::open(config.split.clone(), config.split_state_path(), policy)?;
        let watcher = match config.engine.profit_source {
            ProfitSource::Fifo => Some(ProfitWatcher::open(
                &config.exchange.symbol,
                &config.ledger,
                config.watcher_state_path(),
                policy,
            )?),
            ProfitSource::Pairs => None,
        };
        let stats = StatsRecorder::new(config.runtime_stats_path());
        let recenter = RecenterPolicy::from_config(&config.recenter);

        Ok(Self {
            config,
            exchange,
            limits,
            tracker,
            splitter,
            watcher,
            stats,
            recenter,
            needs_bootstrap: true,
            watcher_primed: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn limits(&self) -> MarketLimits {
        self.limits
    }

    pub fn tracker(&self) -> &OrderLifecycleTracker {
        &self.tracker
    }

    pub fn splitter(&self) -> &ProfitSplitter {
        &self.splitter
    }

    pub fn watcher(&self) -> Option<&ProfitWatcher> {
        self.watcher.as_ref()
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    /// Recentered bounds when present, the configured ones otherwise
    pub fn bounds(&self) -> GridBounds {
        self.tracker
            .state()
            .dyn_bounds
            .unwrap_or_else(|| GridBounds::new(self.config.grid.low, self.config.grid.high))
    }

    /// Skip the start-up ladder, e.g. when only reconciling
    pub fn skip_bootstrap(&mut self) {
        self.needs_bootstrap = false;
    }

    pub async fn tick(&mut self) -> TradingResult<TickReport> {
        let handle = Arc::clone(&self.exchange);
        let exchange = handle.as_ref();
        let mut tick = TickReport::default();

        tick.reconcile = self.tracker.reconcile(exchange).await?;

        match self.config.engine.profit_source {
            ProfitSource::Pairs => self.split_pair_profits(exchange, &mut tick).await?,
            ProfitSource::Fifo => self.poll_watcher(exchange, &mut tick).await?,
        }

        if self.config.recenter.enabled {
            self.evaluate_recenter(exchange, &mut tick).await?;
        }

        if self.needs_bootstrap {
            let bounds = self.bounds();
            match bootstrap_buys(exchange, &self.config, bounds, self.limits, &mut self.splitter).await {
                Ok(report) => {
                    self.needs_bootstrap = false;
                    tick.bootstrap = Some(report);
                }
                Err(e) if e.is_fatal() || e.is_retryable() => return Err(e),
                Err(e) => {
                    error!("❌ Bootstrap for {}..{} abandoned: {}", bounds.low, bounds.high, e);
                    self.needs_bootstrap = false;
                }
            }
        }

        Ok(tick)
    }

    async fn split_pair_profits(&mut self, exchange: &dyn Exchange, tick: &mut TickReport) -> TradingResult<()> {
        for event in &tick.reconcile.profit_events {
            let outcome = self.splitter.handle_realized_profit(exchange, event.amount_usd).await?;
            tick.chunks_split += outcome.chunks;
            tick.bnb_bought_usd += outcome.bnb_bought_usd.unwrap_or(Decimal::ZERO);
        }

        let realized = tick.reconcile.realized_usd();
        if realized > Decimal::ZERO || tick.reconcile.sells_closed > 0 {
            self.stats
                .add_realized_profit(realized, tick.reconcile.sells_closed, tick.chunks_split)?;
        }
        if !tick.reconcile.profit_events.is_empty() {
            self.stats
                .set_bnb_converted(self.splitter.state().total_sent_to_bnb_usd)?;
        }
        Ok(())
    }

    async fn poll_watcher(&mut self, exchange: &dyn Exchange, tick: &mut TickReport) -> TradingResult<()> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };

        if !self.watcher_primed {
            if watcher.last_trade_id().is_none() {
                match self.config.ledger.backfill_days {
                    Some(days) => {
                        let since_ms = Utc::now().timestamp_millis() - i64::from(days) * 24 * 60 * 60 * 1000;
                        let summary = watcher.backfill(exchange, since_ms).await?;
                        let outcome = settle_fold(&summary, exchange, &self.stats, Some(&mut self.splitter)).await?;
                        if let Some(outcome) = outcome {
                            tick.chunks_split += outcome.chunks;
                            tick.bnb_bought_usd += outcome.bnb_bought_usd.unwrap_or(Decimal::ZERO);
                        }
                    }
                    None => {
                        watcher.bootstrap(exchange).await?;
                    }
                }
            }
            self.watcher_primed = true;
        }

        let summary = watcher.poll(exchange).await?;
        let outcome = settle_fold(&summary, exchange, &self.stats, Some(&mut self.splitter)).await?;
        if let Some(outcome) = outcome {
            tick.chunks_split += outcome.chunks;
            tick.bnb_bought_usd += outcome.bnb_bought_usd.unwrap_or(Decimal::ZERO);
        }
        tick.fold = Some(summary);
        Ok(())
    }

    async fn evaluate_recenter(&mut self, exchange: &dyn Exchange, tick: &mut TickReport) -> TradingResult<()> {
        let ticker = exchange.fetch_ticker(&self.config.exchange.symbol).await?;
        let bounds = self.bounds();

        if let Some(reason) = self.recenter.evaluate(ticker.last, &bounds, Utc::now()) {
            let moved = recenter_bounds(ticker.last, &bounds);
            info!(
                "🎯 Recentering grid ({:?}) at {}: {}..{} -> {}..{}",
                reason, ticker.last, bounds.low, bounds.high, moved.low, moved.high
            );
            self.tracker.set_dyn_bounds(moved)?;
            self.recenter.reset();
            self.needs_bootstrap = true;
            tick.recentered = Some((reason, moved));
        }
        Ok(())
    }

    /// Tick every `poll_interval_secs` until shutdown or a fatal error
    pub async fn run(&mut self, shutdown: &GracefulShutdown) -> TradingResult<()> {
        let interval = Duration::from_secs(self.config.engine.poll_interval_secs);
        let bounds = self.bounds();
        info!(
            "🚀 Engine started: {} grid {}..{} step {}% | poll {}s | profit source {:?}",
            self.config.exchange.symbol,
            bounds.low,
            bounds.high,
            self.config.grid.step_pct,
            interval.as_secs(),
            self.config.engine.profit_source
        );

        loop {
            if shutdown.is_shutting_down() {
                break;
            }

            match self.tick().await {
                Ok(tick) => debug!(
                    "Tick: placed={} adopted={} deferred={} closed={} realized=${}",
                    tick.reconcile.sells_placed,
                    tick.reconcile.sells_adopted,
                    tick.reconcile.sells_deferred,
                    tick.reconcile.sells_closed,
                    tick.reconcile.realized_usd()
                ),
                Err(e) if e.is_fatal() => {
                    error!("❌ Fatal {} error, stopping: {}", e.category(), e.user_message());
                    return Err(e);
                }
                Err(e) => warn!("⚠️  Iteration skipped ({} error): {}", e.category(), e),
            }

            if shutdown.sleep(interval).await {
                break;
            }
        }

        info!("👋 Engine stopped, state persisted");
        Ok(())
    }
}
