// Grid Profit Engine Library
//
// Order lifecycle tracking, FIFO profit reconciliation and chunked profit
// splitting for a spot grid trading bot

pub mod config;
pub mod core;
pub mod error; // Unified error handling
pub mod exchange;
pub mod persistence;

// Re-export the engine and its components
pub use core::{
    Engine, FifoLedger, GracefulShutdown, GridBounds, OrderLifecycleTracker, ProfitSplitter,
    ProfitWatcher, RecenterPolicy, SplitState, TradingState, WatcherState,
};

// Re-export boundary types
pub use core::types::{
    Balance, MarketLimits, Order, OrderRequest, OrderStatus, Side, Ticker, Trade, TradeQuery,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export configuration
pub use config::{Config, ConfigError, ProfitSource, TradingMode};

// Re-export the exchange boundary
pub use exchange::{Exchange, PaperExchange};

// Re-export persistence
pub use persistence::{CorruptStatePolicy, RuntimeStats, StateStore, StatsRecorder};
