// Order lifecycle and profit reconciliation

pub mod bootstrap;
pub mod engine;
pub mod fifo_ledger;
pub mod grid;
pub mod maintenance;
pub mod order_tracker;
pub mod precision;
pub mod profit_splitter;
pub mod profit_watcher;
pub mod recenter;
pub mod shutdown;
pub mod types;

// Re-export commonly used types
pub use engine::{Engine, TickReport};
pub use fifo_ledger::{FifoLedger, InventoryLot, SellMatch};
pub use grid::{active_buy_window, generate_levels, levels_at_or_below};
pub use order_tracker::{OrderLifecycleTracker, ReconcileReport, TradingState};
pub use profit_splitter::{ProfitSplitter, SplitOutcome, SplitState};
pub use profit_watcher::{ProfitWatcher, WatcherState};
pub use recenter::{recenter_bounds, GridBounds, RecenterPolicy};
pub use shutdown::GracefulShutdown;
