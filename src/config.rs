// Configuration management for the grid profit engine

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::persistence::CorruptStatePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

/// Which reconciliation path feeds the profit splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfitSource {
    /// Per buy/sell pair, computed by the order tracker
    Pairs,
    /// FIFO replay of the trade stream, computed by the profit watcher
    Fifo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub symbol: String,
    pub quote_asset: String,
    pub mode: TradingMode,
}

/// Parameters of the in-process paper exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    pub start_price: Decimal,
    pub volatility_pct: Decimal,
    pub seed: u64,
    pub quote_balance: Decimal,
    pub price_tick: Decimal,
    pub amount_step: Decimal,
    pub min_notional: Decimal,
    pub bnb_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub low: Decimal,
    pub high: Decimal,
    pub step_pct: Decimal,
    pub base_order_usd: Decimal,
    pub max_cycle_usd: Decimal,
    pub max_bootstrap_orders: usize,
    /// Fraction shaved off sell quantities (and added to min-notional scaling)
    pub fee_buffer: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub chunk_usd: Decimal,
    /// Share of every chunk routed to the BNB pool
    pub ratio: Decimal,
    pub bnb_symbol: String,
    pub fallback_min_cost: Decimal,
    pub min_cost_cache_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub fee_rate_each_side: Decimal,
    pub trades_fetch_limit: usize,
    /// Backfill window used when the watcher starts without a checkpoint
    pub backfill_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecenterConfig {
    pub enabled: bool,
    pub edge_pct: Decimal,
    pub dwell_seconds: u64,
    pub drift_pct: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    pub orders_fetch_limit: usize,
    pub profit_source: ProfitSource,
    pub in_flight_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub data_dir: PathBuf,
    pub corrupt_policy: CorruptStatePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub paper: PaperConfig,
    pub grid: GridConfig,
    pub split: SplitConfig,
    pub ledger: LedgerConfig,
    pub recenter: RecenterConfig,
    pub engine: EngineConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                symbol: "DOGE/USDT".to_string(),
                quote_asset: "USDT".to_string(),
                mode: TradingMode::Paper,
            },
            paper: PaperConfig {
                start_price: dec!(0.20),
                volatility_pct: dec!(0.5),
                seed: 42,
                quote_balance: dec!(100),
                price_tick: dec!(0.00001),
                amount_step: dec!(1),
                min_notional: dec!(1),
                bnb_price: dec!(600),
            },
            grid: GridConfig {
                low: dec!(0.13),
                high: dec!(0.32),
                step_pct: dec!(1.0),
                base_order_usd: dec!(5.0),
                max_cycle_usd: dec!(40.0),
                max_bootstrap_orders: 7,
                fee_buffer: dec!(0.001),
            },
            split: SplitConfig {
                chunk_usd: dec!(4.0),
                ratio: dec!(0.5),
                bnb_symbol: "BNB/USDT".to_string(),
                fallback_min_cost: dec!(10.0),
                min_cost_cache_secs: 60,
            },
            ledger: LedgerConfig {
                fee_rate_each_side: dec!(0.001),
                trades_fetch_limit: 500,
                backfill_days: None,
            },
            recenter: RecenterConfig {
                enabled: true,
                edge_pct: dec!(10),
                dwell_seconds: 600,
                drift_pct: None,
            },
            engine: EngineConfig {
                poll_interval_secs: 7,
                orders_fetch_limit: 50,
                profit_source: ProfitSource::Pairs,
                in_flight_ttl_secs: 120,
            },
            state: StateConfig {
                data_dir: PathBuf::from("data"),
                corrupt_policy: CorruptStatePolicy::Quarantine,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                with_target: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Apply `GRID_BOT_*` environment overrides on top of the file values
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("GRID_BOT_PAIR") {
            self.exchange.symbol = v;
        }
        if let Some(v) = env_var("GRID_BOT_MODE") {
            self.exchange.mode = match v.to_ascii_lowercase().as_str() {
                "live" => TradingMode::Live,
                "paper" => TradingMode::Paper,
                other => {
                    return Err(ConfigError::Validation(format!(
                        "GRID_BOT_MODE must be live or paper, got '{}'",
                        other
                    )))
                }
            };
        }
        override_decimal("GRID_BOT_GRID_LOW", &mut self.grid.low)?;
        override_decimal("GRID_BOT_GRID_HIGH", &mut self.grid.high)?;
        override_decimal("GRID_BOT_STEP_PCT", &mut self.grid.step_pct)?;
        override_decimal("GRID_BOT_BASE_ORDER_USD", &mut self.grid.base_order_usd)?;
        override_decimal("GRID_BOT_MAX_CYCLE_USD", &mut self.grid.max_cycle_usd)?;
        override_decimal("GRID_BOT_FEE_BUFFER", &mut self.grid.fee_buffer)?;
        override_decimal("GRID_BOT_SPLIT_CHUNK_USD", &mut self.split.chunk_usd)?;
        override_decimal("GRID_BOT_SPLIT_RATIO", &mut self.split.ratio)?;
        override_decimal("GRID_BOT_FEE_RATE_EACH_SIDE", &mut self.ledger.fee_rate_each_side)?;
        if let Some(v) = env_var("GRID_BOT_BNB_SYMBOL") {
            self.split.bnb_symbol = v;
        }
        if let Some(v) = env_var("GRID_BOT_POLL_SECONDS") {
            self.engine.poll_interval_secs = v
                .parse()
                .map_err(|_| ConfigError::Validation(format!("GRID_BOT_POLL_SECONDS: '{}'", v)))?;
        }
        if let Some(v) = env_var("GRID_BOT_DATA_DIR") {
            self.state.data_dir = PathBuf::from(v);
        }
        self.validate()
    }

    pub fn trading_state_path(&self) -> PathBuf {
        self.state.data_dir.join("trading_state.json")
    }

    pub fn split_state_path(&self) -> PathBuf {
        self.state.data_dir.join("split_state.json")
    }

    pub fn watcher_state_path(&self) -> PathBuf {
        self.state.data_dir.join("profit_watcher_state.json")
    }

    pub fn runtime_stats_path(&self) -> PathBuf {
        self.state.data_dir.join("runtime_stats.json")
    }

    /// Base asset of the traded pair, e.g. `DOGE` for `DOGE/USDT`
    pub fn base_asset(&self) -> &str {
        self.exchange
            .symbol
            .split_once('/')
            .map(|(base, _)| base)
            .unwrap_or(&self.exchange.symbol)
    }

    pub fn paper_state_path(&self) -> PathBuf {
        self.state.data_dir.join("paper_exchange.json")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.low <= Decimal::ZERO {
            return Err(ConfigError::Validation("grid.low must be positive".to_string()));
        }

        if self.grid.high <= self.grid.low {
            return Err(ConfigError::Validation("grid.high must be greater than grid.low".to_string()));
        }

        if self.grid.step_pct <= Decimal::ZERO {
            return Err(ConfigError::Validation("grid.step_pct must be positive".to_string()));
        }

        if self.grid.base_order_usd <= Decimal::ZERO {
            return Err(ConfigError::Validation("grid.base_order_usd must be positive".to_string()));
        }

        if self.grid.fee_buffer < Decimal::ZERO || self.grid.fee_buffer >= Decimal::ONE {
            return Err(ConfigError::Validation("grid.fee_buffer must be in [0, 1)".to_string()));
        }

        if self.split.chunk_usd <= Decimal::ZERO {
            return Err(ConfigError::Validation("split.chunk_usd must be positive".to_string()));
        }

        if self.split.ratio < Decimal::ZERO || self.split.ratio > Decimal::ONE {
            return Err(ConfigError::Validation("split.ratio must be between 0 and 1".to_string()));
        }

        if self.ledger.fee_rate_each_side < Decimal::ZERO {
            return Err(ConfigError::Validation("ledger.fee_rate_each_side must be non-negative".to_string()));
        }

        if self.recenter.edge_pct < Decimal::ZERO || self.recenter.edge_pct >= dec!(50) {
            return Err(ConfigError::Validation("recenter.edge_pct must be in [0, 50)".to_string()));
        }

        if self.engine.poll_interval_secs == 0 {
            return Err(ConfigError::Validation("engine.poll_interval_secs must be greater than 0".to_string()));
        }

        if self.exchange.symbol.trim().is_empty() {
            return Err(ConfigError::Validation("exchange.symbol must not be empty".to_string()));
        }

        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn override_decimal(key: &str, target: &mut Decimal) -> Result<(), ConfigError> {
    if let Some(raw) = env_var(key) {
        *target = Decimal::from_str(&raw)
            .map_err(|e| ConfigError::Validation(format!("{}: '{}' ({})", key, raw, e)))?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid.low, dec!(0.13));
        assert_eq!(config.grid.high, dec!(0.32));
        assert_eq!(config.split.chunk_usd, dec!(4.0));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut config = Config::default();
        config.grid.high = dec!(0.10);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_bad_split_ratio() {
        let mut config = Config::default();
        config.split.ratio = dec!(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_paths_live_under_data_dir() {
        let mut config = Config::default();
        config.state.data_dir = PathBuf::from("/tmp/bot");
        assert_eq!(config.split_state_path(), PathBuf::from("/tmp/bot/split_state.json"));
        assert_eq!(config.paper_state_path(), PathBuf::from("/tmp/bot/paper_exchange.json"));
        assert_eq!(config.base_asset(), "DOGE");
        assert_eq!(config.runtime_stats_path(), PathBuf::from("/tmp/bot/runtime_stats.json"));
    }
}
