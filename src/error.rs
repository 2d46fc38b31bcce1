//! Unified error handling for the grid profit engine
//!
//! Every fallible operation in the crate returns `TradingResult<T>`. The
//! poll loop uses `is_retryable()` and `is_fatal()` to decide whether an
//! iteration is skipped or the process stops.

use std::io;

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum TradingError {
    // Configuration errors
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),
    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    // Exchange errors
    #[error("Exchange connection error: {0}")]
    ExchangeConnection(String),
    #[error("Exchange authentication failed: {0}")]
    ExchangeAuthentication(String),
    #[error("Exchange rate limit exceeded: {0}")]
    ExchangeRateLimit(String),
    #[error("Exchange timeout: {0}")]
    ExchangeTimeout(String),
    #[error("Exchange response error: {0}")]
    ExchangeResponse(String),

    // Order errors
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },
    #[error("Order below exchange minimum: {0}")]
    BelowMinimum(String),
    #[error("Order rejected: {0}")]
    OrderRejected(String),
    #[error("Duplicate client order id: {0}")]
    DuplicateOrder(String),

    // Validation errors
    #[error("Invalid parameter '{0}': {1}")]
    InvalidParameter(String, String),

    // State errors
    #[error("State file is corrupt: {0}")]
    StateCorrupt(String),
    #[error("State file read error: {0}")]
    StateRead(String),
    #[error("State file write error: {0}")]
    StateWrite(String),
    #[error("State lock error: {0}")]
    StateLock(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradingError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: grid-bot init\n\
                    2. Edit config.toml with your grid bounds\n\
                    3. Try again",
                    path
                )
            }
            TradingError::ConfigValidation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check config.toml for:\n\
                    - grid.low < grid.high, both positive\n\
                    - split.ratio between 0 and 1\n\
                    - positive chunk and order sizes",
                    msg
                )
            }
            TradingError::ExchangeAuthentication(msg) => {
                format!(
                    "Exchange authentication failed: {}\n\n\
                    💡 Check:\n\
                    - API key and secret are correct\n\
                    - Keys have spot trading permission\n\
                    - The configured region matches the account",
                    msg
                )
            }
            TradingError::InsufficientBalance { required, available } => {
                format!(
                    "Insufficient balance for order\n\
                    Required: {:.2}\n\
                    Available: {:.2}\n\n\
                    💡 Either:\n\
                    - Top up the quote asset balance\n\
                    - Lower grid.base_order_usd or grid.max_cycle_usd",
                    required, available
                )
            }
            TradingError::StateCorrupt(msg) => {
                format!(
                    "State file is corrupt: {}\n\n\
                    💡 The engine refused to start so no accumulator is lost.\n\
                    1. Inspect or restore the file from a backup\n\
                    2. Or set state.corrupt_policy = \"quarantine\" to move it aside",
                    msg
                )
            }
            TradingError::ExchangeRateLimit(msg) => {
                format!(
                    "Exchange rate limit exceeded: {}\n\n\
                    💡 Increase engine.poll_interval_secs",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Transient errors: skip this iteration and try again next poll
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradingError::ExchangeTimeout(_)
                | TradingError::ExchangeConnection(_)
                | TradingError::ExchangeRateLimit(_)
                | TradingError::ExchangeResponse(_)
        )
    }

    /// Errors that must terminate the poll loop instead of spinning
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TradingError::ExchangeAuthentication(_)
                | TradingError::StateCorrupt(_)
                | TradingError::ConfigNotFound(_)
                | TradingError::ConfigParse(_)
                | TradingError::ConfigValidation(_)
        )
    }

    /// Whether an order placement may have reached the exchange despite the error
    pub fn is_ambiguous_placement(&self) -> bool {
        matches!(
            self,
            TradingError::ExchangeTimeout(_)
                | TradingError::ExchangeConnection(_)
                | TradingError::DuplicateOrder(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::ConfigNotFound(_)
            | TradingError::ConfigParse(_)
            | TradingError::ConfigValidation(_) => "config",

            TradingError::ExchangeConnection(_)
            | TradingError::ExchangeAuthentication(_)
            | TradingError::ExchangeRateLimit(_)
            | TradingError::ExchangeTimeout(_)
            | TradingError::ExchangeResponse(_) => "exchange",

            TradingError::InsufficientBalance { .. }
            | TradingError::BelowMinimum(_)
            | TradingError::OrderRejected(_)
            | TradingError::DuplicateOrder(_) => "order",

            TradingError::InvalidParameter(_, _) => "validation",

            TradingError::StateCorrupt(_)
            | TradingError::StateRead(_)
            | TradingError::StateWrite(_)
            | TradingError::StateLock(_) => "state",

            TradingError::Internal(_) => "internal",
        }
    }
}

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TradingError::ExchangeTimeout(err.to_string()),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                TradingError::ExchangeConnection(err.to_string())
            }
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                TradingError::StateRead(err.to_string())
            }
            _ => TradingError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::StateCorrupt(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<crate::config::ConfigError> for TradingError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileRead(msg) => TradingError::ConfigNotFound(msg),
            ConfigError::FileWrite(msg) => TradingError::Internal(msg),
            ConfigError::Parse(msg) | ConfigError::Serialize(msg) => TradingError::ConfigParse(msg),
            ConfigError::Validation(msg) => TradingError::ConfigValidation(msg),
        }
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = TradingError::ConfigNotFound("config.toml".to_string());
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(TradingError::ConfigValidation("x".into()).category(), "config");
        assert_eq!(TradingError::ExchangeTimeout("x".into()).category(), "exchange");
        assert_eq!(TradingError::BelowMinimum("x".into()).category(), "order");
        assert_eq!(TradingError::StateCorrupt("x".into()).category(), "state");
    }

    #[test]
    fn test_retryable_and_fatal() {
        let timeout = TradingError::ExchangeTimeout("slow".into());
        assert!(timeout.is_retryable());
        assert!(!timeout.is_fatal());

        let auth = TradingError::ExchangeAuthentication("bad key".into());
        assert!(!auth.is_retryable());
        assert!(auth.is_fatal());

        let funds = TradingError::InsufficientBalance {
            required: dec!(5),
            available: dec!(1),
        };
        assert!(!funds.is_retryable());
        assert!(!funds.is_fatal());
    }

    #[test]
    fn test_ambiguous_placement() {
        assert!(TradingError::ExchangeTimeout("t".into()).is_ambiguous_placement());
        assert!(TradingError::DuplicateOrder("S-1".into()).is_ambiguous_placement());
        assert!(!TradingError::OrderRejected("no".into()).is_ambiguous_placement());
    }

    #[test]
    fn test_user_message() {
        let err = TradingError::InsufficientBalance {
            required: dec!(100),
            available: dec!(50),
        };
        let msg = err.user_message();
        assert!(msg.contains("100.00"));
        assert!(msg.contains("50.00"));
        assert!(msg.contains("💡"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "test");
        let trading_err: TradingError = io_err.into();
        assert!(matches!(trading_err, TradingError::ExchangeTimeout(_)));
    }
}
