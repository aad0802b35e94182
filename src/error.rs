//! Error types for the exchange service

use thiserror::Error;

/// Main error type for exchange and ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Asset {asset} not found")]
    AssetNotFound { asset: String },

    #[error("Insufficient allowance for {asset}: have {have}, need {need}")]
    InsufficientAllowance {
        asset: String,
        have: u128,
        need: u128,
    },

    #[error("Insufficient balance of {asset} for {account}: have {have}, need {need}")]
    InsufficientBalance {
        asset: String,
        account: String,
        have: u128,
        need: u128,
    },

    #[error("Insufficient reserve of {asset}: have {have}, need {need}")]
    InsufficientReserve {
        asset: String,
        have: u128,
        need: u128,
    },

    #[error("Zero amount not allowed")]
    ZeroAmount,

    #[error("Arithmetic overflow on {asset}")]
    Overflow { asset: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Check if the error is the caller's fault and fixable by the caller,
    /// e.g. by raising an allowance or topping up a balance
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            ExchangeError::InsufficientAllowance { .. }
                | ExchangeError::InsufficientBalance { .. }
                | ExchangeError::InsufficientReserve { .. }
                | ExchangeError::ZeroAmount
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            ExchangeError::Overflow { .. } | ExchangeError::Internal(_)
        )
    }

    /// Short reason tag used as a metrics label
    pub fn reason(&self) -> &'static str {
        match self {
            ExchangeError::Config(_) => "config",
            ExchangeError::AssetNotFound { .. } => "asset_not_found",
            ExchangeError::InsufficientAllowance { .. } => "insufficient_allowance",
            ExchangeError::InsufficientBalance { .. } => "insufficient_balance",
            ExchangeError::InsufficientReserve { .. } => "insufficient_reserve",
            ExchangeError::ZeroAmount => "zero_amount",
            ExchangeError::Overflow { .. } => "overflow",
            ExchangeError::Internal(_) => "internal",
        }
    }
}

/// Result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;
