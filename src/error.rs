//! Error types for the training engine

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the order engine, ledger and helpers
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("No price data for {code} on {date} (holiday or outside the loaded range)")]
    NoPriceData { code: String, date: NaiveDate },

    #[error("Margin trading limit exceeded: short {short_exposure:.2} + long {long_exposure:.2} >= {limit:.2}")]
    MarginLimitExceeded {
        short_exposure: Decimal,
        long_exposure: Decimal,
        limit: Decimal,
    },

    #[error("{side} exposure over assets: short {short_exposure:.2}, long {long_exposure:.2}, assets {assets:.2}")]
    ExposureOverLimit {
        side: ExposureSide,
        short_exposure: Decimal,
        long_exposure: Decimal,
        assets: Decimal,
    },

    #[error("Ledger row {index} not found ({rows} rows)")]
    RowNotFound { index: i64, rows: usize },

    #[error("No ledger row traded on {date}")]
    NoRowForDate { date: NaiveDate },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Corrupt ledger row {row}: {reason}")]
    CorruptLedger { row: usize, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Which side(s) of the account went over the asset base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureSide {
    Short,
    Long,
    Both,
}

impl std::fmt::Display for ExposureSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExposureSide::Short => write!(f, "Short"),
            ExposureSide::Long => write!(f, "Long"),
            ExposureSide::Both => write!(f, "Short and long"),
        }
    }
}

impl TrainingError {
    /// Expected order outcomes the caller can retry with other inputs.
    /// Everything else is an internal fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrainingError::NoPriceData { .. }
                | TrainingError::MarginLimitExceeded { .. }
                | TrainingError::ExposureOverLimit { .. }
                | TrainingError::RowNotFound { .. }
                | TrainingError::NoRowForDate { .. }
                | TrainingError::InvalidArgument(_)
        )
    }
}

impl From<config::ConfigError> for TrainingError {
    fn from(e: config::ConfigError) -> Self {
        TrainingError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrainingError>;
