//! Core types shared by the engine, ledger and session layers

use crate::position::PositionBook;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One side of the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Short,
    Long,
}

impl std::fmt::Display for BookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookSide::Short => write!(f, "SHORT"),
            BookSide::Long => write!(f, "LONG"),
        }
    }
}

/// When an order fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Same day's close
    Close,
    /// Open of the following trading session
    NextOpen,
}

impl Timing {
    /// Suffix used in ledger file names
    pub fn file_tag(&self) -> &'static str {
        match self {
            Timing::Close => "close",
            Timing::NextOpen => "open",
        }
    }

    pub fn from_file_tag(tag: &str) -> Option<Self> {
        match tag {
            "close" => Some(Timing::Close),
            "open" => Some(Timing::NextOpen),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timing::Close => write!(f, "CLOSE"),
            Timing::NextOpen => write!(f, "NEXT_OPEN"),
        }
    }
}

impl FromStr for Timing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "close" => Ok(Timing::Close),
            "next_open" | "nextopen" | "open" => Ok(Timing::NextOpen),
            other => Err(format!("unknown timing: {}", other)),
        }
    }
}

/// What to do when one side's exposure would exceed the asset base.
/// The combined margin cap is never waivable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginPolicy {
    /// Reject the order
    #[default]
    Forbidden,
    /// Execute and report an advisory
    Warning,
}

impl FromStr for MarginPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forbidden" | "forbid" => Ok(MarginPolicy::Forbidden),
            "warning" | "warn" => Ok(MarginPolicy::Warning),
            other => Err(format!("unknown margin policy: {}", other)),
        }
    }
}

/// Complete post-order state; the unit persisted to the ledger and undone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSnapshot {
    pub trading_date: NaiveDate,
    pub execution_price: Decimal,
    pub stock_code: String,
    pub lot_size: u64,
    pub short_lot: u32,
    pub long_lot: u32,
    /// Realized P&L of this order alone
    pub short_profit: Decimal,
    pub long_profit: Decimal,
    pub short_position: PositionBook,
    pub long_position: PositionBook,
    /// Running equity after this order
    pub assets: Decimal,
}

impl TradeSnapshot {
    pub fn realized_profit(&self) -> Decimal {
        self.short_profit + self.long_profit
    }

    pub fn position(&self, side: BookSide) -> &PositionBook {
        match side {
            BookSide::Short => &self.short_position,
            BookSide::Long => &self.long_position,
        }
    }
}
