//! Trade Training
//!
//! Paper trading practice against historical daily bars. The trader states
//! a target short and long lot count per date; the engine fills the
//! difference at the day's close or the next session's open, keeps
//! weighted-average books for both sides, gates every order on exposure
//! and margin, and writes each fill to a CSV ledger that can be undone,
//! rolled back, annotated and resumed.
//!
//! ## Architecture
//!
//! ```text
//! PriceSource (BarSeries) → OrderEngine → HistoryStore (ledger + undo)
//!                               ↑
//!              margin::classify, PositionBook (short / long)
//!
//! TrainingSession = one OrderEngine per timing (close, next open)
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod margin;
pub mod position;
pub mod price;
pub mod report;
pub mod session;
pub mod sizing;
pub mod types;

#[cfg(test)]
mod types_tests;
#[cfg(test)]
mod config_tests;

pub use engine::{EngineConfig, OrderEngine, OrderOutcome, OrderRequest};
pub use error::{Result, TrainingError};
pub use types::{BookSide, MarginPolicy, Timing, TradeSnapshot};
