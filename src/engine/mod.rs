//! Order engine: turns a target lot count into fills on the two books
//!
//! Each submit runs the same pipeline:
//!
//! ```text
//! price resolution -> delta computation -> margin check -> execution -> persistence
//!        |                                      |
//!        +--> NoPriceData                       +--> MarginLimitExceeded / ExposureOverLimit
//! ```
//!
//! Books are mutated on copies and only committed once the ledger row is
//! written, so an order either fully happens or leaves no trace.


use crate::error::{Result, TrainingError};
use crate::history::{AnnotateTarget, HistoryStore, LedgerRow, DEFAULT_UNDO_CAPACITY};
use crate::margin::{self, MarginCheck, MarginVerdict};
use crate::position::{CloseOutcome, PositionBook};
use crate::price::PriceSource;
use crate::types::{BookSide, MarginPolicy, Timing, TradeSnapshot};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info, warn};

/// How many calendar days past the order date a next-open fill may look
pub const MAX_NEXT_OPEN_LOOKAHEAD: u64 = 15;

/// Fixed parameters of one engine (one ledger)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub stock_code: String,
    pub timing: Timing,
    pub margin_policy: MarginPolicy,
    /// Equity before the first order
    pub initial_assets: Decimal,
    pub undo_capacity: usize,
}

impl EngineConfig {
    pub fn new(stock_code: impl Into<String>, timing: Timing, initial_assets: Decimal) -> Self {
        Self {
            stock_code: stock_code.into(),
            timing,
            margin_policy: MarginPolicy::default(),
            initial_assets,
            undo_capacity: DEFAULT_UNDO_CAPACITY,
        }
    }

    pub fn with_policy(mut self, policy: MarginPolicy) -> Self {
        self.margin_policy = policy;
        self
    }

    pub fn with_undo_capacity(mut self, capacity: usize) -> Self {
        self.undo_capacity = capacity;
        self
    }
}

/// Target position for a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderRequest {
    pub trading_date: NaiveDate,
    pub short_lot: u32,
    pub long_lot: u32,
    /// Shares per lot
    pub lot_size: u64,
    /// Fill at this price instead of the quote. Negative values mean "use
    /// the quote".
    pub price_override: Option<Decimal>,
}

impl OrderRequest {
    pub fn new(trading_date: NaiveDate, short_lot: u32, long_lot: u32, lot_size: u64) -> Self {
        Self {
            trading_date,
            short_lot,
            long_lot,
            lot_size,
            price_override: None,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price_override = Some(price);
        self
    }

    fn override_price(&self) -> Option<Decimal> {
        self.price_override.filter(|p| *p >= Decimal::ZERO)
    }
}

/// Result of an accepted order
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub snapshot: TradeSnapshot,
    /// Session whose price was used (differs from the order date for
    /// next-open fills)
    pub execution_date: NaiveDate,
    /// Signed share changes; positive opens, negative closes
    pub short_delta: i64,
    pub long_delta: i64,
    pub margin: MarginCheck,
    /// Margin warning let through under [`MarginPolicy::Warning`]
    pub advisory: Option<String>,
    /// Ledger row written, `None` for a no-op confirmation
    pub row_index: Option<usize>,
}

impl OrderOutcome {
    pub fn is_persisted(&self) -> bool {
        self.row_index.is_some()
    }
}

/// Engine owning the two books and the ledger of one timing
pub struct OrderEngine<P> {
    config: EngineConfig,
    prices: P,
    history: HistoryStore,
    short: PositionBook,
    long: PositionBook,
    assets: Decimal,
    current: Option<TradeSnapshot>,
}

impl<P: PriceSource> OrderEngine<P> {
    /// Start a fresh session writing to `ledger_path`
    pub fn new(config: EngineConfig, prices: P, ledger_path: &Path) -> Result<Self> {
        let history = HistoryStore::create(ledger_path, config.undo_capacity)?;
        if history.row_count() > 0 {
            return Err(TrainingError::InvalidArgument(format!(
                "{} already has rows, resume it instead",
                ledger_path.display()
            )));
        }
        info!(
            "New {} session for {} at {} (assets {:.2}, policy {:?})",
            config.timing,
            config.stock_code,
            ledger_path.display(),
            config.initial_assets,
            config.margin_policy
        );
        Ok(Self {
            short: PositionBook::new(BookSide::Short),
            long: PositionBook::new(BookSide::Long),
            assets: config.initial_assets,
            current: None,
            config,
            prices,
            history,
        })
    }

    /// Continue a session from the last row of an existing ledger
    pub fn resume(config: EngineConfig, prices: P, ledger_path: &Path) -> Result<Self> {
        let (history, restored) = HistoryStore::reopen(ledger_path, config.undo_capacity)?;
        let mut engine = Self {
            short: PositionBook::new(BookSide::Short),
            long: PositionBook::new(BookSide::Long),
            assets: config.initial_assets,
            current: None,
            config,
            prices,
            history,
        };
        if let Some(snapshot) = &restored {
            if snapshot.stock_code != engine.config.stock_code {
                warn!(
                    "Ledger last traded {}, engine configured for {}",
                    snapshot.stock_code, engine.config.stock_code
                );
            }
        }
        engine.restore(restored);
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn timing(&self) -> Timing {
        self.config.timing
    }

    pub fn assets(&self) -> Decimal {
        self.assets
    }

    pub fn short_book(&self) -> &PositionBook {
        &self.short
    }

    pub fn long_book(&self) -> &PositionBook {
        &self.long
    }

    /// State after the last executed order, `None` before the first one
    pub fn snapshot(&self) -> Option<&TradeSnapshot> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn prices(&self) -> &P {
        &self.prices
    }

    /// Move both books to the requested lot counts
    pub fn submit(&mut self, request: OrderRequest) -> Result<OrderOutcome> {
        if request.lot_size == 0 {
            return Err(TrainingError::InvalidArgument("lot size must be positive".into()));
        }

        let (execution_date, price) = self.resolve_price(&request)?;

        let short_delta = delta(request.short_lot, request.lot_size, self.short.quantity())?;
        let long_delta = delta(request.long_lot, request.lot_size, self.long.quantity())?;

        let check = margin::classify(
            self.short.exposure(),
            self.long.exposure(),
            self.assets,
            notional(short_delta, price)?,
            notional(long_delta, price)?,
        )
        .ok_or_else(|| {
            TrainingError::InvalidArgument(format!(
                "exposure of {}/{} lots at {} is out of range",
                request.short_lot, request.long_lot, price
            ))
        })?;
        let advisory = self.gate(&check)?;

        let mut short = self.short;
        let mut long = self.long;
        let short_profit = apply_delta(&mut short, short_delta, price)?;
        let long_profit = apply_delta(&mut long, long_delta, price)?;

        let assets = self
            .assets
            .checked_add(short_profit)
            .and_then(|a| a.checked_add(long_profit))
            .ok_or_else(|| TrainingError::InvalidArgument(format!("assets out of range after fill at {}", price)))?;

        let snapshot = TradeSnapshot {
            trading_date: request.trading_date,
            execution_price: price,
            stock_code: self.config.stock_code.clone(),
            lot_size: request.lot_size,
            short_lot: request.short_lot,
            long_lot: request.long_lot,
            short_profit,
            long_profit,
            short_position: short,
            long_position: long,
            assets,
        };

        if short_delta == 0 && long_delta == 0 {
            debug!(
                "{} {}: position already at {}/{} lots",
                self.config.timing, request.trading_date, request.short_lot, request.long_lot
            );
            return Ok(OrderOutcome {
                snapshot,
                execution_date,
                short_delta,
                long_delta,
                margin: check,
                advisory,
                row_index: None,
            });
        }

        let memo = if execution_date == request.trading_date {
            String::new()
        } else {
            format!("filled {}", execution_date)
        };
        let row_index = self.history.record_with_memo(&snapshot, &memo)?;

        self.short = short;
        self.long = long;
        self.assets = snapshot.assets;
        self.current = Some(snapshot.clone());

        info!(
            "{} {} filled {} @ {} short {:+} long {:+} -> profit {:.2}, assets {:.2} (row {})",
            self.config.timing,
            request.trading_date,
            execution_date,
            price,
            short_delta,
            long_delta,
            snapshot.realized_profit(),
            snapshot.assets,
            row_index
        );

        Ok(OrderOutcome {
            snapshot,
            execution_date,
            short_delta,
            long_delta,
            margin: check,
            advisory,
            row_index: Some(row_index),
        })
    }

    /// Undo the last `steps` executed orders
    pub fn undo(&mut self, steps: usize) -> Result<Option<&TradeSnapshot>> {
        let restored = self.history.undo(steps)?;
        self.restore(restored);
        Ok(self.current.as_ref())
    }

    /// Keep ledger rows up to `index` (negative: counted from the end, `-1`
    /// being the row before the last) and rebuild state from that row
    pub fn rollback_to(&mut self, index: i64) -> Result<Option<&TradeSnapshot>> {
        let restored = self.history.rollback_to(index)?;
        self.restore(restored);
        Ok(self.current.as_ref())
    }

    pub fn list_recent(&self, limit: usize) -> Result<Vec<(usize, LedgerRow)>> {
        self.history.list_recent(limit)
    }

    pub fn annotate(&mut self, target: AnnotateTarget, memo: &str) -> Result<usize> {
        self.history.annotate(target, memo)
    }

    fn restore(&mut self, snapshot: Option<TradeSnapshot>) {
        match snapshot {
            Some(s) => {
                self.short = s.short_position;
                self.long = s.long_position;
                self.assets = s.assets;
                self.current = Some(s);
            }
            None => {
                self.short = PositionBook::new(BookSide::Short);
                self.long = PositionBook::new(BookSide::Long);
                self.assets = self.config.initial_assets;
                self.current = None;
            }
        }
    }

    fn resolve_price(&self, request: &OrderRequest) -> Result<(NaiveDate, Decimal)> {
        let code = self.config.stock_code.as_str();
        let quoted = match self.config.timing {
            Timing::Close => self
                .prices
                .quote_close(code, request.trading_date)
                .map(|p| (request.trading_date, p)),
            Timing::NextOpen => (1..=MAX_NEXT_OPEN_LOOKAHEAD).find_map(|offset| {
                let date = request.trading_date.checked_add_days(Days::new(offset))?;
                let price = self.prices.quote_open(code, date);
                if price.is_none() {
                    debug!("No open for {} on {}, trying next day", code, date);
                }
                price.map(|p| (date, p))
            }),
        };

        let (date, quote) = quoted.ok_or_else(|| TrainingError::NoPriceData {
            code: code.to_string(),
            date: request.trading_date,
        })?;

        match request.override_price() {
            Some(price) => {
                debug!("Overriding quote {} with {}", quote, price);
                Ok((date, price))
            }
            None => Ok((date, quote)),
        }
    }

    /// Block the order or turn the verdict into an advisory
    fn gate(&self, check: &MarginCheck) -> Result<Option<String>> {
        match (check.verdict, self.config.margin_policy) {
            (MarginVerdict::Ok, _) => Ok(None),
            (MarginVerdict::MarginLimitExceeded, _) | (_, MarginPolicy::Forbidden) => {
                let err = check.to_error().ok_or_else(|| {
                    TrainingError::Internal(format!("verdict {} without error", check.verdict))
                })?;
                Err(err)
            }
            (_, MarginPolicy::Warning) => {
                let advisory = check.advisory();
                if let Some(msg) = &advisory {
                    warn!("{}", msg);
                }
                Ok(advisory)
            }
        }
    }
}

fn delta(target_lot: u32, lot_size: u64, current: u64) -> Result<i64> {
    let target = u64::from(target_lot)
        .checked_mul(lot_size)
        .and_then(|q| i64::try_from(q).ok())
        .ok_or_else(|| {
            TrainingError::InvalidArgument(format!(
                "{} lots of {} shares is out of range",
                target_lot, lot_size
            ))
        })?;
    let current = i64::try_from(current)
        .map_err(|_| TrainingError::Internal(format!("held quantity {} out of range", current)))?;
    Ok(target - current)
}

/// Signed value of `delta` shares at `price`
fn notional(delta: i64, price: Decimal) -> Result<Decimal> {
    Decimal::from(delta).checked_mul(price).ok_or_else(|| {
        TrainingError::InvalidArgument(format!("{} shares at {} is out of range", delta, price))
    })
}

/// Open on a positive delta, close on a negative one; returns realized profit
fn apply_delta(book: &mut PositionBook, delta: i64, price: Decimal) -> Result<Decimal> {
    if delta > 0 {
        book.open(delta.unsigned_abs(), price);
        return Ok(Decimal::ZERO);
    }
    if delta == 0 {
        return Ok(Decimal::ZERO);
    }
    match book.close(delta.unsigned_abs(), price) {
        CloseOutcome::Applied { profit } => Ok(profit),
        CloseOutcome::Rejected(reason) => Err(TrainingError::Internal(format!(
            "{} close rejected: {:?}",
            book.side(),
            reason
        ))),
    }
}
