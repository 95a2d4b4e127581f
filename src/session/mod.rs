//! Training session: the same intent executed on one book set per timing
//!
//! Every leg is an independent [`OrderEngine`] with its own ledger. Orders
//! are submitted to the legs in timing order; if a later leg fails, legs
//! that already wrote a row are undone so all ledgers stay in step.

pub mod discovery;

#[cfg(test)]
mod tests;

pub use discovery::{discover_sessions, ledger_file_name, LedgerName, ResumableSession};

use crate::config::SessionConfig;
use crate::engine::{EngineConfig, OrderEngine, OrderOutcome, OrderRequest};
use crate::error::{Result, TrainingError};
use crate::history::{resolve_row_index, undo_out_of_range, AnnotateTarget};
use crate::price::PriceSource;
use crate::types::{MarginPolicy, Timing};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{error, info, warn};

/// Parameters shared by all legs of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub code: String,
    /// First date of the loaded price data, part of the ledger file names
    pub data_start: NaiveDate,
    pub lot_size: u64,
    pub initial_assets: Decimal,
    pub margin_policy: MarginPolicy,
    pub undo_capacity: usize,
    pub timings: Vec<Timing>,
}

impl SessionOptions {
    pub fn from_config(code: impl Into<String>, data_start: NaiveDate, config: &SessionConfig) -> Self {
        Self {
            code: code.into(),
            data_start,
            lot_size: config.lot_size,
            initial_assets: config.initial_assets,
            margin_policy: config.margin_policy,
            undo_capacity: config.history_capacity,
            timings: config.timings.clone(),
        }
    }

    fn engine_config(&self, timing: Timing) -> EngineConfig {
        EngineConfig::new(self.code.clone(), timing, self.initial_assets)
            .with_policy(self.margin_policy)
            .with_undo_capacity(self.undo_capacity)
    }

    /// Timings in submission order, without duplicates
    fn ordered_timings(&self) -> Vec<Timing> {
        let mut timings = self.timings.clone();
        timings.sort();
        timings.dedup();
        timings
    }
}

pub struct TrainingSession<P> {
    options: SessionOptions,
    legs: Vec<OrderEngine<P>>,
}

impl<P: PriceSource + Clone> TrainingSession<P> {
    /// Create one fresh ledger per timing under `output_dir`
    pub fn start(
        options: SessionOptions,
        prices: P,
        output_dir: &Path,
        session_started: NaiveDateTime,
    ) -> Result<Self> {
        if options.lot_size == 0 {
            return Err(TrainingError::InvalidArgument("lot size must be positive".into()));
        }
        let timings = options.ordered_timings();
        if timings.is_empty() {
            return Err(TrainingError::InvalidArgument("no timings configured".into()));
        }

        let mut legs = Vec::with_capacity(timings.len());
        for timing in timings {
            let name = ledger_file_name(&options.code, options.data_start, session_started, timing);
            legs.push(OrderEngine::new(
                options.engine_config(timing),
                prices.clone(),
                &output_dir.join(name),
            )?);
        }
        info!(
            "Started {} session for {} with {} leg(s), lot size {}",
            session_started, options.code, legs.len(), options.lot_size
        );
        Ok(Self { options, legs })
    }

    /// Reopen every ledger of a discovered session. The lot size recorded
    /// in the ledgers wins over `options.lot_size`.
    pub fn resume(mut options: SessionOptions, prices: P, found: &ResumableSession) -> Result<Self> {
        if found.files.is_empty() {
            return Err(TrainingError::InvalidArgument(format!(
                "session {} of {} has no ledgers",
                found.session_started, found.code
            )));
        }
        options.code = found.code.clone();
        options.data_start = found.data_start;
        options.timings = found.files.keys().copied().collect();

        let mut legs = Vec::with_capacity(found.files.len());
        for (timing, path) in &found.files {
            legs.push(OrderEngine::resume(
                options.engine_config(*timing),
                prices.clone(),
                path,
            )?);
        }

        let recorded: Vec<u64> = legs
            .iter()
            .filter_map(|leg| leg.snapshot().map(|s| s.lot_size))
            .collect();
        if let Some(&lot_size) = recorded.first() {
            if recorded.iter().any(|l| *l != lot_size) {
                warn!("Legs disagree on lot size {:?}, using {}", recorded, lot_size);
            }
            options.lot_size = lot_size;
        }

        info!(
            "Resumed {} session for {} at {}",
            found.session_started, found.code, found.last_trading_date
        );
        Ok(Self { options, legs })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn code(&self) -> &str {
        &self.options.code
    }

    pub fn lot_size(&self) -> u64 {
        self.options.lot_size
    }

    pub fn legs(&self) -> &[OrderEngine<P>] {
        &self.legs
    }

    pub fn leg(&self, timing: Timing) -> Option<&OrderEngine<P>> {
        self.legs.iter().find(|leg| leg.timing() == timing)
    }

    /// Submit the same target to every leg. All legs commit or none does.
    pub fn submit_all(
        &mut self,
        date: NaiveDate,
        short_lot: u32,
        long_lot: u32,
        price_override: Option<Decimal>,
    ) -> Result<Vec<(Timing, OrderOutcome)>> {
        let mut request = OrderRequest::new(date, short_lot, long_lot, self.options.lot_size);
        if let Some(price) = price_override {
            request = request.with_price(price);
        }

        let mut outcomes = Vec::with_capacity(self.legs.len());
        for i in 0..self.legs.len() {
            match self.legs[i].submit(request) {
                Ok(outcome) => outcomes.push((self.legs[i].timing(), outcome)),
                Err(e) => {
                    self.unwind(&outcomes);
                    return Err(e);
                }
            }
        }
        Ok(outcomes)
    }

    /// Undo the legs that persisted a row for an order that failed later on
    fn unwind(&mut self, committed: &[(Timing, OrderOutcome)]) {
        for (timing, outcome) in committed {
            if !outcome.is_persisted() {
                continue;
            }
            let Some(leg) = self.legs.iter_mut().find(|leg| leg.timing() == *timing) else {
                continue;
            };
            match leg.undo(1) {
                Ok(_) => info!("Undid {} leg for {}", timing, outcome.snapshot.trading_date),
                Err(e) => error!("Failed to undo {} leg: {}", timing, e),
            }
        }
    }

    /// Undo the last `steps` orders on every leg
    pub fn undo_all(&mut self, steps: usize) -> Result<()> {
        if steps == 0 {
            return Err(TrainingError::InvalidArgument("nothing to undo (0 steps)".into()));
        }
        for leg in &self.legs {
            let rows = leg.history().row_count();
            if steps > rows {
                return Err(undo_out_of_range(steps, rows));
            }
        }
        for leg in &mut self.legs {
            leg.undo(steps)?;
        }
        Ok(())
    }

    /// Roll every leg back to row `index`
    pub fn rollback_all(&mut self, index: i64) -> Result<()> {
        for leg in &self.legs {
            resolve_row_index(index, leg.history().row_count())?;
        }
        for leg in &mut self.legs {
            leg.rollback_to(index)?;
        }
        Ok(())
    }

    /// Set the same memo on every leg; returns the row index per leg
    pub fn annotate_all(&mut self, target: AnnotateTarget, memo: &str) -> Result<Vec<(Timing, usize)>> {
        let mut written = Vec::with_capacity(self.legs.len());
        for leg in &mut self.legs {
            written.push((leg.timing(), leg.annotate(target, memo)?));
        }
        Ok(written)
    }
}
