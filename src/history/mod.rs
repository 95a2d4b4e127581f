//! Durable order history and undo
//!
//! The CSV ledger is the source of truth. A small ring buffer of recent
//! snapshots sits in front of it so undoing the last few orders does not
//! have to rebuild positions from stored averages. Entries in the buffer
//! always mirror the last `len()` ledger rows, top = last row.

pub mod ledger;


pub use ledger::{LedgerFile, LedgerRow, LEDGER_HEADER};

use crate::error::{Result, TrainingError};
use crate::types::TradeSnapshot;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::path::Path;
use tracing::info;

pub const DEFAULT_UNDO_CAPACITY: usize = 25;

/// Fixed-capacity stack of snapshots; pushing onto a full stack evicts the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct UndoStack {
    entries: VecDeque<TradeSnapshot>,
    capacity: usize,
}

impl UndoStack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: TradeSnapshot) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<TradeSnapshot> {
        self.entries.pop_back()
    }

    pub fn top(&self) -> Option<&TradeSnapshot> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Row selector for annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotateTarget {
    /// Last row traded on this date
    Date(NaiveDate),
    /// Row index, negative values counted like rollback indices
    Row(i64),
}

/// Map a possibly negative row index onto `0..rows`.
///
/// Non-negative indices are taken as is. Negative ones follow slice-end
/// semantics: `-1` selects the row before the last, `-2` the one before
/// that, and so on.
pub fn resolve_row_index(index: i64, rows: usize) -> Result<usize> {
    let resolved = if index >= 0 {
        usize::try_from(index).ok()
    } else {
        i64::try_from(rows)
            .ok()
            .and_then(|r| (r - 1).checked_add(index))
            .and_then(|r| usize::try_from(r).ok())
    };
    match resolved {
        Some(r) if r < rows => Ok(r),
        _ => Err(TrainingError::RowNotFound { index, rows }),
    }
}

/// Error for undoing `steps` rows of a ledger holding only `rows`
pub fn undo_out_of_range(steps: usize, rows: usize) -> TrainingError {
    TrainingError::RowNotFound {
        index: i64::try_from(steps).map_or(i64::MIN, |s| -s),
        rows,
    }
}

/// Ledger file plus undo cache for one book set
#[derive(Debug)]
pub struct HistoryStore {
    ledger: LedgerFile,
    undo: UndoStack,
    /// Data rows in the ledger, kept in step with every write
    rows: usize,
}

impl HistoryStore {
    /// Start (or continue appending to an empty) ledger at `path`
    pub fn create(path: &Path, undo_capacity: usize) -> Result<Self> {
        let ledger = LedgerFile::create(path)?;
        let rows = ledger.row_count()?;
        Ok(Self {
            ledger,
            undo: UndoStack::new(undo_capacity),
            rows,
        })
    }

    /// Reopen an existing ledger and rebuild the state of its last row.
    /// Returns `None` when the ledger has no rows yet.
    pub fn reopen(path: &Path, undo_capacity: usize) -> Result<(Self, Option<TradeSnapshot>)> {
        let ledger = LedgerFile::open(path)?;
        let mut rows = ledger.read_rows()?;
        let mut store = Self {
            ledger,
            undo: UndoStack::new(undo_capacity),
            rows: rows.len(),
        };
        let restored = rows.pop().map(|row| row.to_snapshot());
        if let Some(snapshot) = &restored {
            store.undo.push(snapshot.clone());
            info!(
                "Reopened {} at {} (assets {:.2})",
                path.display(),
                snapshot.trading_date,
                snapshot.assets
            );
        }
        Ok((store, restored))
    }

    pub fn ledger(&self) -> &LedgerFile {
        &self.ledger
    }

    /// Data rows written so far
    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn undo_top(&self) -> Option<&TradeSnapshot> {
        self.undo.top()
    }

    /// Persist an executed order. Returns the new row's index.
    pub fn record(&mut self, snapshot: &TradeSnapshot) -> Result<usize> {
        self.record_with_memo(snapshot, "")
    }

    /// [`HistoryStore::record`] with an initial memo on the row
    pub fn record_with_memo(&mut self, snapshot: &TradeSnapshot, memo: &str) -> Result<usize> {
        let mut row = LedgerRow::from_snapshot(snapshot);
        row.memo = memo.to_string();
        self.ledger.append(&row)?;
        let index = self.rows;
        self.rows += 1;
        self.undo.push(snapshot.clone());
        Ok(index)
    }

    /// Drop the last `steps` rows. Returns the state of the new last row,
    /// or `None` once the ledger is empty.
    pub fn undo(&mut self, steps: usize) -> Result<Option<TradeSnapshot>> {
        if steps == 0 {
            return Err(TrainingError::InvalidArgument("nothing to undo (0 steps)".into()));
        }
        let rows = self.ledger.read_rows()?;
        if steps > rows.len() {
            return Err(undo_out_of_range(steps, rows.len()));
        }
        self.truncate(rows, steps)
    }

    /// Keep rows up to and including `index` and drop the rest.
    /// See [`resolve_row_index`] for negative indices.
    pub fn rollback_to(&mut self, index: i64) -> Result<Option<TradeSnapshot>> {
        let rows = self.ledger.read_rows()?;
        let target = resolve_row_index(index, rows.len())?;
        let steps = rows.len() - (target + 1);
        if steps == 0 {
            let current = match self.undo.top() {
                Some(top) => top.clone(),
                None => rows[target].to_snapshot(),
            };
            return Ok(Some(current));
        }
        self.truncate(rows, steps)
    }

    fn truncate(&mut self, mut rows: Vec<LedgerRow>, steps: usize) -> Result<Option<TradeSnapshot>> {
        let keep = rows.len() - steps;
        rows.truncate(keep);
        self.ledger.rewrite(&rows)?;
        self.rows = keep;

        let cached = self.undo.len() > steps;
        for _ in 0..steps {
            if self.undo.pop().is_none() {
                break;
            }
        }

        let restored = match rows.last() {
            None => {
                self.undo.clear();
                None
            }
            Some(_) if cached => self.undo.top().cloned(),
            Some(last) => {
                let snapshot = last.to_snapshot();
                self.undo.push(snapshot.clone());
                Some(snapshot)
            }
        };

        info!(
            "Rolled back {} row(s) in {}, {} remain{}",
            steps,
            self.ledger.path().display(),
            keep,
            if cached { "" } else { " (rebuilt from ledger)" }
        );
        Ok(restored)
    }

    /// Most recent `limit` rows with their indices, oldest first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<(usize, LedgerRow)>> {
        let rows = self.ledger.read_rows()?;
        let start = rows.len().saturating_sub(limit);
        Ok(rows.into_iter().enumerate().skip(start).collect())
    }

    /// Set the memo of one row. Returns the row index written.
    pub fn annotate(&mut self, target: AnnotateTarget, memo: &str) -> Result<usize> {
        let mut rows = self.ledger.read_rows()?;
        let index = match target {
            AnnotateTarget::Row(i) => resolve_row_index(i, rows.len())?,
            AnnotateTarget::Date(date) => rows
                .iter()
                .rposition(|r| r.trading_date == date)
                .ok_or(TrainingError::NoRowForDate { date })?,
        };
        rows[index].memo = memo.to_string();
        self.ledger.rewrite(&rows)?;
        self.rows = rows.len();
        Ok(index)
    }
}
