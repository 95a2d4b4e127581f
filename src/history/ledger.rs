//! CSV ledger: one header row, then one row per executed order

use crate::error::{Result, TrainingError};
use crate::position::PositionBook;
use crate::types::{BookSide, TradeSnapshot};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Column set and order every consumer of the ledger relies on
pub const LEDGER_HEADER: [&str; 12] = [
    "stock_code",
    "trading_date",
    "price",
    "lot_size",
    "short_lot",
    "short_avg_price",
    "short_profit",
    "long_lot",
    "long_avg_price",
    "long_profit",
    "assets",
    "memo",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One persisted fill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub stock_code: String,
    pub trading_date: NaiveDate,
    pub price: Decimal,
    pub lot_size: u64,
    pub short_lot: u32,
    pub short_avg_price: Decimal,
    pub short_profit: Decimal,
    pub long_lot: u32,
    pub long_avg_price: Decimal,
    pub long_profit: Decimal,
    pub assets: Decimal,
    pub memo: String,
}

impl LedgerRow {
    pub fn from_snapshot(snapshot: &TradeSnapshot) -> Self {
        Self {
            stock_code: snapshot.stock_code.clone(),
            trading_date: snapshot.trading_date,
            price: snapshot.execution_price,
            lot_size: snapshot.lot_size,
            short_lot: snapshot.short_lot,
            short_avg_price: snapshot.short_position.average_price(),
            short_profit: snapshot.short_profit,
            long_lot: snapshot.long_lot,
            long_avg_price: snapshot.long_position.average_price(),
            long_profit: snapshot.long_profit,
            assets: snapshot.assets,
            memo: String::new(),
        }
    }

    /// Rebuild live state from this row alone. Positions come back as
    /// `lot * lot_size` shares at the recorded average price.
    pub fn to_snapshot(&self) -> TradeSnapshot {
        TradeSnapshot {
            trading_date: self.trading_date,
            execution_price: self.price,
            stock_code: self.stock_code.clone(),
            lot_size: self.lot_size,
            short_lot: self.short_lot,
            long_lot: self.long_lot,
            short_profit: self.short_profit,
            long_profit: self.long_profit,
            short_position: PositionBook::from_lots(
                BookSide::Short,
                self.short_lot,
                self.lot_size,
                self.short_avg_price,
            ),
            long_position: PositionBook::from_lots(
                BookSide::Long,
                self.long_lot,
                self.lot_size,
                self.long_avg_price,
            ),
            assets: self.assets,
        }
    }

    /// Shares held short and long
    pub fn quantities(&self) -> (u64, u64) {
        (
            u64::from(self.short_lot) * self.lot_size,
            u64::from(self.long_lot) * self.lot_size,
        )
    }

    fn to_record(&self) -> [String; 12] {
        [
            self.stock_code.clone(),
            self.trading_date.format(DATE_FORMAT).to_string(),
            self.price.normalize().to_string(),
            self.lot_size.to_string(),
            self.short_lot.to_string(),
            self.short_avg_price.normalize().to_string(),
            self.short_profit.normalize().to_string(),
            self.long_lot.to_string(),
            self.long_avg_price.normalize().to_string(),
            self.long_profit.normalize().to_string(),
            self.assets.normalize().to_string(),
            self.memo.clone(),
        ]
    }

    /// `row` is the zero-based data row index, used in error messages
    fn from_record(record: &csv::StringRecord, row: usize) -> Result<Self> {
        let fields = RecordFields { record, row };
        let date_raw = fields.text(1)?;
        let trading_date =
            NaiveDate::parse_from_str(date_raw, DATE_FORMAT).map_err(|_| fields.bad(1, date_raw))?;
        let lot_raw = fields.text(3)?;
        let lot_size = match lot_raw.parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => return Err(fields.bad(3, lot_raw)),
        };

        let short_lot = fields.lots(4)?;
        let short_avg_price = fields.decimal(5)?;
        let long_lot = fields.lots(7)?;
        let long_avg_price = fields.decimal(8)?;
        fields.check_cost(4, short_lot, lot_size, short_avg_price)?;
        fields.check_cost(7, long_lot, lot_size, long_avg_price)?;

        Ok(Self {
            stock_code: fields.text(0)?.to_string(),
            trading_date,
            price: fields.decimal(2)?,
            lot_size,
            short_lot,
            short_avg_price,
            short_profit: fields.decimal(6)?,
            long_lot,
            long_avg_price,
            long_profit: fields.decimal(9)?,
            assets: fields.decimal(10)?,
            memo: record.get(11).unwrap_or("").to_string(),
        })
    }
}

struct RecordFields<'a> {
    record: &'a csv::StringRecord,
    row: usize,
}

impl<'a> RecordFields<'a> {
    fn text(&self, idx: usize) -> Result<&'a str> {
        self.record
            .get(idx)
            .map(str::trim)
            .ok_or_else(|| TrainingError::CorruptLedger {
                row: self.row,
                reason: format!("missing column '{}'", LEDGER_HEADER[idx]),
            })
    }

    fn bad(&self, idx: usize, raw: &str) -> TrainingError {
        TrainingError::CorruptLedger {
            row: self.row,
            reason: format!("bad {} '{}'", LEDGER_HEADER[idx], raw),
        }
    }

    fn decimal(&self, idx: usize) -> Result<Decimal> {
        let raw = self.text(idx)?;
        Decimal::from_str(raw).map_err(|_| self.bad(idx, raw))
    }

    fn lots(&self, idx: usize) -> Result<u32> {
        let raw = self.text(idx)?;
        raw.parse::<u32>().map_err(|_| self.bad(idx, raw))
    }

    /// The book rebuilt from these values must fit: `lots * lot_size`
    /// shares, at most `i64::MAX`, costing `avg * shares`
    fn check_cost(&self, idx: usize, lots: u32, lot_size: u64, avg: Decimal) -> Result<()> {
        let fits = u64::from(lots)
            .checked_mul(lot_size)
            .filter(|q| i64::try_from(*q).is_ok())
            .and_then(|q| avg.checked_mul(Decimal::from(q)))
            .is_some();
        if fits {
            Ok(())
        } else {
            Err(TrainingError::CorruptLedger {
                row: self.row,
                reason: format!(
                    "{} {} of {} shares at {} is out of range",
                    LEDGER_HEADER[idx], lots, lot_size, avg
                ),
            })
        }
    }
}

/// Handle on a ledger file; every call goes to disk
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    /// Open the ledger at `path`, writing the header if the file is missing
    /// or empty. Existing rows are kept.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        let ledger = Self { path };
        if empty {
            ledger.rewrite(&[])?;
        } else {
            ledger.check_header()?;
        }
        Ok(ledger)
    }

    /// Open an existing ledger, failing if it is missing or malformed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let ledger = Self { path: path.into() };
        ledger.check_header()?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_header(&self) -> Result<()> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(&self.path)?;
        let headers = rdr.headers()?;
        let matches = headers.len() == LEDGER_HEADER.len()
            && headers.iter().zip(LEDGER_HEADER).all(|(h, e)| h.trim() == e);
        if !matches {
            return Err(TrainingError::CorruptLedger {
                row: 0,
                reason: format!("unexpected header in {}", self.path.display()),
            });
        }
        Ok(())
    }

    /// Append one row and flush it
    pub fn append(&self, row: &LedgerRow) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record(row.to_record())?;
        wtr.flush()?;
        debug!("Appended {} {} to {}", row.stock_code, row.trading_date, self.path.display());
        Ok(())
    }

    pub fn read_rows(&self) -> Result<Vec<LedgerRow>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;
        rdr.records()
            .enumerate()
            .map(|(i, record)| LedgerRow::from_record(&record?, i))
            .collect()
    }

    /// Number of data rows. Rows missing the trailing memo column count too,
    /// the same as in [`LedgerFile::read_rows`].
    pub fn row_count(&self) -> Result<usize> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;
        let mut count = 0;
        for record in rdr.records() {
            record?;
            count += 1;
        }
        Ok(count)
    }

    pub fn last_row(&self) -> Result<Option<LedgerRow>> {
        Ok(self.read_rows()?.pop())
    }

    /// Replace the whole file with the header plus `rows`. Written to a
    /// sibling temp file first, then renamed over the ledger.
    pub fn rewrite(&self, rows: &[LedgerRow]) -> Result<()> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(&tmp)?;
            wtr.write_record(LEDGER_HEADER)?;
            for row in rows {
                wtr.write_record(row.to_record())?;
            }
            wtr.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
