//! Daily price bars and the quote interface the engine consumes

use crate::error::{Result, TrainingError};
use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use tracing::{debug, info};

/// Open and close quotes for a stock on a calendar date.
/// `None` means the market has no bar for that date.
pub trait PriceSource {
    fn quote_open(&self, code: &str, date: NaiveDate) -> Option<Decimal>;
    fn quote_close(&self, code: &str, date: NaiveDate) -> Option<Decimal>;
}

impl<P: PriceSource + ?Sized> PriceSource for &P {
    fn quote_open(&self, code: &str, date: NaiveDate) -> Option<Decimal> {
        (**self).quote_open(code, date)
    }

    fn quote_close(&self, code: &str, date: NaiveDate) -> Option<Decimal> {
        (**self).quote_close(code, date)
    }
}

impl<P: PriceSource + ?Sized> PriceSource for std::rc::Rc<P> {
    fn quote_open(&self, code: &str, date: NaiveDate) -> Option<Decimal> {
        (**self).quote_open(code, date)
    }

    fn quote_close(&self, code: &str, date: NaiveDate) -> Option<Decimal> {
        (**self).quote_close(code, date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl DailyBar {
    /// Bar with only the prices the engine reads
    pub fn open_close(date: NaiveDate, open: Decimal, close: Decimal) -> Self {
        Self {
            date,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: Decimal::ZERO,
        }
    }
}

/// Daily bars of one stock
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    code: String,
    bars: BTreeMap<NaiveDate, DailyBar>,
}

impl BarSeries {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            bars: BTreeMap::new(),
        }
    }

    pub fn with_bar(mut self, bar: DailyBar) -> Self {
        self.insert(bar);
        self
    }

    pub fn insert(&mut self, bar: DailyBar) {
        self.bars.insert(bar.date, bar);
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.keys().next_back().copied()
    }

    pub fn bar(&self, date: NaiveDate) -> Option<&DailyBar> {
        self.bars.get(&date)
    }

    /// Load the most recently modified `{code}*.csv` under `dir`
    pub fn load_latest(dir: &Path, code: &str) -> Result<Self> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(code) && n.ends_with(".csv"))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            let modified = std::fs::metadata(&path)?.modified()?;
            if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                newest = Some((modified, path));
            }
        }

        let (_, path) = newest.ok_or_else(|| {
            TrainingError::InvalidArgument(format!(
                "no price file for {} in {}",
                code,
                dir.display()
            ))
        })?;
        Self::from_csv_path(code, &path)
    }

    /// Parse a chart export with `time, open, high, low, close, volume`
    /// columns. Header names are case-insensitive and extra columns are
    /// ignored; `time` is an ISO date (optionally with a time part) or unix
    /// seconds.
    pub fn from_csv_path(code: &str, path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = rdr.headers()?.clone();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    TrainingError::InvalidArgument(format!(
                        "{} has no '{}' column",
                        path.display(),
                        name
                    ))
                })
        };
        let time_col = column("time")?;
        let open_col = column("open")?;
        let close_col = column("close")?;
        let high_col = column("high").ok();
        let low_col = column("low").ok();
        let volume_col = column("volume").ok();

        let mut series = Self::new(code);
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
            let optional = |idx: Option<usize>| idx.and_then(|i| parse_decimal(field(i)));

            let date = match parse_bar_date(field(time_col)) {
                Some(d) => d,
                None => {
                    debug!("Skipping line {}: bad time '{}'", line + 2, field(time_col));
                    continue;
                }
            };
            let (open, close) = match (parse_decimal(field(open_col)), parse_decimal(field(close_col))) {
                (Some(o), Some(c)) => (o, c),
                _ => {
                    debug!("Skipping line {}: missing open/close", line + 2);
                    continue;
                }
            };

            series.insert(DailyBar {
                date,
                open,
                high: optional(high_col).unwrap_or_else(|| open.max(close)),
                low: optional(low_col).unwrap_or_else(|| open.min(close)),
                close,
                volume: optional(volume_col).unwrap_or(Decimal::ZERO),
            });
        }

        info!(
            "Loaded {} bars for {} from {} ({:?} .. {:?})",
            series.len(),
            code,
            path.display(),
            series.first_date(),
            series.last_date()
        );
        Ok(series)
    }
}

impl PriceSource for BarSeries {
    fn quote_open(&self, code: &str, date: NaiveDate) -> Option<Decimal> {
        if code != self.code {
            return None;
        }
        self.bars.get(&date).map(|b| b.open)
    }

    fn quote_close(&self, code: &str, date: NaiveDate) -> Option<Decimal> {
        if code != self.code {
            return None;
        }
        self.bars.get(&date).map(|b| b.close)
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn parse_bar_date(raw: &str) -> Option<NaiveDate> {
    if let Some(prefix) = raw.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_quotes_by_code_and_date() {
        let series = BarSeries::new("7203")
            .with_bar(DailyBar::open_close(date(2024, 1, 5), dec!(2500), dec!(2550)));

        assert_eq!(series.quote_open("7203", date(2024, 1, 5)), Some(dec!(2500)));
        assert_eq!(series.quote_close("7203", date(2024, 1, 5)), Some(dec!(2550)));
        assert_eq!(series.quote_close("7203", date(2024, 1, 6)), None);
        assert_eq!(series.quote_close("6758", date(2024, 1, 5)), None);
    }

    #[test]
    fn test_parse_chart_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("7203_daily.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "Time,Open,High,Low,Close,Volume,MA").unwrap();
        writeln!(f, "2024-01-04,2480,2520,2470,2510,1000,1").unwrap();
        writeln!(f, "2024-01-05T00:00:00+09:00,2510,2600,2500,2590,2000,2").unwrap();
        writeln!(f, "2024-01-06,NaN,NaN,NaN,NaN,0,3").unwrap();
        writeln!(f, "1704844800,2600,2610,2550,2560,1500,4").unwrap();
        drop(f);

        let series = BarSeries::from_csv_path("7203", &path).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.quote_close("7203", date(2024, 1, 4)), Some(dec!(2510)));
        assert_eq!(series.quote_open("7203", date(2024, 1, 5)), Some(dec!(2510)));
        assert_eq!(series.quote_close("7203", date(2024, 1, 6)), None);
        assert_eq!(series.quote_open("7203", date(2024, 1, 10)), Some(dec!(2600)));
        assert_eq!(series.bar(date(2024, 1, 5)).unwrap().high, dec!(2600));
    }

    #[test]
    fn test_load_latest_requires_a_file() {
        let dir = tempdir().unwrap();
        let err = BarSeries::load_latest(dir.path(), "9999").unwrap_err();
        assert!(matches!(err, TrainingError::InvalidArgument(_)));

        let path = dir.path().join("9999_export.csv");
        std::fs::write(&path, "time,open,close\n2024-02-01,10,11\n").unwrap();
        let series = BarSeries::load_latest(dir.path(), "9999").unwrap();
        assert_eq!(series.quote_close("9999", date(2024, 2, 1)), Some(dec!(11)));
    }
}
