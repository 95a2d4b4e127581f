//! Broker fill exports folded into chart annotation strings
//!
//! Exports are monthly CSV files named `trading_history_rkt_{yyyymm}_{yyyymm}.csv`
//! with one row per margin fill. Opening and closing fills are netted per
//! session and accumulated into running short/long share counts.

use crate::error::{Result, TrainingError};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILE_PREFIX: &str = "trading_history_rkt_";

/// Orders placed before this hour count toward the previous session
const SESSION_OPEN_HOUR: u32 = 9;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Margin fill type as labelled in the export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillKind {
    /// 売建
    OpenShort,
    /// 買建
    OpenLong,
    /// 買埋
    CloseShort,
    /// 売埋
    CloseLong,
}

impl FillKind {
    /// `None` for anything that is not a margin open or close
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "売建" => Some(FillKind::OpenShort),
            "買建" => Some(FillKind::OpenLong),
            "買埋" => Some(FillKind::CloseShort),
            "売埋" => Some(FillKind::CloseLong),
            _ => None,
        }
    }

    /// Signed change of the (short, long) share counts
    fn signed(&self, quantity: i64) -> (i64, i64) {
        match self {
            FillKind::OpenShort => (quantity, 0),
            FillKind::OpenLong => (0, quantity),
            FillKind::CloseShort => (-quantity, 0),
            FillKind::CloseLong => (0, -quantity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerFill {
    pub code: String,
    pub placed_at: NaiveDateTime,
    pub kind: FillKind,
    /// Shares
    pub quantity: i64,
}

impl BrokerFill {
    pub fn session_date(&self) -> NaiveDate {
        session_date(self.placed_at)
    }
}

#[derive(Debug, Deserialize)]
struct ExportRecord {
    #[serde(rename = "発注/受注日時")]
    placed_at: String,
    #[serde(rename = "コード")]
    code: String,
    #[serde(rename = "売買")]
    side: String,
    #[serde(rename = "約定数量(株/口)")]
    quantity: String,
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Session an order belongs to: its own date, or the previous weekday when
/// placed before the open or on a weekend
pub fn session_date(placed_at: NaiveDateTime) -> NaiveDate {
    let date = placed_at.date();
    if placed_at.hour() >= SESSION_OPEN_HOUR && !is_weekend(date) {
        return date;
    }
    let mut prev = date;
    while let Some(d) = prev.pred_opt() {
        prev = d;
        if !is_weekend(prev) {
            return prev;
        }
    }
    date
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Margin fills of one export; cash trades and other rows are skipped
pub fn read_fills(path: &Path) -> Result<Vec<BrokerFill>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut fills = Vec::new();
    for (i, record) in rdr.deserialize::<ExportRecord>().enumerate() {
        let record = record?;
        let Some(kind) = FillKind::from_label(&record.side) else {
            debug!("Skipping {} row {}: '{}'", path.display(), i, record.side);
            continue;
        };
        let placed_at = parse_datetime(&record.placed_at).ok_or_else(|| {
            TrainingError::InvalidArgument(format!(
                "{} row {}: bad order time '{}'",
                path.display(),
                i,
                record.placed_at
            ))
        })?;
        let quantity = record.quantity.replace(',', "").parse::<i64>().map_err(|_| {
            TrainingError::InvalidArgument(format!(
                "{} row {}: bad quantity '{}'",
                path.display(),
                i,
                record.quantity
            ))
        })?;
        fills.push(BrokerFill {
            code: record.code,
            placed_at,
            kind,
            quantity,
        });
    }
    Ok(fills)
}

/// First day of the start and end months in an export file name
fn export_months(file_name: &str) -> Option<(NaiveDate, NaiveDate)> {
    let body = file_name.strip_prefix(FILE_PREFIX)?.strip_suffix(".csv")?;
    let (start, end) = body.split_once('_')?;
    let month = |raw: &str| {
        if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDate::parse_from_str(&format!("{}01", raw), "%Y%m%d").ok()
    };
    Some((month(start)?, month(end)?))
}

fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Export files in `dir` whose month range overlaps `from..=to`, sorted by
/// name. A missing directory has no exports.
pub fn export_files(dir: &Path, from: NaiveDate, to: NaiveDate) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((start, end)) = export_months(name) else {
            continue;
        };
        if month_key(start) <= month_key(to) && month_key(end) >= month_key(from) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Running `date:short-long` share counts of one stock within `from..=to`.
/// `None` when no fill matches.
pub fn broker_view_string(
    fills: &[BrokerFill],
    code: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Option<String> {
    let mut per_session: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
    for fill in fills.iter().filter(|f| f.code == code) {
        let date = fill.session_date();
        if date < from || date > to {
            continue;
        }
        let (short, long) = fill.kind.signed(fill.quantity);
        let entry = per_session.entry(date).or_default();
        entry.0 += short;
        entry.1 += long;
    }
    if per_session.is_empty() {
        return None;
    }

    let (mut short, mut long) = (0i64, 0i64);
    let parts: Vec<String> = per_session
        .into_iter()
        .map(|(date, (s, l))| {
            short += s;
            long += l;
            format!("{}:{}-{}", date.format("%Y-%m-%d"), short, long)
        })
        .collect();
    Some(parts.join(","))
}

/// Read every export in `dir` covering `from..=to` and fold it
pub fn broker_trading_view(
    dir: &Path,
    code: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Option<String>> {
    let files = export_files(dir, from, to)?;
    let mut fills = Vec::new();
    for path in &files {
        fills.extend(read_fills(path)?);
    }
    info!("Read {} fill(s) from {} export(s) in {}", fills.len(), files.len(), dir.display());
    Ok(broker_view_string(&fills, code, from, to))
}
