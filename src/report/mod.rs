//! Ledger reports: per-stock segment summaries and chart annotation strings

pub mod broker;

use crate::error::{Result, TrainingError};
use crate::history::{LedgerFile, LedgerRow};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Consecutive ledger rows trading the same stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentSummary {
    pub stock_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Largest share count dividing every non-zero position of the
    /// segment, 0 if it never held anything
    pub lot_size: u64,
    /// Peak short + long shares in units of `lot_size`
    pub max_lots: u64,
    /// Last assets minus first assets
    pub asset_change: Decimal,
}

/// Read a ledger and summarize it segment by segment
pub fn summarize(path: &Path) -> Result<Vec<SegmentSummary>> {
    let rows = LedgerFile::open(path)?.read_rows()?;
    Ok(summarize_rows(&rows))
}

pub fn summarize_rows(rows: &[LedgerRow]) -> Vec<SegmentSummary> {
    let mut segments = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        if i == rows.len() || rows[i].stock_code != rows[start].stock_code {
            segments.push(summarize_segment(&rows[start..i]));
            start = i;
        }
    }
    segments
}

fn summarize_segment(segment: &[LedgerRow]) -> SegmentSummary {
    let first = &segment[0];
    let last = &segment[segment.len() - 1];

    let mut lot_size = 0;
    let mut max_shares = 0;
    for row in segment {
        let (short, long) = row.quantities();
        lot_size = gcd(gcd(lot_size, short), long);
        max_shares = max_shares.max(short + long);
    }

    SegmentSummary {
        stock_code: first.stock_code.clone(),
        start_date: first.trading_date,
        end_date: last.trading_date,
        lot_size,
        max_lots: if lot_size == 0 { 0 } else { max_shares / lot_size },
        asset_change: last.assets - first.assets,
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Where [`write_summary`] puts the summary of `ledger_path`
pub fn summary_path(ledger_path: &Path) -> PathBuf {
    let name = ledger_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let summary_name = if name.contains("_history_") {
        name.replacen("_history_", "_summary_", 1)
    } else {
        let stem = ledger_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}_summary.csv", stem)
    };
    ledger_path.with_file_name(summary_name)
}

/// Write segments next to the ledger; returns the path written
pub fn write_summary(ledger_path: &Path, segments: &[SegmentSummary]) -> Result<PathBuf> {
    let path = summary_path(ledger_path);
    if path == ledger_path {
        return Err(TrainingError::InvalidArgument(format!(
            "summary would overwrite {}",
            ledger_path.display()
        )));
    }
    let mut wtr = csv::Writer::from_path(&path)?;
    for segment in segments {
        wtr.serialize(segment)?;
    }
    wtr.flush()?;
    info!("Wrote {} segment(s) to {}", segments.len(), path.display());
    Ok(path)
}

/// Plain text table of the last `tail` segments (all when `None`)
pub fn format_segments(segments: &[SegmentSummary], tail: Option<usize>) -> String {
    let start = tail.map_or(0, |n| segments.len().saturating_sub(n));
    let mut out = format!(
        "{:<10} {:<10} {:<10} {:>8} {:>8} {:>16}\n",
        "code", "start", "end", "lot", "max lots", "asset change"
    );
    for s in &segments[start..] {
        out.push_str(&format!(
            "{:<10} {:<10} {:<10} {:>8} {:>8} {:>16}\n",
            s.stock_code,
            s.start_date.to_string(),
            s.end_date.to_string(),
            s.lot_size,
            s.max_lots,
            format_yen(s.asset_change)
        ));
    }
    out
}

/// Whole yen with thousands separators, e.g. `-¥1,234,567`
pub fn format_yen(amount: Decimal) -> String {
    let whole = amount.trunc().abs().to_u128().unwrap_or_default().to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount.is_sign_negative() && !amount.trunc().is_zero() {
        format!("-¥{}", grouped)
    } else {
        format!("¥{}", grouped)
    }
}

/// `date:shortLot-longLot` pairs for one stock within `from..=to`, comma
/// separated. `None` when no row matches.
pub fn trading_view_string(
    rows: &[LedgerRow],
    code: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Option<String> {
    let parts: Vec<String> = rows
        .iter()
        .filter(|r| r.stock_code == code && r.trading_date >= from && r.trading_date <= to)
        .map(|r| format!("{}:{}-{}", r.trading_date.format("%Y-%m-%d"), r.short_lot, r.long_lot))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}
