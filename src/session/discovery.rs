//! Ledger file naming and discovery of sessions that can be resumed

use crate::error::Result;
use crate::history::LedgerFile;
use crate::types::Timing;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FILE_PREFIX: &str = "trading_history_";
const DATA_START_FORMAT: &str = "%Y%m%d";
const SESSION_START_FORMAT: &str = "%Y%m%d%H%M%S";

/// `trading_history_{code}_{data_start}_{session_started}_{close|open}.csv`
pub fn ledger_file_name(
    code: &str,
    data_start: NaiveDate,
    session_started: NaiveDateTime,
    timing: Timing,
) -> String {
    format!(
        "{}{}_{}_{}_{}.csv",
        FILE_PREFIX,
        code,
        data_start.format(DATA_START_FORMAT),
        session_started.format(SESSION_START_FORMAT),
        timing.file_tag()
    )
}

/// Parts of a ledger file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerName {
    pub code: String,
    pub data_start: NaiveDate,
    pub session_started: NaiveDateTime,
    pub timing: Timing,
}

impl LedgerName {
    /// Parse a file name built by [`ledger_file_name`]. The stock code may
    /// itself contain underscores, so fields are taken from the end.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_prefix(FILE_PREFIX)?.strip_suffix(".csv")?;
        let mut parts = stem.rsplitn(4, '_');
        let timing = Timing::from_file_tag(parts.next()?)?;
        let session_started =
            NaiveDateTime::parse_from_str(parts.next()?, SESSION_START_FORMAT).ok()?;
        let data_start = NaiveDate::parse_from_str(parts.next()?, DATA_START_FORMAT).ok()?;
        let code = parts.next().filter(|c| !c.is_empty())?;
        Some(Self {
            code: code.to_string(),
            data_start,
            session_started,
            timing,
        })
    }
}

/// A set of ledgers written by one training session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableSession {
    pub code: String,
    pub data_start: NaiveDate,
    pub session_started: NaiveDateTime,
    /// Latest trading date over all of the session's ledgers
    pub last_trading_date: NaiveDate,
    pub files: BTreeMap<Timing, PathBuf>,
    /// Assets on each ledger's last row
    pub assets: BTreeMap<Timing, Decimal>,
}

/// Find non-empty ledgers of `code` under `output_dir`, grouped by session,
/// newest session first
pub fn discover_sessions(output_dir: &Path, code: &str) -> Result<Vec<ResumableSession>> {
    if !output_dir.is_dir() {
        debug!("{} does not exist, nothing to resume", output_dir.display());
        return Ok(Vec::new());
    }

    let mut sessions: BTreeMap<(NaiveDateTime, NaiveDate), ResumableSession> = BTreeMap::new();
    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        let Some(name) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(LedgerName::parse)
        else {
            continue;
        };
        if name.code != code {
            continue;
        }

        let last = match LedgerFile::open(&path).and_then(|ledger| ledger.last_row()) {
            Ok(Some(row)) => row,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let session = sessions
            .entry((name.session_started, name.data_start))
            .or_insert_with(|| ResumableSession {
                code: name.code.clone(),
                data_start: name.data_start,
                session_started: name.session_started,
                last_trading_date: last.trading_date,
                files: BTreeMap::new(),
                assets: BTreeMap::new(),
            });
        session.last_trading_date = session.last_trading_date.max(last.trading_date);
        session.files.insert(name.timing, path);
        session.assets.insert(name.timing, last.assets);
    }

    Ok(sessions.into_values().rev().collect())
}
