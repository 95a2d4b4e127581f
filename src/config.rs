//! Configuration management

use crate::error::{Result, TrainingError};
use crate::history::DEFAULT_UNDO_CAPACITY;
use crate::types::{MarginPolicy, Timing};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub data: DataConfig,
}

/// Defaults for new training sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Shares per lot when the command line gives none
    pub lot_size: u64,
    pub initial_assets: Decimal,
    pub margin_policy: MarginPolicy,
    /// Undo snapshots kept in memory per book
    pub history_capacity: usize,
    /// Rows shown by `list` without an argument
    pub list_limit: usize,
    /// One ledger per timing, in submission order
    pub timings: Vec<Timing>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lot_size: 100,
            initial_assets: dec!(10000000),
            margin_policy: MarginPolicy::Forbidden,
            history_capacity: DEFAULT_UNDO_CAPACITY,
            list_limit: 10,
            timings: vec![Timing::Close, Timing::NextOpen],
        }
    }
}

/// Where price exports are read and ledgers written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub prices_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Monthly broker fill exports
    pub broker_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            prices_dir: PathBuf::from("input/data/trv"),
            output_dir: PathBuf::from("output"),
            broker_dir: PathBuf::from("input"),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then `TRAINING__SECTION__KEY`
    /// environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("TRAINING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.data.prices_dir = expand(&config.data.prices_dir);
        config.data.output_dir = expand(&config.data.output_dir);
        config.data.broker_dir = expand(&config.data.broker_dir);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.session.lot_size == 0 {
            return Err(TrainingError::Config("session.lot_size must be positive".into()));
        }
        if self.session.initial_assets <= Decimal::ZERO {
            return Err(TrainingError::Config(
                "session.initial_assets must be positive".into(),
            ));
        }
        if self.session.timings.is_empty() {
            return Err(TrainingError::Config("session.timings is empty".into()));
        }
        Ok(())
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => path.to_path_buf(),
    }
}
