//! TOML backtest configuration.
//!
//! ```toml
//! [strategy]
//! take_profit_pct = 0.05
//! stop_loss_pct = 0.025
//! leverage = 10.0
//! initial_margin = 100.0
//! maintenance_margin_ratio = 0.8
//!
//! [indicators]
//! ema = 200
//!
//! [report]
//! pnl_mode = "compounding"
//! liquidation_severity = "recorded_loss"
//!
//! [data]
//! path = "data/BTCUSDT-15m-2024-06.csv"
//! start = "2024-06-01"
//! end = "2024-07-01"
//!
//! [output]
//! dir = "runs"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use marginlab_core::params::{IndicatorWindows, StrategyParams};
use marginlab_core::report::{LiquidationSeverity, PnlMode};

/// Errors from reading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid parameters: {0}")]
    Invalid(#[from] marginlab_core::ConfigError),

    #[error("[data] needs either `path` or `synthetic`")]
    NoDataSource,

    #[error("[data] sets both `path` and `synthetic`; pick one")]
    ConflictingDataSources,

    #[error("[data] start {start} is not before end {end}")]
    EmptyDateRange { start: NaiveDate, end: NaiveDate },
}

/// Full configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub strategy: StrategyParams,
    #[serde(default)]
    pub indicators: IndicatorWindows,
    #[serde(default)]
    pub report: ReportConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// How the run is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub pnl_mode: PnlMode,
    pub liquidation_severity: LiquidationSeverity,
}

/// Where bars come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Kline CSV (or precomputed bar CSV when `precomputed` is set).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Generate this many synthetic klines instead of reading `path`.
    #[serde(default)]
    pub synthetic: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Inclusive lower bound on the candle open date.
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Exclusive upper bound on the candle open date.
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// The CSV already carries EMA, MACD, signalLine and RSI columns.
    #[serde(default)]
    pub precomputed: bool,
    #[serde(default = "default_symbol")]
    pub symbol: String,
}

fn default_seed() -> u64 {
    42
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

impl DataConfig {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            synthetic: None,
            seed: default_seed(),
            start: None,
            end: None,
            precomputed: false,
            symbol: default_symbol(),
        }
    }

    pub fn synthetic(count: usize, seed: u64) -> Self {
        Self {
            path: None,
            synthetic: Some(count),
            seed,
            start: None,
            end: None,
            precomputed: false,
            symbol: default_symbol(),
        }
    }
}

/// Where artifacts are written. `None` means nothing is saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: Option<PathBuf>,
}

impl BacktestConfig {
    pub fn new(strategy: StrategyParams, data: DataConfig) -> Self {
        Self {
            strategy,
            indicators: IndicatorWindows::default(),
            report: ReportConfig::default(),
            data,
            output: OutputConfig::default(),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: BacktestConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks that serde cannot express on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.indicators.validate()?;
        match (&self.data.path, self.data.synthetic) {
            (None, None) => return Err(ConfigError::NoDataSource),
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingDataSources),
            _ => {}
        }
        if let (Some(start), Some(end)) = (self.data.start, self.data.end) {
            if start >= end {
                return Err(ConfigError::EmptyDateRange { start, end });
            }
        }
        Ok(())
    }
}
