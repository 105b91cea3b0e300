//! Backtest runner: wires together data loading, indicators, engine, and reporting.
//!
//! Two entry points:
//! - `run_from_config()`: loads data per the config, then runs. Used by the CLI.
//! - `run_prepared()`: takes already-annotated bars. Used by the sweep so the
//!   data is loaded and annotated once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use marginlab_core::domain::{Bar, BarSeries, Position, Trade};
use marginlab_core::engine::{run_backtest, RunFailure};
use marginlab_core::indicators::annotate;
use marginlab_core::params::{IndicatorWindows, StrategyParams};
use marginlab_core::report::{report_run, LiquidationSeverity, PerformanceReport, PnlMode};

use crate::config::{BacktestConfig, ConfigError, DataConfig, ReportConfig};
use crate::data_loader::{
    dataset_hash, load_bars_csv, load_candles_csv, synthetic_candles, LoadError, LoadOptions,
};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid parameters: {0}")]
    Params(#[from] marginlab_core::ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error(transparent)]
    Backtest(#[from] RunFailure),
    #[error("failed to fingerprint run: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Bars ready for the engine, plus their provenance.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub series: BarSeries,
    pub symbol: String,
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub symbol: String,
    pub params: StrategyParams,
    pub windows: IndicatorWindows,
    pub pnl_mode: PnlMode,
    pub liquidation_severity: LiquidationSeverity,
    pub report: PerformanceReport,
    pub trades: Vec<Trade>,
    pub open_position: Option<Position>,
    pub bar_count: usize,
    pub first_open_time: Option<DateTime<Utc>>,
    pub last_open_time: Option<DateTime<Utc>>,
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run a single backtest from a `BacktestConfig`.
pub fn run_from_config(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let data = prepare_data(&config.data, &config.indicators)?;
    run_prepared(&config.strategy, &config.indicators, &config.report, &data)
}

/// Load (or generate) candles and turn them into engine-ready bars.
pub fn prepare_data(
    data: &DataConfig,
    windows: &IndicatorWindows,
) -> Result<PreparedData, RunError> {
    let opts = LoadOptions {
        start: data.start,
        end: data.end,
    };

    let (series, has_synthetic) = match (&data.path, data.synthetic) {
        (Some(_), Some(_)) => return Err(ConfigError::ConflictingDataSources.into()),
        (None, Some(count)) => {
            tracing::warn!(count, seed = data.seed, "using synthetic klines");
            let candles: Vec<_> = synthetic_candles(count, data.seed)
                .into_iter()
                .filter(|c| opts.contains(c.open_time))
                .collect();
            (annotate(&candles, windows)?, true)
        }
        (Some(path), None) if data.precomputed => {
            (BarSeries::from_bars(load_bars_csv(path, &opts)?), false)
        }
        (Some(path), None) => {
            let candles = load_candles_csv(path, &opts)?;
            (annotate(&candles, windows)?, false)
        }
        (None, None) => return Err(ConfigError::NoDataSource.into()),
    };

    Ok(PreparedData {
        dataset_hash: dataset_hash(series.bars()),
        series,
        symbol: data.symbol.clone(),
        has_synthetic,
    })
}

/// Run a backtest over prepared bars. No I/O.
pub fn run_prepared(
    params: &StrategyParams,
    windows: &IndicatorWindows,
    report: &ReportConfig,
    data: &PreparedData,
) -> Result<BacktestResult, RunError> {
    let bars: &[Bar] = data.series.bars();
    let run = run_backtest(params, bars)?;
    let performance = report_run(&run, report.pnl_mode, report.liquidation_severity);

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: run_id(params, windows, &data.dataset_hash)?,
        symbol: data.symbol.clone(),
        params: *params,
        windows: *windows,
        pnl_mode: report.pnl_mode,
        liquidation_severity: report.liquidation_severity,
        report: performance,
        trades: run.ledger.trades().to_vec(),
        open_position: run.open_position,
        bar_count: run.bar_count,
        first_open_time: data.series.first_open_time(),
        last_open_time: data.series.last_open_time(),
        dataset_hash: data.dataset_hash.clone(),
        has_synthetic: data.has_synthetic,
    })
}

/// Deterministic identifier: two runs with identical parameters over the
/// same bars share a run id.
pub fn run_id(
    params: &StrategyParams,
    windows: &IndicatorWindows,
    dataset_hash: &str,
) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(&(params, windows, dataset_hash))?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> StrategyParams {
        StrategyParams::new(0.05, 0.025, 5.0, 100.0, 0.8).unwrap()
    }

    #[test]
    fn run_id_deterministic() {
        let windows = IndicatorWindows::default();
        let a = run_id(&params(), &windows, "abc").unwrap();
        assert_eq!(a, run_id(&params(), &windows, "abc").unwrap());
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn run_id_changes_with_inputs() {
        let windows = IndicatorWindows::default();
        let base = run_id(&params(), &windows, "abc").unwrap();
        assert_ne!(base, run_id(&params(), &windows, "abd").unwrap());

        let levered = StrategyParams::new(0.05, 0.025, 6.0, 100.0, 0.8).unwrap();
        assert_ne!(base, run_id(&levered, &windows, "abc").unwrap());

        let faster = IndicatorWindows {
            ema: 100,
            ..windows
        };
        assert_ne!(base, run_id(&params(), &faster, "abc").unwrap());
    }

    #[test]
    fn synthetic_run_completes() {
        let config = BacktestConfig::new(params(), DataConfig::synthetic(3_000, 11));
        let result = run_from_config(&config).unwrap();
        assert!(result.has_synthetic);
        assert_eq!(result.bar_count, 3_000 - IndicatorWindows::default().warmup());
        assert_eq!(result.report.total_trades, result.trades.len());
        assert!(result.first_open_time < result.last_open_time);
    }

    #[test]
    fn too_few_candles_is_an_empty_series_failure() {
        let config = BacktestConfig::new(params(), DataConfig::synthetic(100, 11));
        let err = run_from_config(&config).unwrap_err();
        assert!(matches!(err, RunError::Backtest(_)));
    }

    #[test]
    fn prepare_refuses_two_data_sources() {
        let mut data = DataConfig::synthetic(500, 1);
        data.path = Some("klines.csv".into());
        let err = prepare_data(&data, &IndicatorWindows::default()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Config(ConfigError::ConflictingDataSources)
        ));
    }
}
