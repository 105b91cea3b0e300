//! MarginLab Runner: backtest orchestration on top of `marginlab-core`.
//!
//! This crate provides:
//! - TOML run configuration
//! - Kline CSV loading with date filtering, plus synthetic klines
//! - Single-run and parallel sweep runners with run fingerprinting
//! - JSON / CSV artifact export with schema versioning
//! - The live kline feed boundary (price board, reconnect backoff, updater thread)

pub mod config;
pub mod data_loader;
pub mod export;
pub mod feed;
pub mod runner;
pub mod sweep;

pub use config::{BacktestConfig, ConfigError, DataConfig, OutputConfig, ReportConfig};
pub use data_loader::{
    dataset_hash, load_bars_csv, load_candles_csv, synthetic_candles, write_candles_csv,
    LoadError, LoadOptions,
};
pub use export::{
    export_ledger_csv, export_result_json, import_result_json, load_artifacts, save_artifacts,
};
pub use feed::{
    parse_kline_message, Backoff, FeedConfig, FeedError, FeedHandle, FeedTransport, PriceBoard,
    PriceSnapshot, Subscription,
};
pub use runner::{
    prepare_data, run_from_config, run_prepared, BacktestResult, PreparedData, RunError,
    SCHEMA_VERSION,
};
pub use sweep::{run_sweep, SweepEntry, SweepGrid, SweepRejection, SweepResults};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
        assert_send::<LoadOptions>();
        assert_sync::<LoadOptions>();
    }

    #[test]
    fn prepared_data_is_send_sync() {
        assert_send::<PreparedData>();
        assert_sync::<PreparedData>();
    }

    #[test]
    fn price_board_is_send_sync() {
        assert_send::<PriceBoard>();
        assert_sync::<PriceBoard>();
    }
}
