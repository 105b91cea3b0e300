//! MarginLab Core: leveraged, indicator-driven backtesting.
//!
//! This crate holds everything that is pure computation:
//! - Domain types (candles, bars, positions, trades)
//! - Indicator collaborator (EMA, MACD, signal line, RSI)
//! - Entry rule and leveraged threshold arithmetic
//! - Position state machine and the bar-by-bar fold
//! - Append-only trade ledger
//! - Performance reporting under compounding or additive P&L
//!
//! Nothing in here touches the filesystem or the network.

pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod ledger;
pub mod params;
pub mod report;
pub mod signal;

pub use domain::{Bar, BarSeries, Candle, DataError, ExitReason, Position, Side, Trade, TradeOutcome};
pub use engine::{run_backtest, BacktestEngine, RunFailure, RunResult};
pub use error::BacktestError;
pub use ledger::{LedgerError, TradeLedger};
pub use params::{ConfigError, IndicatorWindows, StrategyParams};
pub use report::{
    report_run, LiquidationSeverity, PerformanceReport, PerformanceReporter, PnlMode,
    UnrealizedPosition,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across threads by the sweep and the
    /// feed are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Bar>();
        require_sync::<Bar>();
        require_send::<BarSeries>();
        require_sync::<BarSeries>();
        require_send::<Trade>();
        require_sync::<Trade>();
        require_send::<TradeLedger>();
        require_sync::<TradeLedger>();
        require_send::<StrategyParams>();
        require_sync::<StrategyParams>();
        require_send::<RunResult>();
        require_sync::<RunResult>();
        require_send::<PerformanceReport>();
        require_sync::<PerformanceReport>();
        require_send::<BacktestError>();
        require_sync::<BacktestError>();
        require_send::<RunFailure>();
        require_sync::<RunFailure>();
    }
}
