//! Backtesting engine: the position state machine and the fold that drives it.
//!
//! Per bar (from the second bar on):
//! 1. Validate the bar (defined fields, positive close, increasing open_time)
//! 2. Flat: evaluate the entry rule, open a position with fixed thresholds
//! 3. Open: liquidation check, then take-profit / stop-loss
//! 4. Append any closed trade to the ledger

pub mod backtest;
pub mod machine;

pub use backtest::{run_backtest, BacktestEngine, LastBar, RunFailure, RunResult};
pub use machine::{PositionState, PositionStateMachine};
