//! Crate-wide error taxonomy.

use thiserror::Error;

use crate::domain::DataError;
use crate::ledger::LedgerError;
use crate::params::ConfigError;

/// Any error that stops a backtest.
///
/// Liquidations and TP/SL exits are trade outcomes, never errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl BacktestError {
    /// Index of the bar at fault, when the error is tied to one.
    pub fn bar_index(&self) -> Option<usize> {
        match self {
            BacktestError::Data(e) => e.bar_index(),
            _ => None,
        }
    }
}
