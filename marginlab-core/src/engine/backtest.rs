//! Backtest fold: drives the state machine over an ordered bar sequence.
//!
//! Bar 0 only seeds context (timestamp ordering); decisions start at bar 1.
//! The first error is latched: the failing bar leaves state and ledger
//! untouched, every later push returns the same error, and `finish` reports
//! the run as failed with the trades closed before it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{check_bar, Bar, DataError, Position, Trade};
use crate::engine::machine::{PositionState, PositionStateMachine};
use crate::error::BacktestError;
use crate::ledger::TradeLedger;
use crate::params::StrategyParams;

/// Last bar the engine accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastBar {
    pub index: usize,
    pub open_time: DateTime<Utc>,
    pub close: f64,
}

/// Outcome of a run that consumed every bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub params: StrategyParams,
    pub ledger: TradeLedger,
    /// Position still open after the last bar. Not force-closed.
    pub open_position: Option<Position>,
    pub bar_count: usize,
    pub last_bar: Option<LastBar>,
}

impl RunResult {
    pub fn has_open_position(&self) -> bool {
        self.open_position.is_some()
    }
}

/// A run aborted by an error. Trades closed before the failing bar are kept.
#[derive(Debug, Clone, Error)]
#[error("backtest aborted after {bars_processed} bars: {error}")]
pub struct RunFailure {
    #[source]
    pub error: BacktestError,
    pub partial_ledger: TradeLedger,
    pub bars_processed: usize,
}

/// Incremental engine: owns the state, the ledger, and ordering context.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    machine: PositionStateMachine,
    state: PositionState,
    ledger: TradeLedger,
    bars_processed: usize,
    last_bar: Option<LastBar>,
    failure: Option<BacktestError>,
}

impl BacktestEngine {
    pub fn new(params: StrategyParams) -> Self {
        Self {
            machine: PositionStateMachine::new(params),
            state: PositionState::Flat,
            ledger: TradeLedger::new(),
            bars_processed: 0,
            last_bar: None,
            failure: None,
        }
    }

    /// Validate and evaluate the next bar.
    ///
    /// Returns the trade closed on this bar, if any. An error leaves state and
    /// ledger as they were and ends the run: later calls return it again.
    pub fn push_bar(&mut self, bar: &Bar) -> Result<Option<&Trade>, BacktestError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let closed = match self.step(bar) {
            Ok(closed) => closed,
            Err(error) => {
                self.failure = Some(error.clone());
                return Err(error);
            }
        };
        Ok(closed.and(self.ledger.last()))
    }

    fn step(&mut self, bar: &Bar) -> Result<Option<Trade>, BacktestError> {
        let index = self.bars_processed;
        check_bar(index, bar, self.last_bar.map(|b| b.open_time))?;

        let closed = if index == 0 {
            None
        } else {
            let (next, closed) = self.machine.evaluate_bar(index, bar, self.state);
            if let Some(trade) = &closed {
                self.ledger.append(trade.clone())?;
                log_close(trade);
            }
            self.state = next;
            closed
        };

        self.bars_processed += 1;
        self.last_bar = Some(LastBar {
            index,
            open_time: bar.open_time,
            close: bar.close,
        });
        Ok(closed)
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn params(&self) -> &StrategyParams {
        self.machine.params()
    }

    pub fn bars_processed(&self) -> usize {
        self.bars_processed
    }

    /// The error that ended the run, if any.
    pub fn failure(&self) -> Option<&BacktestError> {
        self.failure.as_ref()
    }

    /// Stop folding. A latched error turns into a [`RunFailure`] carrying the
    /// partial ledger; otherwise the open position is surfaced, not closed.
    pub fn finish(mut self) -> Result<RunResult, RunFailure> {
        if let Some(error) = self.failure.take() {
            return Err(self.abort(error));
        }
        let open_position = self.state.position().copied();
        if let (Some(pos), Some(last)) = (&open_position, &self.last_bar) {
            tracing::warn!(
                side = %pos.side,
                entry_index = pos.entry_index,
                entry_price = pos.entry_price,
                last_close = last.close,
                "run ended with an open position; reported as unrealized"
            );
        }
        Ok(RunResult {
            params: *self.machine.params(),
            ledger: self.ledger,
            open_position,
            bar_count: self.bars_processed,
            last_bar: self.last_bar,
        })
    }

    fn abort(self, error: BacktestError) -> RunFailure {
        tracing::error!(
            bars_processed = self.bars_processed,
            trades = self.ledger.total_trades(),
            %error,
            "backtest aborted"
        );
        RunFailure {
            error,
            partial_ledger: self.ledger,
            bars_processed: self.bars_processed,
        }
    }
}

fn log_close(trade: &Trade) {
    if trade.is_liquidation() {
        tracing::warn!(
            entry_index = trade.entry_index,
            exit_index = trade.exit_index,
            side = %trade.side,
            price = trade.exit_price,
            pnl = trade.pnl_fraction,
            "position liquidated"
        );
    } else {
        tracing::debug!(
            entry_index = trade.entry_index,
            exit_index = trade.exit_index,
            side = %trade.side,
            price = trade.exit_price,
            reason = ?trade.exit_reason,
            pnl = trade.pnl_fraction,
            "position closed"
        );
    }
}

/// Fold `bars` in order and return the full result, or the failure with the
/// partial ledger.
pub fn run_backtest(params: &StrategyParams, bars: &[Bar]) -> Result<RunResult, RunFailure> {
    let mut engine = BacktestEngine::new(*params);
    if bars.is_empty() {
        return Err(engine.abort(DataError::EmptySeries.into()));
    }

    for bar in bars {
        if engine.push_bar(bar).is_err() {
            break;
        }
    }

    let result = engine.finish()?;
    tracing::info!(
        bars = result.bar_count,
        trades = result.ledger.total_trades(),
        winners = result.ledger.winning_trades(),
        liquidations = result.ledger.liquidated_trades(),
        open_position = result.has_open_position(),
        "backtest complete"
    );
    Ok(result)
}
