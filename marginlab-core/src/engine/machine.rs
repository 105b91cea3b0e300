//! Position state machine: one bar in, next state and optional closed trade out.
//!
//! Exit checks run in strict priority order: liquidation first, then
//! take-profit / stop-loss. Entry is only considered while flat, so a
//! position opened on a bar is never closed on that same bar.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, ExitReason, Position, Side, Trade};
use crate::params::StrategyParams;
use crate::signal::entry_signal;

/// Flat, or holding exactly one position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Open(Position),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(p) => Some(p),
        }
    }

    pub fn side(&self) -> Option<Side> {
        self.position().map(|p| p.side)
    }
}

/// Evaluates entry, liquidation, and TP/SL rules for validated parameters.
#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    params: StrategyParams,
}

impl PositionStateMachine {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Evaluate bar `index` against `state`.
    ///
    /// The bar must already have passed validation.
    pub fn evaluate_bar(
        &self,
        index: usize,
        bar: &Bar,
        state: PositionState,
    ) -> (PositionState, Option<Trade>) {
        match state {
            PositionState::Flat => (self.evaluate_entry(index, bar), None),
            PositionState::Open(position) => match self.exit_reason(&position, bar.close) {
                Some(reason) => {
                    let trade = Trade::close(
                        &position,
                        index,
                        bar.open_time,
                        bar.close,
                        reason,
                        self.params.leverage(),
                    );
                    (PositionState::Flat, Some(trade))
                }
                None => (state, None),
            },
        }
    }

    fn evaluate_entry(&self, index: usize, bar: &Bar) -> PositionState {
        match entry_signal(bar) {
            Some(side) => {
                let position = Position::open(side, index, bar.open_time, bar.close, &self.params);
                tracing::debug!(
                    bar_index = index,
                    side = %side,
                    price = bar.close,
                    stop_loss = position.stop_loss_price,
                    take_profit = position.take_profit_price,
                    liquidation = position.liquidation_price,
                    "position opened"
                );
                PositionState::Open(position)
            }
            None => PositionState::Flat,
        }
    }

    /// Which exit fires at `close`, honouring liquidation precedence.
    pub fn exit_reason(&self, position: &Position, close: f64) -> Option<ExitReason> {
        if position.is_liquidated_at(close) {
            Some(ExitReason::Liquidation)
        } else if position.hits_take_profit(close) {
            Some(ExitReason::TakeProfit)
        } else if position.hits_stop_loss(close) {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }
}
