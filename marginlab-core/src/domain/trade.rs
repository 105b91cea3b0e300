//! Trade: an immutable record of one closed position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::{Position, Side};

/// How a position ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    ClosedNormally,
    Liquidated,
}

/// Which exit condition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Liquidation,
}

impl ExitReason {
    pub fn outcome(self) -> TradeOutcome {
        match self {
            ExitReason::Liquidation => TradeOutcome::Liquidated,
            ExitReason::TakeProfit | ExitReason::StopLoss => TradeOutcome::ClosedNormally,
        }
    }
}

/// A closed round trip. `exit_index > entry_index` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Entry ──
    pub side: Side,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub outcome: TradeOutcome,
    pub exit_reason: ExitReason,

    // ── PnL ──
    /// Leveraged return on margin, signed.
    pub pnl_fraction: f64,
}

impl Trade {
    /// Close `position` at `exit_price` on bar `exit_index`.
    pub fn close(
        position: &Position,
        exit_index: usize,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        reason: ExitReason,
        leverage: f64,
    ) -> Self {
        Self {
            side: position.side,
            entry_index: position.entry_index,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_index,
            exit_time,
            exit_price,
            outcome: reason.outcome(),
            exit_reason: reason,
            pnl_fraction: position
                .side
                .pnl_fraction(position.entry_price, exit_price, leverage),
        }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl_fraction > 0.0
    }

    pub fn is_liquidation(&self) -> bool {
        self.outcome == TradeOutcome::Liquidated
    }

    pub fn bars_held(&self) -> usize {
        self.exit_index.saturating_sub(self.entry_index)
    }
}
