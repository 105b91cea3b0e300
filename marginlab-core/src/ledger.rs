//! Trade ledger: append-only, with non-overlapping trades in entry order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Trade;

/// A trade that would break the ledger's ordering invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("trade exit index {exit_index} is not after entry index {entry_index}")]
    InvalidSpan {
        entry_index: usize,
        exit_index: usize,
    },

    #[error("trade entering at bar {entry_index} overlaps previous trade exiting at bar {previous_exit}")]
    Overlap {
        entry_index: usize,
        previous_exit: usize,
    },
}

/// Closed trades in the order they were closed.
///
/// `append` is the only mutator; trades are never removed or reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Trade>", into = "Vec<Trade>")]
pub struct TradeLedger {
    trades: Vec<Trade>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted trades, checking every invariant.
    pub fn from_trades(trades: impl IntoIterator<Item = Trade>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for trade in trades {
            ledger.append(trade)?;
        }
        Ok(ledger)
    }

    /// Append a closed trade. It must start strictly after the previous one ended.
    pub fn append(&mut self, trade: Trade) -> Result<(), LedgerError> {
        if trade.exit_index <= trade.entry_index {
            return Err(LedgerError::InvalidSpan {
                entry_index: trade.entry_index,
                exit_index: trade.exit_index,
            });
        }
        if let Some(last) = self.trades.last() {
            if trade.entry_index <= last.exit_index {
                return Err(LedgerError::Overlap {
                    entry_index: trade.entry_index,
                    previous_exit: last.exit_index,
                });
            }
        }
        self.trades.push(trade);
        Ok(())
    }

    pub fn total_trades(&self) -> usize {
        self.trades.len()
    }

    /// Trades with a strictly positive leveraged return.
    pub fn winning_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.is_winner()).count()
    }

    pub fn liquidated_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.is_liquidation()).count()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn last(&self) -> Option<&Trade> {
        self.trades.last()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trade> {
        self.trades.iter()
    }
}

impl TryFrom<Vec<Trade>> for TradeLedger {
    type Error = LedgerError;

    fn try_from(trades: Vec<Trade>) -> Result<Self, Self::Error> {
        Self::from_trades(trades)
    }
}

impl From<TradeLedger> for Vec<Trade> {
    fn from(ledger: TradeLedger) -> Self {
        ledger.trades
    }
}

impl<'a> IntoIterator for &'a TradeLedger {
    type Item = &'a Trade;
    type IntoIter = std::slice::Iter<'a, Trade>;

    fn into_iter(self) -> Self::IntoIter {
        self.trades.iter()
    }
}
