//! Side and Position: the single open trade the state machine owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::StrategyParams;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Leveraged return of a move from `entry_price` to `exit_price`.
    ///
    /// Long: `(exit - entry) / entry * leverage`.
    /// Short: `(entry - exit) / entry * leverage`.
    pub fn pnl_fraction(self, entry_price: f64, exit_price: f64, leverage: f64) -> f64 {
        let raw = match self {
            Side::Long => (exit_price - entry_price) / entry_price,
            Side::Short => (entry_price - exit_price) / entry_price,
        };
        raw * leverage
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "Long",
            Side::Short => "Short",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit price levels fixed at entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub liquidation_price: f64,
}

impl Thresholds {
    /// Compute the three exit levels for a position entered at `entry_price`.
    ///
    /// `margin_buffer = (1 - maintenance_margin_ratio) / leverage`; stop-loss
    /// and take-profit distances are the configured fractions divided by
    /// leverage, so they describe a move in margin terms.
    pub fn compute(side: Side, entry_price: f64, params: &StrategyParams) -> Self {
        let leverage = params.leverage();
        let buffer = params.margin_buffer_fraction();
        let sl = params.stop_loss_pct() / leverage;
        let tp = params.take_profit_pct() / leverage;

        match side {
            Side::Long => Self {
                liquidation_price: entry_price * (1.0 - buffer),
                stop_loss_price: entry_price * (1.0 - sl),
                take_profit_price: entry_price * (1.0 + tp),
            },
            Side::Short => Self {
                liquidation_price: entry_price * (1.0 + buffer),
                stop_loss_price: entry_price * (1.0 + sl),
                take_profit_price: entry_price * (1.0 - tp),
            },
        }
    }
}

/// An open position. Thresholds are computed once at entry and never revalued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub liquidation_price: f64,
}

impl Position {
    pub fn open(
        side: Side,
        entry_index: usize,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        params: &StrategyParams,
    ) -> Self {
        let t = Thresholds::compute(side, entry_price, params);
        Self {
            side,
            entry_index,
            entry_time,
            entry_price,
            stop_loss_price: t.stop_loss_price,
            take_profit_price: t.take_profit_price,
            liquidation_price: t.liquidation_price,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            stop_loss_price: self.stop_loss_price,
            take_profit_price: self.take_profit_price,
            liquidation_price: self.liquidation_price,
        }
    }

    pub fn is_liquidated_at(&self, close: f64) -> bool {
        match self.side {
            Side::Long => close <= self.liquidation_price,
            Side::Short => close >= self.liquidation_price,
        }
    }

    pub fn hits_take_profit(&self, close: f64) -> bool {
        match self.side {
            Side::Long => close >= self.take_profit_price,
            Side::Short => close <= self.take_profit_price,
        }
    }

    pub fn hits_stop_loss(&self, close: f64) -> bool {
        match self.side {
            Side::Long => close <= self.stop_loss_price,
            Side::Short => close >= self.stop_loss_price,
        }
    }

    /// Mark-to-market leveraged return at `price`.
    pub fn unrealized_pnl_fraction(&self, price: f64, leverage: f64) -> f64 {
        self.side.pnl_fraction(self.entry_price, price, leverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn long_thresholds_unlevered() {
        let params = StrategyParams::new(0.05, 0.025, 1.0, 100.0, 0.8).unwrap();
        let t = Thresholds::compute(Side::Long, 100.0, &params);
        assert!((t.take_profit_price - 105.0).abs() < EPS);
        assert!((t.stop_loss_price - 97.5).abs() < EPS);
        assert!((t.liquidation_price - 80.0).abs() < EPS);
    }

    #[test]
    fn long_thresholds_levered() {
        let params = StrategyParams::new(0.10, 0.025, 5.0, 100.0, 0.8).unwrap();
        assert!((params.margin_buffer_fraction() - 0.04).abs() < EPS);
        let t = Thresholds::compute(Side::Long, 100.0, &params);
        assert!((t.liquidation_price - 96.0).abs() < EPS);
        assert!((t.take_profit_price - 102.0).abs() < EPS);
        assert!((t.stop_loss_price - 99.5).abs() < EPS);
    }

    #[test]
    fn short_thresholds_mirror_long() {
        let params = StrategyParams::new(0.10, 0.025, 5.0, 100.0, 0.8).unwrap();
        let t = Thresholds::compute(Side::Short, 100.0, &params);
        assert!((t.liquidation_price - 104.0).abs() < EPS);
        assert!((t.take_profit_price - 98.0).abs() < EPS);
        assert!((t.stop_loss_price - 100.5).abs() < EPS);
    }

    #[test]
    fn pnl_sign_for_both_sides() {
        assert!((Side::Long.pnl_fraction(100.0, 110.0, 2.0) - 0.20).abs() < EPS);
        assert!((Side::Short.pnl_fraction(100.0, 90.0, 2.0) - 0.20).abs() < EPS);
        assert!(Side::Short.pnl_fraction(100.0, 110.0, 2.0) < 0.0);
    }

    #[test]
    fn short_liquidation_is_at_or_above_level() {
        let params = StrategyParams::new(0.10, 0.025, 5.0, 100.0, 0.8).unwrap();
        let pos = Position::open(Side::Short, 3, chrono::Utc::now(), 100.0, &params);
        assert!(!pos.is_liquidated_at(103.9));
        assert!(pos.is_liquidated_at(104.0));
        assert!(pos.hits_stop_loss(100.5));
        assert!(pos.hits_take_profit(98.0));
    }
}
