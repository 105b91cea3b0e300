//! Trade-ledger metrics: pure functions over closed trades.
//!
//! Every metric is a pure function: trade list (and margin) in, scalar out.

use serde::{Deserialize, Serialize};

use crate::domain::Trade;

/// How per-trade returns combine into account value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlMode {
    /// The full margin is reinvested each trade:
    /// `initial_margin × Π(1 + pnl_fraction)`, floored at zero.
    #[default]
    Compounding,
    /// A fixed margin is staked on every trade with no reinvestment:
    /// `initial_margin × (1 + Σ pnl_fraction)`.
    Additive,
}

impl PnlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PnlMode::Compounding => "compounding",
            PnlMode::Additive => "additive",
        }
    }
}

impl std::fmt::Display for PnlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PnlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compounding" | "compound" => Ok(PnlMode::Compounding),
            "additive" | "sum" => Ok(PnlMode::Additive),
            other => Err(format!(
                "unknown pnl mode '{other}' (expected 'compounding' or 'additive')"
            )),
        }
    }
}

/// Win rate in percent. Zero for an empty trade list.
pub fn win_rate_pct(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64 * 100.0
}

/// Account value after each trade, starting with `initial_margin`.
///
/// The returned path has `trades.len() + 1` points.
pub fn equity_path(mode: PnlMode, initial_margin: f64, trades: &[Trade]) -> Vec<f64> {
    let mut path = Vec::with_capacity(trades.len() + 1);
    path.push(initial_margin);
    match mode {
        PnlMode::Compounding => {
            let mut equity = initial_margin;
            for t in trades {
                // A wiped-out account stays at zero.
                equity = (equity * (1.0 + t.pnl_fraction)).max(0.0);
                path.push(equity);
            }
        }
        PnlMode::Additive => {
            let mut cumulative = 0.0;
            for t in trades {
                cumulative += t.pnl_fraction;
                path.push(initial_margin * (1.0 + cumulative));
            }
        }
    }
    path
}

/// Final account value under `mode`.
pub fn final_equity(mode: PnlMode, initial_margin: f64, trades: &[Trade]) -> f64 {
    equity_path(mode, initial_margin, trades)
        .last()
        .copied()
        .unwrap_or(initial_margin)
}

/// Maximum drawdown of an equity path as a negative fraction (e.g. -0.15).
pub fn max_drawdown(path: &[f64]) -> f64 {
    if path.len() < 2 {
        return 0.0;
    }
    let mut peak = path[0];
    let mut max_dd = 0.0_f64;
    for &eq in path {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Gross winning returns over gross losing returns, capped at 100.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.pnl_fraction > 0.0)
        .map(|t| t.pnl_fraction)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl_fraction < 0.0)
        .map(|t| t.pnl_fraction.abs())
        .sum();

    if gross_loss < 1e-12 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Mean leveraged return per trade.
pub fn average_pnl_fraction(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.pnl_fraction).sum::<f64>() / trades.len() as f64
}

pub fn best_trade(trades: &[Trade]) -> Option<f64> {
    trades.iter().map(|t| t.pnl_fraction).reduce(f64::max)
}

pub fn worst_trade(trades: &[Trade]) -> Option<f64> {
    trades.iter().map(|t| t.pnl_fraction).reduce(f64::min)
}

pub fn max_consecutive_wins(trades: &[Trade]) -> usize {
    longest_run(trades, |t| t.pnl_fraction > 0.0)
}

/// Break-even trades end a losing streak without extending it.
pub fn max_consecutive_losses(trades: &[Trade]) -> usize {
    longest_run(trades, |t| t.pnl_fraction < 0.0)
}

fn longest_run(trades: &[Trade], pred: impl Fn(&Trade) -> bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for t in trades {
        if pred(t) {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
