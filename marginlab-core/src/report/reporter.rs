//! Performance reporter: win rate, total P&L under a named mode, and the
//! liquidation / unrealized-position context that must travel with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::{self, PnlMode};
use crate::domain::{Position, Side, Trade};
use crate::engine::RunResult;
use crate::ledger::TradeLedger;

/// How a liquidation affects the reported total P&L.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationSeverity {
    /// Use the leveraged loss the ledger recorded for the liquidated trade.
    #[default]
    RecordedLoss,
    /// Treat any liquidation as losing the whole account: total P&L is zero.
    WipeOut,
}

/// A liquidated trade, surfaced next to the P&L figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    /// Position of the trade in the ledger.
    pub trade_index: usize,
    pub side: Side,
    pub entry_index: usize,
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub pnl_fraction: f64,
}

/// A position still open when the series ended, marked at the last close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrealizedPosition {
    pub side: Side,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub last_index: usize,
    pub last_close: f64,
    pub pnl_fraction: f64,
}

impl UnrealizedPosition {
    pub fn mark(position: &Position, last_index: usize, last_close: f64, leverage: f64) -> Self {
        Self {
            side: position.side,
            entry_index: position.entry_index,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            last_index,
            last_close,
            pnl_fraction: position.unrealized_pnl_fraction(last_close, leverage),
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub pnl_mode: PnlMode,
    pub liquidation_severity: LiquidationSeverity,
    pub initial_margin: f64,

    // ── Counts ──
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // ── P&L ──
    /// Account value after all closed trades under `pnl_mode`.
    pub total_pnl: f64,
    /// `total_pnl - initial_margin`.
    pub net_profit: f64,
    pub average_pnl_fraction: f64,
    pub best_trade: Option<f64>,
    pub worst_trade: Option<f64>,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    // ── Context ──
    pub liquidations: Vec<LiquidationEvent>,
    pub unrealized: Option<UnrealizedPosition>,
}

impl PerformanceReport {
    pub fn has_liquidations(&self) -> bool {
        !self.liquidations.is_empty()
    }
}

/// Derives summary figures from a ledger.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceReporter<'a> {
    ledger: &'a TradeLedger,
}

impl<'a> PerformanceReporter<'a> {
    pub fn new(ledger: &'a TradeLedger) -> Self {
        Self { ledger }
    }

    fn trades(&self) -> &'a [Trade] {
        self.ledger.trades()
    }

    /// `winning / total × 100`, or 0 for an empty ledger.
    pub fn win_rate(&self) -> f64 {
        metrics::win_rate_pct(self.trades())
    }

    /// Account value after every closed trade, keeping recorded liquidation losses.
    pub fn total_pnl(&self, mode: PnlMode, initial_margin: f64) -> f64 {
        self.total_pnl_with(mode, initial_margin, LiquidationSeverity::RecordedLoss)
    }

    /// Like [`total_pnl`](Self::total_pnl) with an explicit liquidation severity.
    pub fn total_pnl_with(
        &self,
        mode: PnlMode,
        initial_margin: f64,
        severity: LiquidationSeverity,
    ) -> f64 {
        if severity == LiquidationSeverity::WipeOut && self.ledger.liquidated_trades() > 0 {
            return 0.0;
        }
        metrics::final_equity(mode, initial_margin, self.trades())
    }

    pub fn liquidations(&self) -> Vec<LiquidationEvent> {
        self.trades()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_liquidation())
            .map(|(i, t)| LiquidationEvent {
                trade_index: i,
                side: t.side,
                entry_index: t.entry_index,
                exit_index: t.exit_index,
                exit_time: t.exit_time,
                exit_price: t.exit_price,
                pnl_fraction: t.pnl_fraction,
            })
            .collect()
    }

    /// Full report for a ledger, with an optional open position flagged as unrealized.
    pub fn report(
        &self,
        mode: PnlMode,
        severity: LiquidationSeverity,
        initial_margin: f64,
        unrealized: Option<UnrealizedPosition>,
    ) -> PerformanceReport {
        let trades = self.trades();
        let total_trades = trades.len();
        let winning_trades = self.ledger.winning_trades();
        let losing_trades = trades.iter().filter(|t| t.pnl_fraction < 0.0).count();
        let total_pnl = self.total_pnl_with(mode, initial_margin, severity);
        let path = metrics::equity_path(mode, initial_margin, trades);

        PerformanceReport {
            pnl_mode: mode,
            liquidation_severity: severity,
            initial_margin,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: self.win_rate(),
            total_pnl,
            net_profit: total_pnl - initial_margin,
            average_pnl_fraction: metrics::average_pnl_fraction(trades),
            best_trade: metrics::best_trade(trades),
            worst_trade: metrics::worst_trade(trades),
            profit_factor: metrics::profit_factor(trades),
            max_drawdown: metrics::max_drawdown(&path),
            max_consecutive_wins: metrics::max_consecutive_wins(trades),
            max_consecutive_losses: metrics::max_consecutive_losses(trades),
            liquidations: self.liquidations(),
            unrealized,
        }
    }
}

/// The run's open position marked at its last close, if it ended in a position.
pub fn unrealized_position(run: &RunResult) -> Option<UnrealizedPosition> {
    let position = run.open_position.as_ref()?;
    let last = run.last_bar?;
    Some(UnrealizedPosition::mark(
        position,
        last.index,
        last.close,
        run.params.leverage(),
    ))
}

/// Report a completed run using its own initial margin.
pub fn report_run(
    run: &RunResult,
    mode: PnlMode,
    severity: LiquidationSeverity,
) -> PerformanceReport {
    let report = PerformanceReporter::new(&run.ledger).report(
        mode,
        severity,
        run.params.initial_margin(),
        unrealized_position(run),
    );
    tracing::info!(
        mode = %mode,
        win_rate = report.win_rate,
        total_pnl = report.total_pnl,
        liquidations = report.liquidations.len(),
        unrealized = report.unrealized.is_some(),
        "performance report"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, TradeOutcome};
    use crate::engine::LastBar;
    use crate::params::StrategyParams;

    fn trade(entry: usize, exit: usize, pnl: f64, reason: ExitReason) -> Trade {
        let now = Utc::now();
        Trade {
            side: Side::Long,
            entry_index: entry,
            entry_time: now,
            entry_price: 100.0,
            exit_index: exit,
            exit_time: now,
            exit_price: 100.0 * (1.0 + pnl),
            outcome: reason.outcome(),
            exit_reason: reason,
            pnl_fraction: pnl,
        }
    }

    #[test]
    fn empty_ledger_reports_zero_win_rate() {
        let ledger = TradeLedger::new();
        let reporter = PerformanceReporter::new(&ledger);
        assert_eq!(reporter.win_rate(), 0.0);
        assert_eq!(reporter.total_pnl(PnlMode::Compounding, 100.0), 100.0);
    }

    #[test]
    fn both_modes_on_the_same_ledger() {
        let ledger = TradeLedger::from_trades([
            trade(1, 2, 0.10, ExitReason::TakeProfit),
            trade(3, 4, -0.05, ExitReason::StopLoss),
        ])
        .unwrap();
        let reporter = PerformanceReporter::new(&ledger);
        assert!((reporter.win_rate() - 50.0).abs() < 1e-12);
        assert!((reporter.total_pnl(PnlMode::Compounding, 100.0) - 104.5).abs() < 1e-9);
        assert!((reporter.total_pnl(PnlMode::Additive, 100.0) - 105.0).abs() < 1e-9);
    }

    #[test]
    fn liquidation_is_reported_under_either_severity() {
        let ledger = TradeLedger::from_trades([
            trade(1, 2, 0.10, ExitReason::TakeProfit),
            trade(3, 5, -0.25, ExitReason::Liquidation),
        ])
        .unwrap();
        let reporter = PerformanceReporter::new(&ledger);

        let recorded = reporter.report(
            PnlMode::Compounding,
            LiquidationSeverity::RecordedLoss,
            100.0,
            None,
        );
        assert!((recorded.total_pnl - 82.5).abs() < 1e-9);
        assert_eq!(recorded.liquidations.len(), 1);
        assert_eq!(recorded.liquidations[0].trade_index, 1);
        assert_eq!(recorded.liquidations[0].exit_index, 5);
        assert_eq!(ledger.trades()[1].outcome, TradeOutcome::Liquidated);

        let wiped = reporter.report(PnlMode::Additive, LiquidationSeverity::WipeOut, 100.0, None);
        assert_eq!(wiped.total_pnl, 0.0);
        assert_eq!(wiped.net_profit, -100.0);
        assert!(wiped.has_liquidations());
    }

    #[test]
    fn open_position_is_flagged_unrealized() {
        let params = StrategyParams::new(0.05, 0.025, 2.0, 100.0, 0.8).unwrap();
        let now = Utc::now();
        let run = RunResult {
            params,
            ledger: TradeLedger::new(),
            open_position: Some(Position::open(Side::Short, 7, now, 100.0, &params)),
            bar_count: 10,
            last_bar: Some(LastBar {
                index: 9,
                open_time: now,
                close: 99.0,
            }),
        };
        let report = report_run(&run, PnlMode::Compounding, LiquidationSeverity::RecordedLoss);
        let open = report.unrealized.unwrap();
        assert_eq!(open.entry_index, 7);
        assert_eq!(open.last_index, 9);
        assert!((open.pnl_fraction - 0.02).abs() < 1e-12);
        assert_eq!(report.total_trades, 0);
    }
}
