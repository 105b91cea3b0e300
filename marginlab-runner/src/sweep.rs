//! Parameter sweep over take-profit, stop-loss, and leverage.
//!
//! Every combination runs against the same read-only bars, in parallel.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use marginlab_core::params::{IndicatorWindows, StrategyParams};

use crate::config::ReportConfig;
use crate::runner::{run_prepared, BacktestResult, PreparedData};

/// Values to try for each swept parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub take_profit: Vec<f64>,
    pub stop_loss: Vec<f64>,
    pub leverage: Vec<f64>,
}

impl SweepGrid {
    /// Total number of combinations, valid or not.
    pub fn size(&self) -> usize {
        self.take_profit.len() * self.stop_loss.len() * self.leverage.len()
    }

    /// Every `(tp, sl, leverage)` combination in grid order.
    pub fn combinations(&self) -> Vec<(f64, f64, f64)> {
        let mut out = Vec::with_capacity(self.size());
        for &tp in &self.take_profit {
            for &sl in &self.stop_loss {
                for &lev in &self.leverage {
                    out.push((tp, sl, lev));
                }
            }
        }
        out
    }
}

/// One completed sweep point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepEntry {
    pub take_profit: f64,
    pub stop_loss: f64,
    pub leverage: f64,
    pub result: BacktestResult,
}

/// A combination that could not be run, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRejection {
    pub take_profit: f64,
    pub stop_loss: f64,
    pub leverage: f64,
    pub reason: String,
}

/// Outcome of a sweep: ranked entries and the rejected combinations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepResults {
    /// Sorted by total P&L, best first.
    pub entries: Vec<SweepEntry>,
    pub rejected: Vec<SweepRejection>,
}

impl SweepResults {
    pub fn best(&self) -> Option<&SweepEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run every grid point, keeping margin and maintenance ratio from `base`.
pub fn run_sweep(
    grid: &SweepGrid,
    base: &StrategyParams,
    windows: &IndicatorWindows,
    report: &ReportConfig,
    data: &PreparedData,
) -> SweepResults {
    let outcomes: Vec<Result<SweepEntry, SweepRejection>> = grid
        .combinations()
        .par_iter()
        .map(|&(tp, sl, lev)| {
            let reject = |reason: String| SweepRejection {
                take_profit: tp,
                stop_loss: sl,
                leverage: lev,
                reason,
            };
            let params = StrategyParams::new(
                tp,
                sl,
                lev,
                base.initial_margin(),
                base.maintenance_margin_ratio(),
            )
            .map_err(|e| reject(e.to_string()))?;
            let result =
                run_prepared(&params, windows, report, data).map_err(|e| reject(e.to_string()))?;
            Ok(SweepEntry {
                take_profit: tp,
                stop_loss: sl,
                leverage: lev,
                result,
            })
        })
        .collect();

    let mut results = SweepResults::default();
    for outcome in outcomes {
        match outcome {
            Ok(entry) => results.entries.push(entry),
            Err(rejection) => {
                tracing::warn!(
                    take_profit = rejection.take_profit,
                    stop_loss = rejection.stop_loss,
                    leverage = rejection.leverage,
                    reason = %rejection.reason,
                    "sweep point rejected"
                );
                results.rejected.push(rejection);
            }
        }
    }
    results
        .entries
        .sort_by(|a, b| b.result.report.total_pnl.total_cmp(&a.result.report.total_pnl));

    tracing::info!(
        points = grid.size(),
        completed = results.entries.len(),
        rejected = results.rejected.len(),
        "sweep complete"
    );
    results
}
