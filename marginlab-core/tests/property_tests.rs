//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. At most one position at a time: trades never overlap
//! 2. Liquidation precedence: a TP/SL exit never happens at a liquidating close
//! 3. Exits fire on the first qualifying bar
//! 4. An open position at the end of the series is reported, not closed
//! 5. The compounding and additive totals agree with their formulas (the
//!    compounding product is exact until a trade loses the whole margin)
//! 6. No look-ahead: rewriting bars after index i leaves trades closed by i unchanged

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use marginlab_core::domain::{Bar, ExitReason, Position, Side};
use marginlab_core::engine::{run_backtest, PositionStateMachine};
use marginlab_core::params::StrategyParams;
use marginlab_core::report::{PerformanceReporter, PnlMode};

#[derive(Debug, Clone, Copy)]
enum Kind {
    Neutral,
    Long,
    Short,
}

fn arb_kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        3 => Just(Kind::Neutral),
        1 => Just(Kind::Long),
        1 => Just(Kind::Short),
    ]
}

fn arb_params() -> impl Strategy<Value = StrategyParams> {
    (0.01..0.5_f64, 0.01..0.5_f64, 1.0..50.0_f64, 0.1..0.95_f64).prop_map(
        |(tp, sl, lev, mmr)| StrategyParams::new(tp, sl, lev, 100.0, mmr).unwrap(),
    )
}

fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((arb_kind(), 50.0..150.0_f64), 2..120).prop_map(|specs| {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (kind, close))| {
                let open_time = base + chrono::Duration::minutes(15 * i as i64);
                let (ema, macd, signal_line, rsi) = match kind {
                    Kind::Neutral => (close, 0.0, 0.0, 50.0),
                    Kind::Long => (close * 1.1, -0.5, -0.8, 20.0),
                    Kind::Short => (close * 0.9, 0.5, 0.8, 80.0),
                };
                Bar {
                    open_time,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                    close_time: open_time + chrono::Duration::minutes(15),
                    ema,
                    macd,
                    signal_line,
                    rsi,
                }
            })
            .collect()
    })
}

fn reopen(trade_side: Side, entry: usize, bars: &[Bar], params: &StrategyParams) -> Position {
    let bar = &bars[entry];
    Position::open(trade_side, entry, bar.open_time, bar.close, params)
}

proptest! {
    #[test]
    fn trades_never_overlap(params in arb_params(), bars in arb_bars()) {
        let run = run_backtest(&params, &bars).unwrap();
        let mut previous_exit: Option<usize> = None;
        for trade in run.ledger.trades() {
            prop_assert!(trade.entry_index >= 1);
            prop_assert!(trade.exit_index > trade.entry_index);
            if let Some(prev) = previous_exit {
                prop_assert!(trade.entry_index > prev);
            }
            previous_exit = Some(trade.exit_index);
        }
        if let (Some(open), Some(prev)) = (run.open_position, previous_exit) {
            prop_assert!(open.entry_index > prev);
        }
    }

    #[test]
    fn liquidation_takes_precedence(params in arb_params(), bars in arb_bars()) {
        let run = run_backtest(&params, &bars).unwrap();
        for trade in run.ledger.trades() {
            let position = reopen(trade.side, trade.entry_index, &bars, &params);
            let liquidating = position.is_liquidated_at(trade.exit_price);
            match trade.exit_reason {
                ExitReason::Liquidation => prop_assert!(liquidating),
                ExitReason::TakeProfit | ExitReason::StopLoss => prop_assert!(!liquidating),
            }
            prop_assert_eq!(trade.exit_reason.outcome(), trade.outcome);
        }
    }

    #[test]
    fn exits_fire_on_first_qualifying_bar(params in arb_params(), bars in arb_bars()) {
        let machine = PositionStateMachine::new(params);
        let run = run_backtest(&params, &bars).unwrap();
        for trade in run.ledger.trades() {
            let position = reopen(trade.side, trade.entry_index, &bars, &params);
            for bar in &bars[trade.entry_index + 1..trade.exit_index] {
                prop_assert!(machine.exit_reason(&position, bar.close).is_none());
            }
            prop_assert_eq!(
                machine.exit_reason(&position, trade.exit_price),
                Some(trade.exit_reason)
            );
            let expected = trade.side.pnl_fraction(trade.entry_price, trade.exit_price, params.leverage());
            prop_assert!((trade.pnl_fraction - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn open_position_is_left_open(params in arb_params(), bars in arb_bars()) {
        let machine = PositionStateMachine::new(params);
        let run = run_backtest(&params, &bars).unwrap();
        if let Some(position) = run.open_position {
            for bar in &bars[position.entry_index + 1..] {
                prop_assert!(machine.exit_reason(&position, bar.close).is_none());
            }
            let last = run.last_bar.unwrap();
            prop_assert_eq!(last.index, bars.len() - 1);
        }
        prop_assert_eq!(run.bar_count, bars.len());
    }

    #[test]
    fn totals_match_formulas(params in arb_params(), bars in arb_bars()) {
        let run = run_backtest(&params, &bars).unwrap();
        let reporter = PerformanceReporter::new(&run.ledger);
        let pnls: Vec<f64> = run.ledger.iter().map(|t| t.pnl_fraction).collect();

        let additive = reporter.total_pnl(PnlMode::Additive, 100.0);
        let expected_additive = 100.0 * (1.0 + pnls.iter().sum::<f64>());
        prop_assert!((additive - expected_additive).abs() < 1e-6);

        let compounding = reporter.total_pnl(PnlMode::Compounding, 100.0);
        if pnls.iter().all(|p| *p > -1.0) {
            let expected: f64 = 100.0 * pnls.iter().map(|p| 1.0 + p).product::<f64>();
            prop_assert!(
                (compounding - expected).abs() <= 1e-9 * expected.abs().max(1.0),
                "compounding {} != product {}",
                compounding,
                expected
            );
        } else {
            // A trade that loses the whole margin leaves nothing to compound.
            prop_assert_eq!(compounding, 0.0);
        }

        let win_rate = reporter.win_rate();
        prop_assert!((0.0..=100.0).contains(&win_rate));
    }

    #[test]
    fn future_bars_do_not_change_past_trades(
        params in arb_params(),
        bars in arb_bars(),
        replacement in arb_bars(),
        cut in 1usize..120,
    ) {
        let cut = cut.min(bars.len() - 1);
        let mut altered = bars.clone();
        for (offset, bar) in altered.iter_mut().skip(cut + 1).enumerate() {
            let fresh = &replacement[offset % replacement.len()];
            *bar = Bar {
                open_time: bar.open_time,
                close_time: bar.close_time,
                ..fresh.clone()
            };
        }

        let original = run_backtest(&params, &bars).unwrap();
        let rewritten = run_backtest(&params, &altered).unwrap();
        let settled = |run: &marginlab_core::RunResult| -> Vec<_> {
            run.ledger
                .iter()
                .filter(|t| t.exit_index <= cut)
                .cloned()
                .collect()
        };
        prop_assert_eq!(settled(&original), settled(&rewritten));
    }
}
