//! Look-ahead contamination tests for the indicator collaborator.
//!
//! No indicator value at bar t may depend on price data from bar t+1 or later.
//!
//! Method: compute on a truncated series and on the full series, then assert
//! the shared prefix is identical.

use chrono::{TimeZone, Utc};
use marginlab_core::domain::Candle;
use marginlab_core::indicators::{annotate, compute_bars, ema, macd, rsi};
use marginlab_core::params::IndicatorWindows;

fn make_closes(n: usize) -> Vec<f64> {
    let mut price = 100.0;
    (0..n)
        .map(|i| {
            let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
            let change = ((seed % 200) as f64 - 100.0) * 0.05;
            price = (price + change).max(10.0);
            price
        })
        .collect()
}

fn make_candles(closes: &[f64]) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open_time = base + chrono::Duration::hours(i as i64);
            Candle {
                open_time,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
                close_time: open_time + chrono::Duration::hours(1),
            }
        })
        .collect()
}

fn assert_prefix_identical(name: &str, truncated: &[f64], full: &[f64]) {
    for (i, (t, f)) in truncated.iter().zip(full).enumerate() {
        if t.is_nan() && f.is_nan() {
            continue;
        }
        assert!(
            !t.is_nan() && !f.is_nan(),
            "{name}: NaN mismatch at bar {i} (truncated={t}, full={f})"
        );
        assert!(
            (t - f).abs() < 1e-10,
            "{name}: look-ahead contamination at bar {i}: truncated={t}, full={f}"
        );
    }
}

#[test]
fn ema_no_lookahead() {
    let closes = make_closes(400);
    assert_prefix_identical("ema", &ema(&closes[..250], 200), &ema(&closes, 200));
}

#[test]
fn macd_no_lookahead() {
    let closes = make_closes(200);
    let (line_t, signal_t) = macd(&closes[..100], 12, 26, 9);
    let (line_f, signal_f) = macd(&closes, 12, 26, 9);
    assert_prefix_identical("macd", &line_t, &line_f);
    assert_prefix_identical("signal", &signal_t, &signal_f);
}

#[test]
fn rsi_no_lookahead() {
    let closes = make_closes(200);
    assert_prefix_identical("rsi", &rsi(&closes[..100], 14), &rsi(&closes, 14));
}

#[test]
fn annotated_bars_no_lookahead() {
    let candles = make_candles(&make_closes(500));
    let windows = IndicatorWindows::default();
    let truncated = compute_bars(&candles[..300], &windows).unwrap();
    let full = compute_bars(&candles, &windows).unwrap();
    for (t, f) in truncated.iter().zip(&full) {
        assert_eq!(t.open_time, f.open_time);
        assert_prefix_identical("EMA", &[t.ema], &[f.ema]);
        assert_prefix_identical("MACD", &[t.macd], &[f.macd]);
        assert_prefix_identical("signalLine", &[t.signal_line], &[f.signal_line]);
        assert_prefix_identical("RSI", &[t.rsi], &[f.rsi]);
    }

    let a = annotate(&candles[..300], &windows).unwrap();
    let b = annotate(&candles, &windows).unwrap();
    assert_eq!(a.bars(), &b.bars()[..a.len()]);
}
