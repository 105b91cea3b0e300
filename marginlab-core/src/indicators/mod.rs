//! Turns raw candles into bars the engine can read.
//!
//! Indicators are precomputed once over the whole candle series. No value at
//! index t depends on candles after t. Warm-up rows (any indicator undefined)
//! are dropped so the engine never sees an incomplete bar.

pub mod ema;
pub mod macd;
pub mod rsi;

pub use ema::ema;
pub use macd::macd;
pub use rsi::rsi;

use crate::domain::{Bar, BarSeries, Candle};
use crate::params::{ConfigError, IndicatorWindows};

/// Compute EMA, MACD, signal line and RSI for every candle, keeping warm-up rows as NaN.
pub fn compute_bars(candles: &[Candle], windows: &IndicatorWindows) -> Result<Vec<Bar>, ConfigError> {
    windows.validate()?;

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema_values = ema(&closes, windows.ema);
    let (macd_line, signal_line) = macd(
        &closes,
        windows.macd_fast,
        windows.macd_slow,
        windows.macd_signal,
    );
    let rsi_values = rsi(&closes, windows.rsi);

    Ok(candles
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::from_candle(c, ema_values[i], macd_line[i], signal_line[i], rsi_values[i]))
        .collect())
}

/// Compute indicators and drop every row with an undefined value.
pub fn annotate(candles: &[Candle], windows: &IndicatorWindows) -> Result<BarSeries, ConfigError> {
    let bars = compute_bars(candles, windows)?;
    let before = bars.len();
    let complete: Vec<Bar> = bars.into_iter().filter(Bar::is_complete).collect();
    tracing::debug!(
        candles = before,
        dropped = before - complete.len(),
        "indicator warm-up rows dropped"
    );
    Ok(BarSeries::from_bars(complete))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        use chrono::{TimeZone, Utc};
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open_time = base + chrono::Duration::minutes(15 * i as i64);
                Candle {
                    open_time,
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 10.0,
                    close_time: open_time + chrono::Duration::minutes(15)
                        - chrono::Duration::milliseconds(1),
                }
            })
            .collect()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.2).sin() * 5.0).collect()
    }

    #[test]
    fn annotate_drops_exactly_the_warmup() {
        let candles = make_candles(&wave(300));
        let windows = IndicatorWindows::default();
        let series = annotate(&candles, &windows).unwrap();
        assert_eq!(series.len(), 300 - windows.warmup());
        assert_eq!(series.bars()[0].open_time, candles[windows.warmup()].open_time);
        assert!(series.validate().is_ok());
    }

    #[test]
    fn short_input_yields_empty_series() {
        let candles = make_candles(&wave(50));
        let series = annotate(&candles, &IndicatorWindows::default()).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn small_windows_pass_through() {
        let windows = IndicatorWindows {
            ema: 5,
            macd_fast: 3,
            macd_slow: 6,
            macd_signal: 3,
            rsi: 4,
        };
        let candles = make_candles(&wave(40));
        let series = annotate(&candles, &windows).unwrap();
        assert_eq!(series.len(), 40 - windows.warmup());
    }

    #[test]
    fn invalid_windows_are_a_config_error() {
        let windows = IndicatorWindows {
            rsi: 0,
            ..Default::default()
        };
        assert!(matches!(
            annotate(&make_candles(&wave(10)), &windows),
            Err(ConfigError::ZeroWindow { name: "rsi" })
        ));
    }
}
