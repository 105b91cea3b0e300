//! MACD line and signal line.
//!
//! MACD = EMA(close, fast) - EMA(close, slow); signal = EMA(MACD, signal).

use super::ema::ema;

/// Returns `(macd, signal_line)`, each the same length as `closes`.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>) {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);
    (line, signal_line)
}
