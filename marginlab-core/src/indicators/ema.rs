//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (window + 1).
//! Seed: the first defined observation. Values before `window` observations
//! have been seen are NaN. Leading NaN inputs are skipped; a NaN after the
//! series has started taints every later value.

pub fn ema(values: &[f64], window: usize) -> Vec<f64> {
    let alpha = 2.0 / (window as f64 + 1.0);
    exponential_smoothing(values, alpha, window)
}

/// Shared recursion for EMA-style smoothers with an explicit `alpha`.
pub(crate) fn exponential_smoothing(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if min_periods == 0 {
        return result;
    }

    let start = match values.iter().position(|v| !v.is_nan()) {
        Some(s) => s,
        None => return result,
    };

    let mut prev = values[start];
    let mut seen = 1;
    if seen >= min_periods {
        result[start] = prev;
    }

    for i in (start + 1)..n {
        let v = values[i];
        if v.is_nan() {
            return result;
        }
        prev = alpha * v + (1.0 - alpha) * prev;
        seen += 1;
        if seen >= min_periods {
            result[i] = prev;
        }
    }

    result
}
