//! Relative Strength Index (RSI).
//!
//! Gains and losses of consecutive closes are smoothed with alpha = 1 / window.
//! The first change is taken as zero. RSI = 100 - 100 / (1 + avg_gain / avg_loss),
//! and 100 whenever avg_loss is zero. Values before `window` observations are NaN.

use super::ema::exponential_smoothing;

pub fn rsi(closes: &[f64], window: usize) -> Vec<f64> {
    let n = closes.len();
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let change = closes[i] - closes[i - 1];
        if change.is_nan() {
            gains[i] = f64::NAN;
            losses[i] = f64::NAN;
        } else if change > 0.0 {
            gains[i] = change;
        } else {
            losses[i] = -change;
        }
    }

    let alpha = 1.0 / window.max(1) as f64;
    let avg_gain = exponential_smoothing(&gains, alpha, window);
    let avg_loss = exponential_smoothing(&losses, alpha, window);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&g, &l)| {
            if g.is_nan() || l.is_nan() {
                f64::NAN
            } else if l == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_then_defined() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 3) as f64).collect();
        let out = rsi(&closes, 14);
        assert!(out[12].is_nan());
        assert!(!out[13].is_nan());
    }

    #[test]
    fn only_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&closes, 14);
        assert_eq!(out[19], 100.0);
    }

    #[test]
    fn only_losses_is_0() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&closes, 14);
        assert!(out[19].abs() < 1e-12);
    }

    #[test]
    fn bounded_between_0_and_100() {
        let closes: Vec<f64> = (0..100)
            .map(|i| 100.0 + ((i * 7919) % 13) as f64 - 6.0)
            .collect();
        for v in rsi(&closes, 14).into_iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
