//! Entry rule: MACD/signal-line sign agreement, EMA trend side, RSI extremes.
//!
//! The rule reads only the current bar, so it cannot see future data.

use crate::domain::{Bar, Side};

/// RSI level below which a long entry is allowed.
pub const RSI_OVERSOLD: f64 = 30.0;
/// RSI level above which a short entry is allowed.
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// Long: MACD crossed above a negative signal line while price sits below
/// the EMA in oversold territory.
pub fn is_long_entry(bar: &Bar) -> bool {
    bar.macd > bar.signal_line
        && bar.macd < 0.0
        && bar.signal_line < 0.0
        && bar.close < bar.ema
        && bar.rsi < RSI_OVERSOLD
}

/// Short: the mirror image of [`is_long_entry`].
pub fn is_short_entry(bar: &Bar) -> bool {
    bar.macd < bar.signal_line
        && bar.macd > 0.0
        && bar.signal_line > 0.0
        && bar.close > bar.ema
        && bar.rsi > RSI_OVERBOUGHT
}

/// The side to enter on this bar, if any. The two conditions cannot both
/// hold because their MACD sign constraints are disjoint.
pub fn entry_signal(bar: &Bar) -> Option<Side> {
    if is_long_entry(bar) {
        Some(Side::Long)
    } else if is_short_entry(bar) {
        Some(Side::Short)
    } else {
        None
    }
}
