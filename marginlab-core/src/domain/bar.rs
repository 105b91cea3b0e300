//! Candle and Bar: the market data units consumed by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw OHLCV kline as delivered by the market-data source.
///
/// Timestamps are serialized as epoch milliseconds, matching the exchange
/// kline format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
}

/// One kline plus the indicator values the entry rule reads.
///
/// Immutable once loaded. Column names on the wire follow the indicator
/// collaborator's output (`EMA`, `MACD`, `signalLine`, `RSI`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub close_time: DateTime<Utc>,
    #[serde(rename = "EMA")]
    pub ema: f64,
    #[serde(rename = "MACD")]
    pub macd: f64,
    #[serde(rename = "signalLine")]
    pub signal_line: f64,
    #[serde(rename = "RSI")]
    pub rsi: f64,
}

impl Bar {
    /// Build a bar from a candle and its indicator values.
    pub fn from_candle(candle: &Candle, ema: f64, macd: f64, signal_line: f64, rsi: f64) -> Self {
        Self {
            open_time: candle.open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            close_time: candle.close_time,
            ema,
            macd,
            signal_line,
            rsi,
        }
    }

    /// Name of the first field the engine reads that is NaN or infinite.
    ///
    /// Checked in column order: close, EMA, MACD, signalLine, RSI.
    pub fn first_undefined_field(&self) -> Option<&'static str> {
        [
            ("close", self.close),
            ("EMA", self.ema),
            ("MACD", self.macd),
            ("signalLine", self.signal_line),
            ("RSI", self.rsi),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
    }

    /// True when every indicator column is defined.
    pub fn is_complete(&self) -> bool {
        self.first_undefined_field().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        Bar {
            open_time: t,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 12.5,
            close_time: t + chrono::Duration::minutes(15) - chrono::Duration::milliseconds(1),
            ema: 101.0,
            macd: -0.4,
            signal_line: -0.6,
            rsi: 28.0,
        }
    }

    #[test]
    fn complete_bar_has_no_undefined_field() {
        assert!(sample_bar().is_complete());
    }

    #[test]
    fn nan_indicator_is_named() {
        let mut bar = sample_bar();
        bar.signal_line = f64::NAN;
        assert_eq!(bar.first_undefined_field(), Some("signalLine"));
    }

    #[test]
    fn infinite_close_is_reported_before_indicators() {
        let mut bar = sample_bar();
        bar.close = f64::INFINITY;
        bar.rsi = f64::NAN;
        assert_eq!(bar.first_undefined_field(), Some("close"));
    }

    #[test]
    fn json_uses_indicator_column_names() {
        let json = serde_json::to_value(sample_bar()).unwrap();
        assert!(json.get("signalLine").is_some());
        assert!(json.get("EMA").is_some());
        assert_eq!(json["open_time"], 1_717_200_000_000_i64);
    }
}
