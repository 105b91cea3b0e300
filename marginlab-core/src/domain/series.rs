//! BarSeries: the ordered, read-only bar sequence a backtest folds over.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::bar::Bar;

/// Fatal problems with the input data. Every variant names the bar index.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("bar series is empty")]
    EmptySeries,

    #[error("bar {index}: field '{field}' is undefined (NaN or infinite)")]
    UndefinedField { index: usize, field: &'static str },

    #[error("bar {index}: field '{field}' must be positive, got {value}")]
    NonPositivePrice {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("bar {index}: open_time {current} is not after previous open_time {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("bar {index}: {field} {millis} is not a valid epoch-millisecond timestamp")]
    InvalidTimestamp {
        index: usize,
        field: &'static str,
        millis: i64,
    },
}

impl DataError {
    /// Index of the offending bar, if the error is tied to one.
    pub fn bar_index(&self) -> Option<usize> {
        match self {
            DataError::EmptySeries => None,
            DataError::UndefinedField { index, .. }
            | DataError::NonPositivePrice { index, .. }
            | DataError::NonMonotonicTimestamp { index, .. }
            | DataError::InvalidTimestamp { index, .. } => Some(*index),
        }
    }
}

/// Check one bar against its predecessor's open time.
///
/// This is the per-bar contract the engine enforces before evaluating a bar.
pub fn check_bar(
    index: usize,
    bar: &Bar,
    previous_open: Option<DateTime<Utc>>,
) -> Result<(), DataError> {
    if let Some(field) = bar.first_undefined_field() {
        return Err(DataError::UndefinedField { index, field });
    }
    if bar.close <= 0.0 {
        return Err(DataError::NonPositivePrice {
            index,
            field: "close",
            value: bar.close,
        });
    }
    if let Some(previous) = previous_open {
        if bar.open_time <= previous {
            return Err(DataError::NonMonotonicTimestamp {
                index,
                previous,
                current: bar.open_time,
            });
        }
    }
    Ok(())
}

/// Ordered bar sequence shared read-only between backtests.
///
/// Cloning is cheap (the bars sit behind an `Arc`), so one series can feed
/// many runs with different parameters in parallel.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    bars: Arc<[Bar]>,
}

impl BarSeries {
    /// Wrap bars without checking them. The engine validates each bar as it
    /// folds, so errors surface at the first offending index.
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        Self { bars: bars.into() }
    }

    /// Wrap bars after checking the whole sequence up front.
    pub fn validated(bars: Vec<Bar>) -> Result<Self, DataError> {
        let series = Self::from_bars(bars);
        series.validate()?;
        Ok(series)
    }

    /// Return the first data error in the series, if any.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.bars.is_empty() {
            return Err(DataError::EmptySeries);
        }
        let mut previous = None;
        for (index, bar) in self.bars.iter().enumerate() {
            check_bar(index, bar, previous)?;
            previous = Some(bar.open_time);
        }
        Ok(())
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn first_open_time(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.open_time)
    }

    pub fn last_open_time(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.open_time)
    }
}

impl From<Vec<Bar>> for BarSeries {
    fn from(bars: Vec<Bar>) -> Self {
        Self::from_bars(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(minute: i64, close: f64) -> Bar {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minute);
        Bar {
            open_time: t,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            close_time: t + chrono::Duration::seconds(59),
            ema: close,
            macd: 0.0,
            signal_line: 0.0,
            rsi: 50.0,
        }
    }

    #[test]
    fn empty_series_fails_validation() {
        assert_eq!(BarSeries::default().validate(), Err(DataError::EmptySeries));
    }

    #[test]
    fn ordered_series_validates() {
        let series = BarSeries::validated(vec![bar_at(0, 10.0), bar_at(1, 11.0)]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.get(1).unwrap().close, 11.0);
    }

    #[test]
    fn duplicate_timestamp_is_rejected_at_its_index() {
        let err = BarSeries::validated(vec![bar_at(0, 10.0), bar_at(1, 11.0), bar_at(1, 12.0)])
            .unwrap_err();
        assert!(matches!(err, DataError::NonMonotonicTimestamp { index: 2, .. }));
        assert_eq!(err.bar_index(), Some(2));
    }

    #[test]
    fn nan_rsi_is_rejected_with_field_name() {
        let mut bad = bar_at(1, 11.0);
        bad.rsi = f64::NAN;
        let err = BarSeries::validated(vec![bar_at(0, 10.0), bad]).unwrap_err();
        assert_eq!(err, DataError::UndefinedField { index: 1, field: "RSI" });
        assert!(err.to_string().contains("RSI"));
    }

    #[test]
    fn zero_close_is_rejected() {
        let err = check_bar(3, &bar_at(0, 0.0), None).unwrap_err();
        assert!(matches!(err, DataError::NonPositivePrice { index: 3, .. }));
    }
}
