//! Kline loading for the runner.
//!
//! Two CSV shapes are accepted:
//! 1. Raw klines (the exchange column set: `open_time, open, high, low, close,
//!    volume, close_time, ...`), annotated later by the indicator collaborator.
//! 2. Precomputed bars that already carry `EMA, MACD, signalLine, RSI`.
//!    Leading rows with an empty indicator cell are warm-up rows and are
//!    dropped. Once a complete row has been seen, an empty cell is an error.
//!
//! Timestamps are epoch milliseconds. Extra columns are ignored.
//!
//! Synthetic klines are a developer-only mode for offline runs and tests.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use marginlab_core::domain::{Bar, Candle, DataError};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: {source}")]
    Data {
        path: PathBuf,
        #[source]
        source: DataError,
    },
}

/// Date filter applied while reading rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadOptions {
    /// Keep rows opening on or after this date.
    pub start: Option<NaiveDate>,
    /// Keep rows opening strictly before this date.
    pub end: Option<NaiveDate>,
}

impl LoadOptions {
    pub fn contains(&self, open_time: DateTime<Utc>) -> bool {
        let date = open_time.date_naive();
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date < e)
    }
}

/// Precomputed bar row. Indicator cells may be empty during warm-up.
#[derive(Debug, Deserialize)]
struct BarRow {
    open_time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    close_time: i64,
    #[serde(rename = "EMA")]
    ema: Option<f64>,
    #[serde(rename = "MACD")]
    macd: Option<f64>,
    #[serde(rename = "signalLine")]
    signal_line: Option<f64>,
    #[serde(rename = "RSI")]
    rsi: Option<f64>,
}

impl BarRow {
    fn missing_indicator(&self) -> Option<&'static str> {
        [
            ("EMA", self.ema),
            ("MACD", self.macd),
            ("signalLine", self.signal_line),
            ("RSI", self.rsi),
        ]
        .into_iter()
        .find_map(|(field, value)| value.is_none().then_some(field))
    }

    /// `Ok(None)` for a row with an empty indicator cell.
    fn into_bar(self, index: usize) -> Result<Option<Bar>, DataError> {
        let open_time = timestamp(index, "open_time", self.open_time)?;
        let close_time = timestamp(index, "close_time", self.close_time)?;
        let (Some(ema), Some(macd), Some(signal_line), Some(rsi)) =
            (self.ema, self.macd, self.signal_line, self.rsi)
        else {
            return Ok(None);
        };
        Ok(Some(Bar {
            open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            close_time,
            ema,
            macd,
            signal_line,
            rsi,
        }))
    }
}

fn timestamp(index: usize, field: &'static str, millis: i64) -> Result<DateTime<Utc>, DataError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(DataError::InvalidTimestamp {
            index,
            field,
            millis,
        })
}

/// Load raw klines from a headered CSV, keeping rows inside `opts`.
///
/// Rows must be in strictly increasing `open_time` order with a positive,
/// finite close.
pub fn load_candles_csv(path: &Path, opts: &LoadOptions) -> Result<Vec<Candle>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;

    let mut candles = Vec::new();
    for row in reader.deserialize::<Candle>() {
        let candle = row.map_err(csv_err)?;
        if opts.contains(candle.open_time) {
            candles.push(candle);
        }
    }

    check_candles(&candles).map_err(|source| LoadError::Data {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), rows = candles.len(), "loaded klines");
    Ok(candles)
}

/// Load precomputed bars, dropping leading warm-up rows and rows outside `opts`.
///
/// Error indices count data rows in the file, header excluded. An empty
/// indicator cell after the first complete row and an unrepresentable
/// timestamp anywhere are both fatal. Other bar checks happen in the engine.
pub fn load_bars_csv(path: &Path, opts: &LoadOptions) -> Result<Vec<Bar>, LoadError> {
    let data_err = |source| LoadError::Data {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(|source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut bars = Vec::new();
    let mut warmup_rows = 0usize;
    let mut warmed_up = false;
    for (index, row) in reader.deserialize::<BarRow>().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(field) = row.missing_indicator().filter(|_| warmed_up) {
            return Err(data_err(DataError::UndefinedField { index, field }));
        }
        let Some(bar) = row.into_bar(index).map_err(data_err)? else {
            warmup_rows += 1;
            continue;
        };
        warmed_up = true;
        if opts.contains(bar.open_time) {
            bars.push(bar);
        }
    }

    tracing::debug!(
        path = %path.display(),
        rows = bars.len(),
        warmup_rows,
        "loaded precomputed bars"
    );
    Ok(bars)
}

/// Ordering and price checks the indicator collaborator relies on.
pub fn check_candles(candles: &[Candle]) -> Result<(), DataError> {
    let mut previous: Option<DateTime<Utc>> = None;
    for (index, c) in candles.iter().enumerate() {
        if !c.close.is_finite() {
            return Err(DataError::UndefinedField {
                index,
                field: "close",
            });
        }
        if c.close <= 0.0 {
            return Err(DataError::NonPositivePrice {
                index,
                field: "close",
                value: c.close,
            });
        }
        if let Some(prev) = previous {
            if c.open_time <= prev {
                return Err(DataError::NonMonotonicTimestamp {
                    index,
                    previous: prev,
                    current: c.open_time,
                });
            }
        }
        previous = Some(c.open_time);
    }
    Ok(())
}

/// BLAKE3 over every field of every bar, in order.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.open_time.timestamp_millis().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
        hasher.update(&bar.close_time.timestamp_millis().to_le_bytes());
        hasher.update(&bar.ema.to_le_bytes());
        hasher.update(&bar.macd.to_le_bytes());
        hasher.update(&bar.signal_line.to_le_bytes());
        hasher.update(&bar.rsi.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Interval between synthetic klines.
pub const SYNTHETIC_INTERVAL_MINUTES: i64 = 15;

/// Generate `n` deterministic 15-minute klines from a random walk starting at 100.
///
/// The same seed always yields the same series.
pub fn synthetic_candles(n: usize, seed: u64) -> Vec<Candle> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let interval = chrono::Duration::minutes(SYNTHETIC_INTERVAL_MINUTES);
    let mut open_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
    let mut price = 100.0_f64;
    let mut candles = Vec::with_capacity(n);

    for _ in 0..n {
        let step: f64 = rng.gen_range(-0.008..0.008);
        let open = price;
        let close = (price * (1.0 + step)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.003));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.003));
        let volume = rng.gen_range(10.0..500.0);

        candles.push(Candle {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time: open_time + interval - chrono::Duration::milliseconds(1),
        });

        price = close;
        open_time += interval;
    }

    candles
}

/// Write klines as a headered CSV in the exchange column order.
pub fn write_candles_csv(path: &Path, candles: &[Candle]) -> Result<(), LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for candle in candles {
        writer.serialize(candle).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| csv_err(e.into()))?;
    Ok(())
}
