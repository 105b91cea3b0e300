//! Domain types for MarginLab

pub mod bar;
pub mod position;
pub mod series;
pub mod trade;

pub use bar::{Bar, Candle};
pub use position::{Position, Side, Thresholds};
pub use series::{check_bar, BarSeries, DataError};
pub use trade::{ExitReason, Trade, TradeOutcome};
