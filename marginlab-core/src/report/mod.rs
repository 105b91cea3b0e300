//! Performance reporting over the trade ledger.

pub mod metrics;
pub mod reporter;

pub use metrics::PnlMode;
pub use reporter::{
    report_run, unrealized_position, LiquidationEvent, LiquidationSeverity, PerformanceReport,
    PerformanceReporter, UnrealizedPosition,
};
