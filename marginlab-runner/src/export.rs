//! Result export: CSV trade ledger and versioned JSON result.
//!
//! Persisted JSON carries a `schema_version`. Newer versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use marginlab_core::domain::Trade;

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_result_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_result_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the trade ledger as CSV.
///
/// Columns: trade, side, entry_index, entry_time, entry_price, exit_index,
/// exit_time, exit_price, outcome, exit_reason, pnl_fraction, bars_held
pub fn export_ledger_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "trade",
        "side",
        "entry_index",
        "entry_time",
        "entry_price",
        "exit_index",
        "exit_time",
        "exit_price",
        "outcome",
        "exit_reason",
        "pnl_fraction",
        "bars_held",
    ])?;

    for (i, t) in trades.iter().enumerate() {
        wtr.write_record([
            &(i + 1).to_string(),
            t.side.as_str(),
            &t.entry_index.to_string(),
            &t.entry_time.to_rfc3339(),
            &format!("{:.6}", t.entry_price),
            &t.exit_index.to_string(),
            &t.exit_time.to_rfc3339(),
            &format!("{:.6}", t.exit_price),
            &format!("{:?}", t.outcome),
            &format!("{:?}", t.exit_reason),
            &format!("{:.6}", t.pnl_fraction),
            &t.bars_held().to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for a run under `output_dir/{symbol}_{run_id prefix}/`:
/// - `result.json`: the full `BacktestResult`
/// - `ledger.csv`: the closed trades
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = result.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("{}_{}", result.symbol, short_id));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_result_json(result)?;
    std::fs::write(run_dir.join("result.json"), &json)
        .with_context(|| format!("failed to write result.json in {}", run_dir.display()))?;

    let ledger = export_ledger_csv(&result.trades)?;
    std::fs::write(run_dir.join("ledger.csv"), &ledger)
        .with_context(|| format!("failed to write ledger.csv in {}", run_dir.display()))?;

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's result.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_result_json(&json)
}
