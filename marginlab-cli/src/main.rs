//! MarginLab CLI: run, sweep, and synthetic data commands.
//!
//! Commands:
//! - `run`: execute one backtest from a TOML config file and/or flags
//! - `sweep`: grid over take-profit, stop-loss, and leverage, ranked by total P&L
//! - `synth`: write a deterministic synthetic kline CSV

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use marginlab_core::params::StrategyParams;
use marginlab_core::report::{LiquidationEvent, LiquidationSeverity, PnlMode};
use marginlab_runner::{
    prepare_data, run_from_config, run_sweep, save_artifacts, synthetic_candles,
    write_candles_csv, BacktestConfig, BacktestResult, DataConfig, SweepGrid,
};

#[derive(Parser)]
#[command(
    name = "marginlab",
    about = "MarginLab CLI: leveraged indicator-driven backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file, flags, or both (flags win).
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Take-profit fraction of margin (0.05 = 5%).
        #[arg(long)]
        take_profit: Option<f64>,

        /// Stop-loss fraction of margin (0.025 = 2.5%).
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Leverage multiplier (>= 1).
        #[arg(long)]
        leverage: Option<f64>,

        /// Output directory for result.json and ledger.csv.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the full result as JSON instead of the summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Sweep take-profit, stop-loss, and leverage over one data set.
    Sweep {
        #[command(flatten)]
        source: SourceArgs,

        /// Comma-separated take-profit fractions.
        #[arg(long, value_delimiter = ',', required = true)]
        take_profit: Vec<f64>,

        /// Comma-separated stop-loss fractions.
        #[arg(long, value_delimiter = ',', required = true)]
        stop_loss: Vec<f64>,

        /// Comma-separated leverage values.
        #[arg(long, value_delimiter = ',', default_value = "1")]
        leverage: Vec<f64>,

        /// Show only the best N rows.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Write a synthetic 15-minute kline CSV.
    Synth {
        /// Number of klines.
        #[arg(long, default_value_t = 5_000)]
        count: usize,

        /// RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
}

/// Data and account flags shared by `run` and `sweep`.
#[derive(Args)]
struct SourceArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Kline CSV (or precomputed bar CSV with --precomputed).
    #[arg(long)]
    data: Option<PathBuf>,

    /// Use N synthetic klines instead of a CSV.
    #[arg(long)]
    synthetic: Option<usize>,

    /// The CSV already has EMA, MACD, signalLine, and RSI columns.
    #[arg(long, default_value_t = false)]
    precomputed: bool,

    /// Keep klines opening on or after this date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// Keep klines opening before this date (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// Starting margin.
    #[arg(long)]
    initial_margin: Option<f64>,

    /// Maintenance margin ratio, strictly between 0 and 1.
    #[arg(long)]
    maintenance_ratio: Option<f64>,

    /// compounding or additive.
    #[arg(long)]
    pnl_mode: Option<PnlMode>,

    /// Report total P&L as zero once any trade is liquidated.
    #[arg(long, default_value_t = false)]
    wipe_out_on_liquidation: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            take_profit,
            stop_loss,
            leverage,
            output_dir,
            json,
        } => run_backtest_cmd(source, take_profit, stop_loss, leverage, output_dir, json),
        Commands::Sweep {
            source,
            take_profit,
            stop_loss,
            leverage,
            top,
        } => run_sweep_cmd(source, take_profit, stop_loss, leverage, top),
        Commands::Synth { count, seed, out } => run_synth(count, seed, out),
    }
}

fn parse_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad date '{s}'")))
        .transpose()
}

/// Merge a config file (if any) with flags. Flags override the file.
fn build_config(
    source: &SourceArgs,
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
    leverage: Option<f64>,
) -> Result<BacktestConfig> {
    let mut config = match &source.config {
        Some(path) => Some(
            BacktestConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
        ),
        None => None,
    };

    let base = config.as_ref().map(|c| c.strategy);
    let tp = take_profit.or(base.map(|p| p.take_profit_pct()));
    let sl = stop_loss.or(base.map(|p| p.stop_loss_pct()));
    let (Some(tp), Some(sl)) = (tp, sl) else {
        bail!("--take-profit and --stop-loss are required without --config");
    };
    let strategy = StrategyParams::new(
        tp,
        sl,
        leverage.or(base.map(|p| p.leverage())).unwrap_or(1.0),
        source
            .initial_margin
            .or(base.map(|p| p.initial_margin()))
            .unwrap_or(100.0),
        source
            .maintenance_ratio
            .or(base.map(|p| p.maintenance_margin_ratio()))
            .unwrap_or(0.8),
    )?;

    let data = match (&source.data, source.synthetic) {
        (Some(_), Some(_)) => bail!("--data and --synthetic are mutually exclusive"),
        (Some(path), None) => Some(DataConfig::from_path(path)),
        (None, Some(n)) => Some(DataConfig::synthetic(n, 42)),
        (None, None) => None,
    };

    let mut merged = match (config.take(), data) {
        (Some(mut c), Some(d)) => {
            c.data.path = d.path;
            c.data.synthetic = d.synthetic;
            c.strategy = strategy;
            c
        }
        (Some(mut c), None) => {
            c.strategy = strategy;
            c
        }
        (None, Some(d)) => BacktestConfig::new(strategy, d),
        (None, None) => bail!("one of --config, --data, or --synthetic is required"),
    };

    if source.precomputed {
        merged.data.precomputed = true;
    }
    if let Some(start) = parse_date(source.start.as_deref())? {
        merged.data.start = Some(start);
    }
    if let Some(end) = parse_date(source.end.as_deref())? {
        merged.data.end = Some(end);
    }
    if let Some(mode) = source.pnl_mode {
        merged.report.pnl_mode = mode;
    }
    if source.wipe_out_on_liquidation {
        merged.report.liquidation_severity = LiquidationSeverity::WipeOut;
    }

    merged.validate()?;
    tracing::debug!(
        strategy = ?merged.strategy,
        pnl_mode = %merged.report.pnl_mode,
        precomputed = merged.data.precomputed,
        "resolved configuration"
    );
    Ok(merged)
}

fn run_backtest_cmd(
    source: SourceArgs,
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
    leverage: Option<f64>,
    output_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut config = build_config(&source, take_profit, stop_loss, leverage)?;
    if output_dir.is_some() {
        config.output.dir = output_dir;
    }

    let result = run_from_config(&config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if let Some(dir) = &config.output.dir {
        let run_dir = save_artifacts(&result, dir)?;
        tracing::info!(run_id = %result.run_id, dir = %run_dir.display(), "saved artifacts");
        println!("Artifacts saved to: {}", run_dir.display());
    }

    Ok(())
}

/// Placeholder take-profit, stop-loss and leverage for the sweep base. Every
/// grid point replaces them; only margin and maintenance ratio carry over.
const SWEEP_BASE: (f64, f64, f64) = (0.05, 0.025, 1.0);

/// Base config for a sweep. Built from valid placeholders so a bad grid value
/// is rejected as one point instead of failing the whole sweep.
fn sweep_base_config(source: &SourceArgs) -> Result<BacktestConfig> {
    let (tp, sl, lev) = SWEEP_BASE;
    build_config(source, Some(tp), Some(sl), Some(lev))
}

fn run_sweep_cmd(
    source: SourceArgs,
    take_profit: Vec<f64>,
    stop_loss: Vec<f64>,
    leverage: Vec<f64>,
    top: usize,
) -> Result<()> {
    let config = sweep_base_config(&source)?;
    let data = prepare_data(&config.data, &config.indicators)?;

    let grid = SweepGrid {
        take_profit,
        stop_loss,
        leverage,
    };
    let results = run_sweep(&grid, &config.strategy, &config.indicators, &config.report, &data);

    println!();
    println!(
        "=== Sweep: {} points over {} bars ({} mode) ===",
        grid.size(),
        data.series.len(),
        config.report.pnl_mode
    );
    println!(
        "{:>4} {:>8} {:>8} {:>6} {:>7} {:>8} {:>12} {:>6}",
        "rank", "tp", "sl", "lev", "trades", "win%", "total_pnl", "liqs"
    );
    for (rank, entry) in results.entries.iter().take(top).enumerate() {
        let r = &entry.result.report;
        println!(
            "{:>4} {:>8.4} {:>8.4} {:>6.1} {:>7} {:>7.1}% {:>12.2} {:>6}",
            rank + 1,
            entry.take_profit,
            entry.stop_loss,
            entry.leverage,
            r.total_trades,
            r.win_rate,
            r.total_pnl,
            r.liquidations.len()
        );
    }
    for rejected in &results.rejected {
        println!(
            "rejected tp={} sl={} lev={}: {}",
            rejected.take_profit, rejected.stop_loss, rejected.leverage, rejected.reason
        );
    }

    Ok(())
}

fn run_synth(count: usize, seed: u64, out: PathBuf) -> Result<()> {
    let candles = synthetic_candles(count, seed);
    write_candles_csv(&out, &candles)?;
    println!("Wrote {} klines to {}", candles.len(), out.display());
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let r = &result.report;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {}", result.symbol);
    if let (Some(first), Some(last)) = (result.first_open_time, result.last_open_time) {
        println!("Period:         {first} to {last}");
    }
    println!("Bars:           {}", result.bar_count);
    println!(
        "Leverage:       {}x (margin {:.2}, maintenance {:.2})",
        result.params.leverage(),
        result.params.initial_margin(),
        result.params.maintenance_margin_ratio()
    );
    println!();
    println!("--- Performance ---");
    println!(
        "Trades:         {} ({} won, {} lost)",
        r.total_trades, r.winning_trades, r.losing_trades
    );
    println!("Win Rate:       {:.2}%", r.win_rate);
    println!("Total P&L:      {:.2} ({} mode)", r.total_pnl, r.pnl_mode);
    println!("Net Profit:     {:.2}", r.net_profit);
    println!("Profit Factor:  {:.2}", r.profit_factor);
    println!("Max Drawdown:   {:.2}%", r.max_drawdown * 100.0);
    println!("Max Consec Win: {}", r.max_consecutive_wins);
    println!("Max Consec Loss:{}", r.max_consecutive_losses);

    if r.has_liquidations() {
        println!();
        println!("--- Liquidations ({}) ---", r.liquidations.len());
        for l in &r.liquidations {
            println!("{}", liquidation_line(l));
        }
        if r.liquidation_severity == LiquidationSeverity::WipeOut {
            println!("Total P&L reported as zero: account wiped out by liquidation");
        }
    }

    if let Some(u) = &r.unrealized {
        println!();
        println!("--- Open Position (unrealized, not in totals) ---");
        println!(
            "{} from bar {} at {:.4}, last close {:.4} at bar {} ({:+.2}%)",
            u.side,
            u.entry_index,
            u.entry_price,
            u.last_close,
            u.last_index,
            u.pnl_fraction * 100.0
        );
    }

    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
}

fn liquidation_line(l: &LiquidationEvent) -> String {
    format!(
        "#{} {} entered bar {}, liquidated bar {} ({}) at {:.4} ({:+.2}%)",
        l.trade_index + 1,
        l.side,
        l.entry_index,
        l.exit_index,
        l.exit_time.format("%Y-%m-%d %H:%M UTC"),
        l.exit_price,
        l.pnl_fraction * 100.0
    )
}
