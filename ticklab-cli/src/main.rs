//! ticklab CLI: backtest, optimize and paper replay commands.
//!
//! Commands:
//! - `backtest`: run one strategy over a CSV export or a synthetic walk
//! - `backtest --optimize`: grid-search the strategy's parameters
//! - `paper`: replay a CSV through the live coordinator on a paper exchange

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ticklab_core::config::TradingConfiguration;
use ticklab_core::domain::PriceSeries;
use ticklab_core::engine::SimulationSettings;
use ticklab_core::execution::{
    EventLog, InMemoryEventLog, JsonlEventLog, PaperSettings, TracingNotifier,
};
use ticklab_core::strategy::{StrategyFamily, StrategyParameters};
use ticklab_runner::export::{save_artifacts, save_rankings};
use ticklab_runner::optimizer::{
    optimize, OptimizerSettings, ParamGrid, RankingMetric, Rankings,
};
use ticklab_runner::{
    load_configurations, load_csv, load_csv_all, replay_paper, run_backtest, synthetic_walk,
    BacktestResult, ReplayReport,
};

#[derive(Parser)]
#[command(name = "ticklab", about = "ticklab: tick-driven crypto strategy runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one strategy, or grid-search its parameters with --optimize.
    Backtest(BacktestArgs),
    /// Replay recorded prices through the live coordinator on a paper exchange.
    Paper {
        /// TOML file with [[configuration]] tables.
        #[arg(long)]
        config: PathBuf,

        /// Price CSV (id,symbol,price,recorded_at).
        #[arg(long)]
        csv: PathBuf,

        /// Append event rows to this JSONL file instead of memory.
        #[arg(long)]
        event_log: Option<PathBuf>,

        /// Starting paper balance per symbol.
        #[arg(long, default_value_t = 10_000.0)]
        initial_balance: f64,

        /// Paper fee per side as a fraction of notional.
        #[arg(long, default_value_t = 0.0)]
        fee_rate: f64,
    },
}

#[derive(Args)]
struct BacktestArgs {
    /// Strategy identifier: breakout, rsi_contrarian, ma_cross.
    #[arg(long)]
    strategy: String,

    #[arg(long, default_value = "BTC/JPY")]
    symbol: String,

    /// Price CSV (id,symbol,price,recorded_at).
    #[arg(long, conflicts_with = "synthetic")]
    csv: Option<PathBuf>,

    /// Generate this many synthetic one-minute samples instead of reading a CSV.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Seed for --synthetic.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fee per side as a fraction of notional.
    #[arg(long, default_value_t = 0.0005)]
    fee_rate: f64,

    /// Grid-search the strategy's default parameter grid.
    #[arg(long, default_value_t = false)]
    optimize: bool,

    /// Discard grid points with fewer trades.
    #[arg(long, default_value_t = 10)]
    min_trades: usize,

    /// Rows per ranking.
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Evaluate grid points on one thread.
    #[arg(long, default_value_t = false)]
    sequential: bool,

    /// Directory for result artifacts.
    #[arg(long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    knobs: KnobArgs,
}

/// Parameter overrides; anything omitted keeps its default.
#[derive(Args)]
struct KnobArgs {
    #[arg(long)]
    trade_size: Option<f64>,
    #[arg(long)]
    lookback: Option<usize>,
    /// Breakout threshold in percent.
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    rsi_period: Option<usize>,
    #[arg(long)]
    oversold: Option<f64>,
    #[arg(long)]
    overbought: Option<f64>,
    #[arg(long)]
    exit_long: Option<f64>,
    #[arg(long)]
    exit_short: Option<f64>,
    #[arg(long)]
    max_hold: Option<i64>,
    #[arg(long)]
    cooldown: Option<i64>,
    #[arg(long)]
    short_period: Option<usize>,
    #[arg(long)]
    long_period: Option<usize>,
    #[arg(long)]
    stop_loss: Option<f64>,
    #[arg(long)]
    initial_trailing: Option<f64>,
    #[arg(long)]
    trailing_offset: Option<f64>,
    #[arg(long)]
    max_positions: Option<usize>,
    #[arg(long)]
    max_spread: Option<f64>,
}

impl KnobArgs {
    fn apply(&self, p: &mut StrategyParameters) {
        fn set<T: Copy>(field: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *field = v;
            }
        }
        set(&mut p.trade_size, self.trade_size);
        set(&mut p.lookback_period, self.lookback);
        set(&mut p.breakout_threshold, self.threshold);
        set(&mut p.rsi_period, self.rsi_period);
        set(&mut p.rsi_oversold, self.oversold);
        set(&mut p.rsi_overbought, self.overbought);
        set(&mut p.rsi_exit_long, self.exit_long);
        set(&mut p.rsi_exit_short, self.exit_short);
        set(&mut p.max_hold_minutes, self.max_hold);
        set(&mut p.cooldown_minutes, self.cooldown);
        set(&mut p.short_period, self.short_period);
        set(&mut p.long_period, self.long_period);
        set(&mut p.stop_loss_percent, self.stop_loss);
        set(&mut p.initial_trailing_stop_percent, self.initial_trailing);
        set(&mut p.trailing_stop_offset_percent, self.trailing_offset);
        set(&mut p.max_positions, self.max_positions);
        set(&mut p.max_spread_percent, self.max_spread);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Backtest(args) => run_backtest_cmd(args),
        Commands::Paper {
            config,
            csv,
            event_log,
            initial_balance,
            fee_rate,
        } => run_paper_cmd(&config, &csv, event_log, initial_balance, fee_rate),
    }
}

fn run_backtest_cmd(args: BacktestArgs) -> Result<()> {
    let family: StrategyFamily = args.strategy.parse()?;

    let mut params = StrategyParameters::default();
    args.knobs.apply(&mut params);
    let config = TradingConfiguration::new(
        format!("{}-{}", family, args.symbol),
        args.symbol.clone(),
        family.id(),
        params,
    );

    let series = load_series(&args)?;
    let simulation = SimulationSettings {
        fee_rate: args.fee_rate,
        ..SimulationSettings::default()
    };

    if args.optimize {
        let settings = OptimizerSettings {
            min_trades: args.min_trades,
            top_n: args.top,
            parallel: !args.sequential,
            simulation,
        };
        let grid = ParamGrid::for_family(family);
        let rankings = optimize(&config, &series, &grid, &settings)?;
        if rankings.is_empty() {
            bail!(
                "no valid results (need at least {} trades per combination)",
                args.min_trades
            );
        }
        print_rankings(&rankings, &grid);
        if let Some(dir) = &args.output {
            let path = save_rankings(&rankings, dir)?;
            println!("Rankings saved to: {}", path.display());
        }
        return Ok(());
    }

    let result = run_backtest(&config, &series, simulation)?;
    print_summary(&result);
    if let Some(dir) = &args.output {
        let run_dir = save_artifacts(&result, dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn load_series(args: &BacktestArgs) -> Result<PriceSeries> {
    match (&args.csv, args.synthetic) {
        (Some(path), _) => load_csv(path, &args.symbol)
            .with_context(|| format!("failed to load prices from {}", path.display())),
        (None, Some(n)) => Ok(synthetic_walk(&args.symbol, n, args.seed, 5_000_000.0)),
        (None, None) => bail!("one of --csv or --synthetic is required"),
    }
}

fn run_paper_cmd(
    config_path: &Path,
    csv_path: &Path,
    event_log: Option<PathBuf>,
    initial_balance: f64,
    fee_rate: f64,
) -> Result<()> {
    let configs = load_configurations(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    if !configs.iter().any(|c| c.active) {
        bail!("{} has no active configurations", config_path.display());
    }
    let prices = load_csv_all(csv_path)
        .with_context(|| format!("failed to load prices from {}", csv_path.display()))?;

    let events: Arc<dyn EventLog> = match event_log {
        Some(path) => Arc::new(JsonlEventLog::new(path)),
        None => Arc::new(InMemoryEventLog::new()),
    };
    let paper = PaperSettings {
        initial_balance,
        fee_rate,
        ..PaperSettings::default()
    };

    let report = replay_paper(&configs, &prices, &paper, events, Arc::new(TracingNotifier))?;
    print_replay(&report);
    Ok(())
}

// ─── Output ─────────────────────────────────────────────────────────

fn print_summary(result: &BacktestResult) {
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy);
    println!("Symbol:         {}", result.symbol);
    println!("Ticks:          {}", result.ticks);
    println!("Run id:         {}", &result.run_id[..12.min(result.run_id.len())]);
    println!();
    println!("--- Performance ---");
    println!("Trades:         {}", result.total_trades);
    println!(
        "Wins/Losses:    {}/{}",
        result.winning_trades, result.losing_trades
    );
    println!("Win Rate:       {:.2}%", result.win_rate);
    println!("Total P&L:      {:.2}", result.total_pnl);
    println!("Average P&L:    {:.2}", result.average_pnl);
    println!("Profit Factor:  {:.2}", result.profit_factor);
    println!("Max Drawdown:   {:.2}", result.max_drawdown);
    println!("Rejected:       {}", result.rejected_entries);
}

fn print_rankings(rankings: &Rankings, grid: &ParamGrid) {
    println!(
        "Valid combinations: {} of {}",
        rankings.qualified, rankings.evaluated
    );
    for metric in RankingMetric::ALL {
        println!();
        println!("=== Top {} by {metric} ===", rankings.ranked(metric).len());
        print_table(rankings.ranked(metric), grid);
    }
}

fn print_table(results: &[BacktestResult], grid: &ParamGrid) {
    let mut header: Vec<String> = grid.axes.iter().map(|(k, _)| k.label().to_string()).collect();
    header.extend(["trades", "win%", "pnl", "pf", "max_dd"].map(String::from));
    println!("{}", header.iter().map(|h| format!("{h:>11}")).collect::<String>());

    for r in results {
        let mut row: Vec<String> = grid
            .axes
            .iter()
            .map(|(k, _)| format!("{}", k.read(&r.parameters)))
            .collect();
        row.push(r.total_trades.to_string());
        row.push(format!("{:.1}", r.win_rate));
        row.push(format!("{:.0}", r.total_pnl));
        row.push(format!("{:.2}", r.profit_factor));
        row.push(format!("{:.0}", r.max_drawdown));
        println!("{}", row.iter().map(|c| format!("{c:>11}")).collect::<String>());
    }
}

fn print_replay(report: &ReplayReport) {
    println!();
    println!("=== Paper Replay ===");
    println!("Ticks:          {}", report.ticks);
    println!("Failed ticks:   {}", report.failures);
    for (symbol, balance) in &report.balances {
        println!("Balance {symbol}: {balance:.2}");
    }
    for s in &report.summaries {
        println!();
        println!("--- {} ({}, {}) ---", s.name, s.config_id, s.symbol);
        println!("Closed trades:  {}", s.stats.total_trades);
        println!("Open positions: {}", s.open_positions);
        println!("Win Rate:       {:.2}%", s.stats.win_rate);
        println!("Total P&L:      {:.2}", s.stats.total_pnl);
        println!("Profit Factor:  {:.2}", s.stats.profit_factor);
    }
}
