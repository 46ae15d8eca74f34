use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use fxpairs::backtest::{
    GridSearchOptimizer, GridSearchReport, MarketScenario, Objective, SplitPoint,
    SyntheticPairGenerator,
};
use fxpairs::config::{load_config, AppConfig};
use fxpairs::data::{load_fred_csv, write_equity_csv, write_trades_csv};
use fxpairs::strategy::Parameters;
use fxpairs::{BacktestRunner, PriceSeries};

/// Mean-reversion backtester for the USD/MYR vs USD/SGD pair
#[derive(Parser, Debug)]
#[command(name = "fxpairs", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging for every crate
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grid search in-sample, confirm out-of-sample, report the full period
    Optimize(OptimizeCmd),

    /// Backtest a single parameter set over the full history
    Backtest(BacktestCmd),

    /// Run the grid search on seeded synthetic data
    Synthetic(SyntheticCmd),
}

#[derive(Parser, Debug)]
struct SweepArgs {
    /// Ranking metric (sharpe, sortino, annualized_return, total_return, calmar)
    #[arg(long)]
    objective: Option<Objective>,

    /// Number of candidates confirmed out-of-sample
    #[arg(long)]
    top_k: Option<usize>,

    /// First out-of-sample date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", conflicts_with = "fraction")]
    split_date: Option<NaiveDate>,

    /// Share of common dates used in-sample, e.g. 0.7
    #[arg(long)]
    fraction: Option<f64>,

    /// Stop after this many trials
    #[arg(long)]
    max_trials: Option<usize>,

    /// Stop starting trials after this many seconds
    #[arg(long, value_name = "SECS")]
    time_limit: Option<u64>,

    /// Evaluate candidates one at a time instead of on the thread pool
    #[arg(long)]
    sequential: bool,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Write the full report as JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Write the selected trade log as CSV
    #[arg(long, value_name = "FILE")]
    trades: Option<PathBuf>,

    /// Write the selected equity curve as CSV
    #[arg(long, value_name = "FILE")]
    equity: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct OptimizeCmd {
    #[command(flatten)]
    sweep: SweepArgs,

    #[command(flatten)]
    export: ExportArgs,
}

#[derive(Parser, Debug)]
struct BacktestCmd {
    #[arg(long, default_value_t = 60)]
    lookback: usize,

    #[arg(long, default_value_t = 2.0)]
    entry: f64,

    #[arg(long, default_value_t = 0.5)]
    exit: f64,

    #[arg(long, default_value_t = 4.0)]
    stop: f64,

    /// Cost per side in basis points
    #[arg(long, default_value_t = 2.0)]
    cost_bps: f64,

    #[command(flatten)]
    export: ExportArgs,
}

#[derive(Parser, Debug)]
struct SyntheticCmd {
    #[arg(long, value_enum, default_value_t = ScenarioArg::MeanReverting)]
    scenario: ScenarioArg,

    /// Business days to generate
    #[arg(long, default_value_t = 1000)]
    days: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[command(flatten)]
    sweep: SweepArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ScenarioArg {
    MeanReverting,
    Trending,
    RegimeShift,
    Volatile,
    WithGaps,
}

impl From<ScenarioArg> for MarketScenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::MeanReverting => MarketScenario::MeanReverting,
            ScenarioArg::Trending => MarketScenario::Trending,
            ScenarioArg::RegimeShift => MarketScenario::RegimeShift,
            ScenarioArg::Volatile => MarketScenario::Volatile,
            ScenarioArg::WithGaps => MarketScenario::WithGaps,
        }
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(cli.verbose, cli.debug, &config.logging.level);

    match cli.command {
        Command::Optimize(cmd) => optimize_command(cmd, config),
        Command::Backtest(cmd) => backtest_command(cmd, config),
        Command::Synthetic(cmd) => synthetic_command(cmd, config),
    }
}

/// RUST_LOG wins; otherwise the flags, then the configured level
fn init_logging(verbose: bool, debug: bool, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("debug")
        } else if verbose {
            EnvFilter::new("fxpairs=debug")
        } else {
            EnvFilter::new(format!("fxpairs={}", level))
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_legs(config: &AppConfig) -> Result<(PriceSeries, PriceSeries)> {
    let data = &config.data;
    let myr = load_fred_csv(&data.myr_path, &data.myr_column)?;
    let sgd = load_fred_csv(&data.sgd_path, &data.sgd_column)?;

    Ok((data.window(myr), data.window(sgd)))
}

fn build_optimizer(config: &AppConfig, args: &SweepArgs) -> GridSearchOptimizer {
    let split = match (args.split_date, args.fraction) {
        (Some(date), _) => SplitPoint::Date(date),
        (None, Some(fraction)) => SplitPoint::Fraction(fraction),
        (None, None) => config.split.split_point(),
    };

    let mut budget = config.optimizer.budget();
    if let Some(max_trials) = args.max_trials {
        budget.max_trials = Some(max_trials);
    }
    if let Some(secs) = args.time_limit {
        budget.time_limit = Some(std::time::Duration::from_secs(secs));
    }

    GridSearchOptimizer::new(config.grid.clone(), split)
        .with_objective(args.objective.unwrap_or(config.optimizer.objective))
        .with_top_k(args.top_k.unwrap_or(config.optimizer.top_k))
        .with_budget(budget)
        .with_parallelism(config.optimizer.parallel && !args.sequential)
}

fn optimize_command(cmd: OptimizeCmd, config: AppConfig) -> Result<()> {
    print_banner("USD/MYR vs USD/SGD MEAN REVERSION OPTIMIZATION");

    println!("📡 Loading price data...");
    let (myr, sgd) = load_legs(&config)?;
    println!("✓ Loaded {} ({} obs) and {} ({} obs)\n", myr.name(), myr.len(), sgd.name(), sgd.len());

    let optimizer = build_optimizer(&config, &cmd.sweep);
    println!("🔬 Testing {} parameter combinations...", optimizer.grid().len());

    let report = optimizer.run(&myr, &sgd)?;
    report_selection(&report, &myr, &sgd)?;
    export(&report, &cmd.export)
}

fn backtest_command(cmd: BacktestCmd, config: AppConfig) -> Result<()> {
    print_banner("USD/MYR vs USD/SGD BACKTEST");

    let (myr, sgd) = load_legs(&config)?;
    let params = Parameters::new(cmd.lookback, cmd.entry, cmd.exit, cmd.stop, cmd.cost_bps)
        .with_periods_per_year(config.grid.periods_per_year)
        .with_window_mode(config.grid.window_mode)
        .with_spread_kind(config.grid.spread_kind);

    let runner = BacktestRunner::new(params)?;
    let run = runner.run_and_report(&myr, &sgd, "FULL PERIOD")?;

    if let Some(path) = &cmd.export.json {
        write_json(path, &run)?;
    }
    if let Some(path) = &cmd.export.trades {
        write_trades_csv(path, &run.simulation.trades)?;
        println!("💾 Trade log written to {}", path.display());
    }
    if let Some(path) = &cmd.export.equity {
        write_equity_csv(path, &run.simulation.equity_curve)?;
        println!("💾 Equity curve written to {}", path.display());
    }

    Ok(())
}

fn synthetic_command(cmd: SyntheticCmd, config: AppConfig) -> Result<()> {
    print_banner("SYNTHETIC PAIR OPTIMIZATION");

    let scenario = MarketScenario::from(cmd.scenario);
    let (myr, sgd) = SyntheticPairGenerator::new(cmd.seed).generate(scenario, cmd.days);
    println!("Scenario: {:?} | {} business days | seed {}", scenario, cmd.days, cmd.seed);

    // Synthetic dates start in 2021, so a calendar split from the config rarely fits
    let mut sweep = cmd.sweep;
    if sweep.split_date.is_none() && sweep.fraction.is_none() {
        sweep.fraction = Some(config.split.fraction.unwrap_or(0.7));
    }

    let report = build_optimizer(&config, &sweep).run(&myr, &sgd)?;
    report_selection(&report, &myr, &sgd)
}

/// Print the ranking, the selected candidate's windows, and its full period
fn report_selection(report: &GridSearchReport, myr: &PriceSeries, sgd: &PriceSeries) -> Result<()> {
    report.print_summary(10);

    if !report.failed.is_empty() {
        println!("\n⚠️  {} failed trials:", report.failed.len());
        for trial in report.failed.iter().take(5) {
            println!("   {:?} {}: {}", trial.phase, trial.parameters.label(), trial.error);
        }
    }

    let Some(best) = report.best() else {
        println!("\n❌ No parameter set survived both windows");
        return Ok(());
    };

    print_banner("SELECTED PARAMETERS");
    println!("  lookback_window:      {}", best.parameters.lookback_window);
    println!("  entry_threshold:      {:.2}", best.parameters.entry_threshold);
    println!("  exit_threshold:       {:.2}", best.parameters.exit_threshold);
    println!("  stop_loss_threshold:  {:.2}", best.parameters.stop_loss_threshold);
    println!("  transaction_cost_bps: {:.1}", best.parameters.transaction_cost_bps);

    best.in_sample_metrics
        .print_report(&format!("IN-SAMPLE (before {})", report.split_date));
    best.out_of_sample_metrics
        .print_report(&format!("OUT-OF-SAMPLE (from {})", report.split_date));

    BacktestRunner::new(best.parameters)?.run_and_report(myr, sgd, "FULL PERIOD")?;

    if report.selected.len() > 1 {
        println!("Other selected candidates (out-of-sample {}):", report.objective);
        for result in report.selected.iter().skip(1) {
            println!(
                "  #{} {} -> {:.3}",
                result.rank,
                result.parameters.label(),
                result.out_of_sample_score
            );
        }
    }

    Ok(())
}

fn export(report: &GridSearchReport, args: &ExportArgs) -> Result<()> {
    if let Some(path) = &args.json {
        write_json(path, report)?;
    }

    let Some(best) = report.best() else {
        return Ok(());
    };

    if let Some(path) = &args.trades {
        write_trades_csv(path, &best.trade_log)?;
        println!("💾 Out-of-sample trade log written to {}", path.display());
    }
    if let Some(path) = &args.equity {
        write_equity_csv(path, &best.equity_curve)?;
        println!("💾 Out-of-sample equity curve written to {}", path.display());
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("💾 Report written to {}", path.display());
    Ok(())
}

fn print_banner(title: &str) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║ {:^53} ║", title);
    println!("╚═══════════════════════════════════════════════════════╝\n");
}
