use fxpairs::backtest::{BacktestRunner, MarketScenario, PerformanceMetrics, SyntheticPairGenerator};
use fxpairs::strategy::Parameters;
use fxpairs::Result;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("fxpairs=info")
        .init();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║          FX PAIRS SCENARIO BACKTESTING SUITE          ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let params = Parameters::default();
    let runner = BacktestRunner::new(params)?;

    let scenarios = vec![
        (MarketScenario::MeanReverting, "↔️  Mean-reverting spread"),
        (MarketScenario::Trending, "📈 Trending spread"),
        (MarketScenario::RegimeShift, "💥 Regime shift (+5% mean)"),
        (MarketScenario::Volatile, "⚡ Volatile spread (3x noise)"),
        (MarketScenario::WithGaps, "🕳️  Missing dates in both legs"),
    ];

    let mut all_metrics = Vec::new();

    for (scenario, name) in scenarios {
        // Same seed for every scenario so only the market changes
        let mut generator = SyntheticPairGenerator::new(42);
        let (myr, sgd) = generator.generate(scenario, 1000);

        match runner.run_and_report(&myr, &sgd, name) {
            Ok(run) => {
                all_metrics.push((name.to_string(), run.metrics));
            }
            Err(e) => {
                eprintln!("❌ Backtest failed for {}: {}", name, e);
            }
        }
    }

    print_summary_comparison(&all_metrics);

    Ok(())
}

fn print_summary_comparison(results: &[(String, PerformanceMetrics)]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SCENARIO COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<32} {:>9} {:>8} {:>8} {:>8} {:>8}",
        "Scenario", "Return%", "Sharpe", "MaxDD%", "Trades", "Win%"
    );
    println!("{}", "─".repeat(78));

    for (name, metrics) in results {
        println!(
            "{:<32} {:>9.2} {:>8.2} {:>8.2} {:>8} {:>8.1}",
            name,
            metrics.total_return * 100.0,
            metrics.sharpe_ratio,
            metrics.max_drawdown * 100.0,
            metrics.num_trades,
            metrics.win_rate * 100.0
        );
    }

    println!("\n");

    if let Some((best_name, best_metrics)) = results
        .iter()
        .max_by(|a, b| a.1.sharpe_ratio.total_cmp(&b.1.sharpe_ratio))
    {
        println!(
            "🏆 Best Scenario: {} (Sharpe {:.2})",
            best_name, best_metrics.sharpe_ratio
        );
    }

    if let Some((worst_name, worst_metrics)) = results
        .iter()
        .min_by(|a, b| a.1.sharpe_ratio.total_cmp(&b.1.sharpe_ratio))
    {
        println!(
            "⚠️  Worst Scenario: {} (Sharpe {:.2})",
            worst_name, worst_metrics.sharpe_ratio
        );
    }

    let total_trades: usize = results.iter().map(|(_, m)| m.num_trades).sum();
    let total_costs: f64 = results.iter().map(|(_, m)| m.total_costs).sum();

    println!("\n📊 Overall Statistics:");
    println!("   Total Trades Across All Scenarios: {}", total_trades);
    println!("   Total Transaction Costs: {:.6}", total_costs);

    println!("\n═══════════════════════════════════════════════════════\n");
}
