use serde::{Deserialize, Serialize};

use crate::indicators::MIN_STD_DEV;
use crate::models::Trade;

/// Performance statistics of one backtest window
///
/// Every field has a defined value for any input: degenerate cases (no
/// returns, zero variance, no trades) report 0.0 rather than NaN or infinity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    // Return metrics
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,

    // Risk-adjusted
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    /// Non-positive fraction, e.g. -0.12 for a 12% peak-to-trough loss
    pub max_drawdown: f64,

    // Trade statistics
    pub num_periods: usize,
    pub num_trades: usize,
    /// Fraction of trades with positive pnl (0..1)
    pub win_rate: f64,
    pub avg_trade_return: f64,
    pub avg_win: f64,
    /// Mean pnl of losing trades (non-positive)
    pub avg_loss: f64,
    pub kelly_fraction: f64,
    pub avg_holding_days: f64,
    pub total_costs: f64,
}

impl PerformanceMetrics {
    /// Reduce a return series and its trade log to summary statistics
    pub fn calculate(returns: &[f64], trades: &[Trade], periods_per_year: f64) -> Self {
        let annualized_return = annualized_return(returns, periods_per_year);
        let annualized_volatility = sample_std(returns) * periods_per_year.sqrt();
        let downside_deviation = downside_deviation(returns) * periods_per_year.sqrt();
        let max_drawdown = max_drawdown(returns);

        let sharpe_ratio = ratio(annualized_return, annualized_volatility);
        let sortino_ratio = ratio(annualized_return, downside_deviation);
        let calmar_ratio = ratio(annualized_return, max_drawdown.abs());

        let total_return = returns.iter().fold(1.0, |equity, r| equity * (1.0 + r)) - 1.0;

        let trade_stats = TradeStats::from_trades(trades);

        Self {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown,
            num_periods: returns.len(),
            num_trades: trades.len(),
            win_rate: trade_stats.win_rate,
            avg_trade_return: trade_stats.avg_trade_return,
            avg_win: trade_stats.avg_win,
            avg_loss: trade_stats.avg_loss,
            kelly_fraction: trade_stats.kelly_fraction,
            avg_holding_days: trade_stats.avg_holding_days,
            total_costs: trade_stats.total_costs,
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self, title: &str) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║ {:^53} ║", title);
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 RETURNS");
        println!("  Total Return:          {:+.2}%", self.total_return * 100.0);
        println!("  Annualized Return:     {:+.2}%", self.annualized_return * 100.0);
        println!(
            "  Annualized Volatility: {:.2}%",
            self.annualized_volatility * 100.0
        );

        println!("\n⚠️  RISK METRICS");
        println!("  Sharpe Ratio:          {:.3}", self.sharpe_ratio);
        println!("  Sortino Ratio:         {:.3}", self.sortino_ratio);
        println!("  Calmar Ratio:          {:.3}", self.calmar_ratio);
        println!("  Max Drawdown:          {:.2}%", self.max_drawdown * 100.0);

        println!("\n📈 TRADE STATISTICS");
        println!("  Periods:               {}", self.num_periods);
        println!("  Trades:                {}", self.num_trades);
        println!("  Win Rate:              {:.1}%", self.win_rate * 100.0);

        if self.num_trades > 0 {
            println!("  Avg Trade Return:      {:+.4}", self.avg_trade_return);
            println!("  Avg Win:               {:+.4}", self.avg_win);
            println!("  Avg Loss:              {:+.4}", self.avg_loss);
            println!("  Kelly Fraction:        {:.2}", self.kelly_fraction);
            println!("  Avg Holding Period:    {:.1} days", self.avg_holding_days);
            println!("  Transaction Costs:     {:.6}", self.total_costs);
        }

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}

#[derive(Debug, Default)]
struct TradeStats {
    win_rate: f64,
    avg_trade_return: f64,
    avg_win: f64,
    avg_loss: f64,
    kelly_fraction: f64,
    avg_holding_days: f64,
    total_costs: f64,
}

impl TradeStats {
    fn from_trades(trades: &[Trade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }

        let count = trades.len() as f64;
        let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| !t.is_win()).map(|t| t.pnl).collect();

        let win_rate = wins.len() as f64 / count;
        let avg_win = mean(&wins);
        let avg_loss = mean(&losses);

        // Kelly needs both a payoff and a loss to size against
        let kelly_fraction = if avg_win > 0.0 && avg_loss < 0.0 {
            let payoff = avg_win / avg_loss.abs();
            (win_rate * payoff - (1.0 - win_rate)) / payoff
        } else {
            0.0
        };

        Self {
            win_rate,
            avg_trade_return: trades.iter().map(|t| t.pnl).sum::<f64>() / count,
            avg_win,
            avg_loss,
            kelly_fraction,
            avg_holding_days: trades.iter().map(|t| t.holding_period_days as f64).sum::<f64>()
                / count,
            total_costs: trades.iter().map(|t| t.cost).sum(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mean = mean(values);
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;

    variance.sqrt()
}

/// Sample deviation of the negative returns only
fn downside_deviation(returns: &[f64]) -> f64 {
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    sample_std(&negatives)
}

/// Geometric mean growth compounded to one year, minus 1
pub fn annualized_return(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.is_empty() || periods_per_year <= 0.0 {
        return 0.0;
    }

    let growth = returns.iter().fold(1.0, |equity, r| equity * (1.0 + r));
    if growth <= 0.0 {
        return -1.0;
    }

    growth.powf(periods_per_year / returns.len() as f64) - 1.0
}

/// Worst peak-to-trough decline of the compounded equity curve
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;

    for r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);

        let drawdown = if peak > 0.0 { equity / peak - 1.0 } else { -1.0 };
        max_dd = max_dd.min(drawdown);
    }

    max_dd
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator < MIN_STD_DEV || !numerator.is_finite() {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, ExitReason};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn create_test_trade(pnl: f64, holding_days: i64) -> Trade {
        let entry_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Trade {
            entry_date,
            exit_date: entry_date + chrono::Duration::days(holding_days),
            direction: Direction::Long,
            entry_price: 0.1,
            exit_price: 0.1 + pnl,
            holding_period_days: holding_days,
            bars_held: holding_days as usize,
            pnl,
            cost: 0.0001,
            trade_return: pnl,
            exit_reason: ExitReason::MeanReverted,
            open_at_end: false,
        }
    }

    #[test]
    fn test_metrics_with_no_returns() {
        let metrics = PerformanceMetrics::calculate(&[], &[], 252.0);

        assert_eq!(metrics, PerformanceMetrics::default());
    }

    #[test]
    fn test_metrics_with_single_return() {
        let metrics = PerformanceMetrics::calculate(&[0.01], &[], 252.0);

        assert_eq!(metrics.annualized_volatility, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.sortino_ratio, 0.0);
        assert!(metrics.sharpe_ratio.is_finite());
        assert_relative_eq!(metrics.total_return, 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_variance_gives_zero_ratios() {
        let metrics = PerformanceMetrics::calculate(&[0.001; 50], &[], 252.0);

        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.sortino_ratio, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
        assert!(metrics.annualized_return > 0.0);
    }

    #[test]
    fn test_annualized_return_geometric() {
        // 1% per period over 4 periods with 4 periods per year
        let returns = vec![0.01; 4];
        assert_relative_eq!(
            annualized_return(&returns, 4.0),
            1.01_f64.powi(4) - 1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_drawdown_calculation() {
        // Equity 1.0 -> 1.1 -> 0.88 -> 0.968
        let returns = vec![0.10, -0.20, 0.10];
        let dd = max_drawdown(&returns);
        assert_relative_eq!(dd, -0.20, epsilon = 1e-12);
        assert!(dd <= 0.0);
    }

    #[test]
    fn test_drawdown_never_positive() {
        assert_eq!(max_drawdown(&[0.01, 0.02, 0.03]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_sharpe_and_sortino() {
        let returns = vec![0.01, -0.005, 0.02, -0.01, 0.015];
        let metrics = PerformanceMetrics::calculate(&returns, &[], 252.0);

        let expected_vol = sample_std(&returns) * 252.0_f64.sqrt();
        assert_relative_eq!(metrics.annualized_volatility, expected_vol, epsilon = 1e-12);
        assert_relative_eq!(
            metrics.sharpe_ratio,
            metrics.annualized_return / expected_vol,
            epsilon = 1e-12
        );

        // Downside uses only -0.005 and -0.01
        let downside = sample_std(&[-0.005, -0.01]) * 252.0_f64.sqrt();
        assert_relative_eq!(
            metrics.sortino_ratio,
            metrics.annualized_return / downside,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_trade_statistics() {
        let trades = vec![
            create_test_trade(0.02, 5),
            create_test_trade(0.01, 3),
            create_test_trade(-0.01, 4),
        ];

        let metrics = PerformanceMetrics::calculate(&[0.0, 0.0], &trades, 252.0);

        assert_eq!(metrics.num_trades, 3);
        assert_relative_eq!(metrics.win_rate, 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(metrics.avg_trade_return, 0.02 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(metrics.avg_win, 0.015, epsilon = 1e-12);
        assert_relative_eq!(metrics.avg_loss, -0.01, epsilon = 1e-12);
        assert_relative_eq!(metrics.avg_holding_days, 4.0, epsilon = 1e-12);
        assert_relative_eq!(metrics.total_costs, 0.0003, epsilon = 1e-12);

        // b = 1.5, kelly = (2/3 * 1.5 - 1/3) / 1.5
        assert_relative_eq!(
            metrics.kelly_fraction,
            (2.0 / 3.0 * 1.5 - 1.0 / 3.0) / 1.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_kelly_zero_without_losses() {
        let trades = vec![create_test_trade(0.02, 5), create_test_trade(0.01, 3)];
        let metrics = PerformanceMetrics::calculate(&[0.01], &trades, 252.0);

        assert_eq!(metrics.win_rate, 1.0);
        assert_eq!(metrics.kelly_fraction, 0.0);
        assert_eq!(metrics.avg_loss, 0.0);
    }

    #[test]
    fn test_wiped_out_equity() {
        let metrics = PerformanceMetrics::calculate(&[0.05, -1.0], &[], 252.0);

        assert_eq!(metrics.annualized_return, -1.0);
        assert_relative_eq!(metrics.max_drawdown, -1.0, epsilon = 1e-12);
    }
}
