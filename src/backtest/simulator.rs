use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Direction, ExitReason, Position, SignalState, SpreadKind, Trade};
use crate::strategy::Parameters;

/// Equity value at the close of a date
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Output of a position simulation
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// One return per date after the first
    pub period_returns: Vec<f64>,
    /// One point per date, starting at 1.0
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub positions: Vec<Position>,
}

impl SimulationResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve.last().map(|p| p.equity).unwrap_or(1.0)
    }

    pub fn total_costs(&self) -> f64 {
        self.trades.iter().map(|t| t.cost).sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenTrade {
    direction: Direction,
    entry_index: usize,
    entry_date: NaiveDate,
    entry_price: f64,
    /// Capital multiple earned so far, costs included
    growth: f64,
}

/// Converts signal states into per-period returns and a trade log
///
/// Capital is marked to the position each date. A position's growth over a
/// period is the change in the spread level (`exp(spread)` for a log ratio,
/// the ratio itself otherwise), inverted when short, so a period return can
/// never reach -100%. Each side of a trade costs `transaction_cost_bps` of the
/// capital on the date it trades. Compounding a trade's period returns gives
/// its `trade_return`; `pnl` stays in spread units.
#[derive(Debug, Clone)]
pub struct PositionSimulator {
    params: Parameters,
}

impl PositionSimulator {
    pub fn new(params: Parameters) -> Self {
        Self { params }
    }

    pub fn simulate(&self, signals: &[SignalState]) -> SimulationResult {
        let cost_factor = 1.0 - self.params.cost_rate();
        let n = signals.len();

        let mut period_returns = Vec::with_capacity(n.saturating_sub(1));
        let mut equity_curve = Vec::with_capacity(n);
        let mut trades = Vec::new();
        let positions: Vec<Position> = signals.iter().map(|s| s.position).collect();

        let Some(first) = signals.first() else {
            return SimulationResult {
                period_returns,
                equity_curve,
                trades,
                positions,
            };
        };

        let mut equity = 1.0;
        equity_curve.push(EquityPoint {
            date: first.date,
            equity,
        });

        let mut open = first.position.direction().map(|direction| OpenTrade {
            direction,
            entry_index: 0,
            entry_date: first.date,
            entry_price: first.spread,
            growth: 1.0,
        });

        for t in 1..n {
            let prev = &signals[t - 1];
            let cur = &signals[t];
            let mut factor = 1.0;

            if let Some(trade) = open.as_mut() {
                let growth = self.position_growth(trade.direction, prev.spread, cur.spread);
                trade.growth *= growth;
                factor *= growth;
            }

            if cur.position != prev.position {
                if let Some(mut trade) = open.take() {
                    trade.growth *= cost_factor;
                    factor *= cost_factor;
                    let reason = self.exit_reason(trade.direction, cur.zscore);
                    trades.push(self.close_trade(trade, cur, t, reason));
                }
                if let Some(direction) = cur.position.direction() {
                    factor *= cost_factor;
                    open = Some(OpenTrade {
                        direction,
                        entry_index: t,
                        entry_date: cur.date,
                        entry_price: cur.spread,
                        growth: cost_factor,
                    });
                }
            }

            // Anything still open on the last date is closed at the last price
            if t == n - 1 {
                if let Some(mut trade) = open.take() {
                    trade.growth *= cost_factor;
                    factor *= cost_factor;
                    let closed = self.close_trade(trade, cur, t, ExitReason::EndOfData);
                    tracing::debug!(
                        "Force-closed {:?} opened {} at end of data, pnl {:.6}",
                        closed.direction,
                        closed.entry_date,
                        closed.pnl
                    );
                    trades.push(closed);
                }
            }

            equity *= factor;
            period_returns.push(factor - 1.0);
            equity_curve.push(EquityPoint {
                date: cur.date,
                equity,
            });
        }

        SimulationResult {
            period_returns,
            equity_curve,
            trades,
            positions,
        }
    }

    /// Capital multiple of holding `direction` while the spread moves
    fn position_growth(&self, direction: Direction, prev: f64, cur: f64) -> f64 {
        match self.params.spread_kind {
            SpreadKind::LogRatio => (direction.sign() * (cur - prev)).exp(),
            SpreadKind::Ratio => match direction {
                Direction::Long => cur / prev,
                Direction::Short => prev / cur,
            },
        }
    }

    fn exit_reason(&self, direction: Direction, zscore: Option<f64>) -> ExitReason {
        let stop = self.params.stop_loss_threshold;
        match (direction, zscore) {
            (Direction::Long, Some(z)) if z <= -stop => ExitReason::StopLoss,
            (Direction::Short, Some(z)) if z >= stop => ExitReason::StopLoss,
            _ => ExitReason::MeanReverted,
        }
    }

    fn close_trade(
        &self,
        trade: OpenTrade,
        exit: &SignalState,
        exit_index: usize,
        reason: ExitReason,
    ) -> Trade {
        let cost = self.params.cost_rate() * (trade.entry_price.abs() + exit.spread.abs());
        let pnl = trade.direction.sign() * (exit.spread - trade.entry_price) - cost;

        Trade {
            entry_date: trade.entry_date,
            exit_date: exit.date,
            direction: trade.direction,
            entry_price: trade.entry_price,
            exit_price: exit.spread,
            holding_period_days: (exit.date - trade.entry_date).num_days(),
            bars_held: exit_index - trade.entry_index,
            pnl,
            cost,
            trade_return: trade.growth - 1.0,
            exit_reason: reason,
            open_at_end: reason == ExitReason::EndOfData,
        }
    }
}
