// backtest-core/src/backtest/metrics.rs

use super::simulator::EquityCurve;
use super::types::*;

/// Standard deviations below this are treated as zero.
const STDEV_EPSILON: f64 = 1e-12;

pub struct MetricsCalculator {
    periods_per_year: f64,
}

impl MetricsCalculator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            periods_per_year: timeframe.periods_per_year(),
        }
    }

    pub fn calculate(
        &self,
        trades: &[Trade],
        equity_curve: &EquityCurve,
        execution: ExecutionMetadata,
    ) -> MetricsRecord {
        let stats = TradeStats::from_trades(trades);
        let returns = equity_curve.period_returns();
        let total_return_pct = self.calculate_total_return(trades) * 100.0;
        let max_drawdown_pct = self.calculate_max_drawdown(equity_curve);
        let annualized_return_pct = self.calculate_annualized_return(total_return_pct, equity_curve);

        MetricsRecord {
            profit_factor: MetricValue::ratio(stats.gross_profit, stats.gross_loss),
            win_rate_pct: MetricValue::ratio(stats.wins as f64 * 100.0, trades.len() as f64),
            sharpe_ratio: self.calculate_sharpe_ratio(&returns),
            sortino_ratio: self.calculate_sortino_ratio(&returns),
            max_drawdown_pct,
            calmar_ratio: annualized_return_pct
                .value()
                .map_or(MetricValue::Undefined, |annual| {
                    MetricValue::ratio(annual, max_drawdown_pct.abs())
                }),
            recovery_factor: MetricValue::ratio(total_return_pct, max_drawdown_pct.abs()),
            total_return_pct,
            total_trades: trades.len(),

            wins: stats.wins,
            losses: stats.losses,
            forced_close_trades: trades.iter().filter(|t| t.forced_close).count(),
            avg_win_pct: MetricValue::ratio(stats.gross_profit * 100.0, stats.wins as f64),
            avg_loss_pct: MetricValue::ratio(-stats.gross_loss * 100.0, stats.losses as f64),
            gross_profit_pct: stats.gross_profit * 100.0,
            gross_loss_pct: stats.gross_loss * 100.0,
            max_consecutive_wins: stats.max_consecutive_wins,
            max_consecutive_losses: stats.max_consecutive_losses,

            execution,
        }
    }

    /// Compounded return across all trades, as a fraction.
    fn calculate_total_return(&self, trades: &[Trade]) -> f64 {
        trades.iter().map(|t| 1.0 + t.return_pct).product::<f64>() - 1.0
    }

    /// Worst peak-to-trough decline in percent; 0 when the curve never dips.
    fn calculate_max_drawdown(&self, equity_curve: &EquityCurve) -> f64 {
        let mut peak = f64::MIN;
        let mut max_drawdown = 0.0_f64;

        for &value in equity_curve.values() {
            if value > peak {
                peak = value;
            } else if peak > 0.0 {
                let drawdown = (value - peak) / peak;
                if drawdown < max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        max_drawdown * 100.0
    }

    fn calculate_annualized_return(&self, total_return_pct: f64, equity_curve: &EquityCurve) -> MetricValue {
        let elapsed = equity_curve.len().saturating_sub(1);
        if elapsed == 0 {
            return MetricValue::Undefined;
        }
        let growth = 1.0 + total_return_pct / 100.0;
        MetricValue::new((growth.max(0.0).powf(self.periods_per_year / elapsed as f64) - 1.0) * 100.0)
    }

    fn calculate_sharpe_ratio(&self, returns: &[f64]) -> MetricValue {
        if returns.is_empty() {
            return MetricValue::Undefined;
        }

        let mean_return = mean(returns);
        let volatility = population_std(returns);

        if volatility < STDEV_EPSILON {
            return MetricValue::Undefined;
        }

        MetricValue::new(mean_return / volatility * self.periods_per_year.sqrt())
    }

    fn calculate_sortino_ratio(&self, returns: &[f64]) -> MetricValue {
        let downside_returns: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();

        if downside_returns.is_empty() {
            return MetricValue::Undefined;
        }

        // Spread of the losing periods around their own mean.
        let downside_deviation = population_std(&downside_returns);
        if downside_deviation < STDEV_EPSILON {
            return MetricValue::Undefined;
        }

        MetricValue::new(mean(returns) / downside_deviation * self.periods_per_year.sqrt())
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[derive(Debug, Default)]
struct TradeStats {
    wins: usize,
    losses: usize,
    gross_profit: f64,
    gross_loss: f64,
    max_consecutive_wins: usize,
    max_consecutive_losses: usize,
}

impl TradeStats {
    fn from_trades(trades: &[Trade]) -> Self {
        let mut stats = TradeStats::default();
        let mut win_streak = 0;
        let mut loss_streak = 0;

        for trade in trades {
            if trade.return_pct > 0.0 {
                stats.wins += 1;
                stats.gross_profit += trade.return_pct;
                win_streak += 1;
                loss_streak = 0;
            } else if trade.return_pct < 0.0 {
                stats.losses += 1;
                stats.gross_loss += trade.return_pct.abs();
                loss_streak += 1;
                win_streak = 0;
            } else {
                // Breakeven breaks both streaks.
                win_streak = 0;
                loss_streak = 0;
            }
            stats.max_consecutive_wins = stats.max_consecutive_wins.max(win_streak);
            stats.max_consecutive_losses = stats.max_consecutive_losses.max(loss_streak);
        }

        stats
    }
}
