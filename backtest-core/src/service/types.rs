use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::backtest::{
    Candle, Direction, MetricValue, MetricsRecord, RunResult, StrategyParams, Timeframe,
};

/// Accepted range for the number of candles per run
pub const LIMIT_MIN: u32 = 500;
pub const LIMIT_MAX: u32 = 5000;
pub const DEFAULT_TOP_K: usize = 5;

/// Validated batch request, echoed back in the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub limit: u32,
    pub params: StrategyParams,
    pub concurrency_limit: usize,
    pub deadline_ms: u64,
}

/// Condensed view of a successful run used for ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPerformer {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub profit_factor: MetricValue,
    pub sharpe_ratio: MetricValue,
    pub win_rate_pct: MetricValue,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
}

impl BestPerformer {
    pub fn from_run(result: &RunResult) -> Option<Self> {
        let metrics = result.metrics.as_ref()?;
        Some(Self {
            symbol: result.symbol.clone(),
            timeframe: result.timeframe,
            profit_factor: metrics.profit_factor,
            sharpe_ratio: metrics.sharpe_ratio,
            win_rate_pct: metrics.win_rate_pct,
            total_return_pct: metrics.total_return_pct,
            max_drawdown_pct: metrics.max_drawdown_pct,
            total_trades: metrics.total_trades,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_tests: usize,
    pub successful: usize,
    pub failed: usize,
    /// Failures caused by the batch deadline, included in `failed`
    pub timed_out: usize,
    /// Trades closed at series end across all successful runs
    pub forced_close_trades: usize,
    pub best_performers: Vec<BestPerformer>,
}

/// Mean and median of one metric over the runs where it is defined
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub mean: MetricValue,
    pub median: MetricValue,
    pub samples: usize,
}

impl AggregateStat {
    pub fn from_values(values: &[MetricValue]) -> Self {
        let mut defined: Vec<f64> = values.iter().filter_map(MetricValue::value).collect();
        if defined.is_empty() {
            return Self {
                mean: MetricValue::Undefined,
                median: MetricValue::Undefined,
                samples: 0,
            };
        }

        defined.sort_by(f64::total_cmp);
        let n = defined.len();
        let mean = defined.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (defined[n / 2 - 1] + defined[n / 2]) / 2.0
        } else {
            defined[n / 2]
        };

        Self {
            mean: MetricValue::new(mean),
            median: MetricValue::new(median),
            samples: n,
        }
    }
}

pub type AggregateStats = BTreeMap<String, AggregateStat>;

/// Output of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub config: BatchConfig,
    /// One entry per symbol x timeframe, symbol-major
    pub results: Vec<RunResult>,
    pub summary: BatchSummary,
    pub aggregate_stats: AggregateStats,
    /// Wall-clock seconds
    pub total_execution_time: f64,
}

/// Output of a threshold grid search on one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub limit: u32,
    pub candles_used: usize,
    pub results: Vec<RunResult>,
    pub best: Option<RunResult>,
    pub total_execution_time: f64,
}

/// Latest indicator readings for one symbol, without running a backtest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub current_candle: Candle,
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub direction: Direction,
    pub candles_used: usize,
}

/// Descending order with undefined values last.
fn cmp_metric_desc(a: MetricValue, b: MetricValue) -> Ordering {
    match (a.value(), b.value()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ranking used for best performers: profit factor, then sharpe ratio.
pub fn compare_performance(a: &MetricsRecord, b: &MetricsRecord) -> Ordering {
    cmp_metric_desc(a.profit_factor, b.profit_factor)
        .then_with(|| cmp_metric_desc(a.sharpe_ratio, b.sharpe_ratio))
}

/// Successful runs in ranking order. Stable, so equal runs keep input order.
pub fn rank_successes(results: &[RunResult]) -> Vec<&RunResult> {
    let mut ranked: Vec<(&RunResult, &MetricsRecord)> = results
        .iter()
        .filter_map(|r| r.metrics.as_ref().map(|m| (r, m)))
        .collect();
    ranked.sort_by(|(_, a), (_, b)| compare_performance(a, b));
    ranked.into_iter().map(|(r, _)| r).collect()
}

/// Metrics summarized across runs, keyed by field name.
const AGGREGATED_METRICS: [(&str, fn(&MetricsRecord) -> MetricValue); 9] = [
    ("profit_factor", |m| m.profit_factor),
    ("win_rate_pct", |m| m.win_rate_pct),
    ("sharpe_ratio", |m| m.sharpe_ratio),
    ("sortino_ratio", |m| m.sortino_ratio),
    ("max_drawdown_pct", |m| MetricValue::new(m.max_drawdown_pct)),
    ("calmar_ratio", |m| m.calmar_ratio),
    ("recovery_factor", |m| m.recovery_factor),
    ("total_return_pct", |m| MetricValue::new(m.total_return_pct)),
    ("total_trades", |m| MetricValue::new(m.total_trades as f64)),
];

pub fn aggregate_stats(results: &[RunResult]) -> AggregateStats {
    let successes: Vec<&MetricsRecord> = results.iter().filter_map(|r| r.metrics.as_ref()).collect();

    AGGREGATED_METRICS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<MetricValue> = successes.iter().map(|m| extract(m)).collect();
            (name.to_string(), AggregateStat::from_values(&values))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{ExecutionMetadata, RunError};

    fn metrics(profit_factor: MetricValue, sharpe: MetricValue) -> MetricsRecord {
        MetricsRecord {
            profit_factor,
            win_rate_pct: MetricValue::new(50.0),
            sharpe_ratio: sharpe,
            sortino_ratio: MetricValue::Undefined,
            max_drawdown_pct: -5.0,
            calmar_ratio: MetricValue::Undefined,
            recovery_factor: MetricValue::new(1.0),
            total_return_pct: 5.0,
            total_trades: 2,
            wins: 1,
            losses: 1,
            forced_close_trades: 0,
            avg_win_pct: MetricValue::new(10.0),
            avg_loss_pct: MetricValue::new(-5.0),
            gross_profit_pct: 10.0,
            gross_loss_pct: -5.0,
            max_consecutive_wins: 1,
            max_consecutive_losses: 1,
            execution: ExecutionMetadata {
                candles_used: 500,
                first_defined_index: 49,
                execution_time_ms: 1.0,
            },
        }
    }

    fn run(symbol: &str, m: MetricsRecord) -> RunResult {
        let params = StrategyParams::new(45.0, 65.0).unwrap();
        RunResult::success(symbol, Timeframe::H4, params, m)
    }

    #[test]
    fn test_aggregate_excludes_undefined() {
        let stat = AggregateStat::from_values(&[
            MetricValue::new(1.0),
            MetricValue::Undefined,
            MetricValue::new(3.0),
            MetricValue::new(8.0),
        ]);
        assert_eq!(stat.samples, 3);
        assert_eq!(stat.mean, MetricValue::new(4.0));
        assert_eq!(stat.median, MetricValue::new(3.0));

        let even = AggregateStat::from_values(&[MetricValue::new(4.0), MetricValue::new(1.0)]);
        assert_eq!(even.median, MetricValue::new(2.5));

        let none = AggregateStat::from_values(&[MetricValue::Undefined]);
        assert_eq!(none.samples, 0);
        assert!(none.mean.is_undefined());
        assert!(none.median.is_undefined());
    }

    #[test]
    fn test_ranking_treats_undefined_as_worst() {
        let results = vec![
            run("AAA", metrics(MetricValue::Undefined, MetricValue::new(9.0))),
            run("BBB", metrics(MetricValue::new(1.5), MetricValue::new(0.5))),
            run("CCC", metrics(MetricValue::new(1.5), MetricValue::new(2.0))),
            run("DDD", metrics(MetricValue::new(3.0), MetricValue::Undefined)),
        ];

        let order: Vec<&str> = rank_successes(&results)
            .iter()
            .map(|r| r.symbol.as_str())
            .collect();
        assert_eq!(order, vec!["DDD", "CCC", "BBB", "AAA"]);
    }

    #[test]
    fn test_ranking_skips_failures_and_is_stable() {
        let params = StrategyParams::new(45.0, 65.0).unwrap();
        let results = vec![
            run("AAA", metrics(MetricValue::new(2.0), MetricValue::new(1.0))),
            RunResult::failure("BBB", Timeframe::H4, params, RunError::timeout("late")),
            run("CCC", metrics(MetricValue::new(2.0), MetricValue::new(1.0))),
        ];

        let order: Vec<&str> = rank_successes(&results)
            .iter()
            .map(|r| r.symbol.as_str())
            .collect();
        assert_eq!(order, vec!["AAA", "CCC"]);
    }

    #[test]
    fn test_aggregate_stats_keys() {
        let results = vec![
            run("AAA", metrics(MetricValue::new(2.0), MetricValue::new(1.0))),
            run("BBB", metrics(MetricValue::Undefined, MetricValue::new(3.0))),
        ];
        let stats = aggregate_stats(&results);

        assert_eq!(stats.len(), AGGREGATED_METRICS.len());
        assert_eq!(stats["profit_factor"].samples, 1);
        assert_eq!(stats["sharpe_ratio"].mean, MetricValue::new(2.0));
        assert_eq!(stats["total_trades"].median, MetricValue::new(2.0));
        assert_eq!(stats["sortino_ratio"].samples, 0);
    }
}
